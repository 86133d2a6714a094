use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::{AttributeToken, LexIssue, Lexer, Tag, Token, TokenType};
use crate::utils::split_term_reference;
use log::debug;
use miette::{NamedSource, SourceSpan};
use std::collections::HashSet;
use std::sync::Arc;

/// A line-oriented recursive descent parser for the mzSpecLib text format.
///
/// Parsing is all-or-nothing: the first malformed line aborts with a
/// [`ParserError`] that names the line and what was expected there.
#[derive(Debug)]
pub struct Parser {
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    position: usize,
    spectrum_ids: HashSet<String>,
    cluster_ids: HashSet<String>,
}

impl Parser {
    pub fn new(source_text: &str) -> Self {
        Self::new_with_name(source_text, "library.mzlb.txt".to_string())
    }

    pub fn new_with_name(source_text: &str, name: String) -> Self {
        Self::with_first_line(source_text, name, 1)
    }

    /// Parses a slice of a larger document whose first line is `first_line`,
    /// so reported line numbers stay absolute.
    pub fn with_first_line(source_text: &str, name: String, first_line: usize) -> Self {
        let source = Arc::new(NamedSource::new(name, source_text.to_string()));
        let tokens = Lexer::with_first_line(source_text, first_line).lex();
        Self {
            source,
            tokens,
            position: 0,
            spectrum_ids: HashSet::new(),
            cluster_ids: HashSet::new(),
        }
    }

    // === Main Parsing Methods ===

    /// Library ::= Header { Attribute } { AttributeSetBlock } { Spectrum | Cluster } Eof
    pub fn parse_library(&mut self) -> Result<Library, ParserError> {
        self.skip_blank();
        if !matches!(self.current_token().ttype, TokenType::Header) {
            let token = self.current_token();
            return Err(ParserError::MissingHeader {
                src: self.src(),
                span: span_of(token),
                line: token.line,
            });
        }
        self.advance();

        let mut library = Library::new();
        self.parse_attribute_lines(&mut library.attributes)?;
        debug!("library header: {} attributes", library.attributes.len());

        while let TokenType::Tag(Tag::AttributeSet { .. }) = self.current_token().ttype {
            let set = self.parse_attribute_set(&library)?;
            library.add_attribute_set(set);
        }

        loop {
            match self.current_token().ttype {
                TokenType::Tag(Tag::Spectrum(_)) => library.spectra.push(self.parse_spectrum()?),
                TokenType::Tag(Tag::Cluster(_)) => library.clusters.push(self.parse_cluster()?),
                TokenType::Tag(Tag::AttributeSet { .. }) => {
                    return self.err_unexpected(
                        "a <Spectrum=K> or <Cluster=K> tag (attribute sets belong in the library header)",
                    )
                }
                TokenType::Blank => self.advance(),
                TokenType::Eof => break,
                _ => return self.err_unexpected("a <Spectrum=K> or <Cluster=K> tag"),
            }
        }
        debug!(
            "parsed library: {} spectra, {} clusters, {} attribute sets",
            library.spectra.len(),
            library.clusters.len(),
            library.attribute_sets.len()
        );
        Ok(library)
    }

    /// Record ::= Spectrum | Cluster, alone in the input.
    pub fn parse_record(&mut self) -> Result<Record, ParserError> {
        self.skip_blank();
        let record = match self.current_token().ttype {
            TokenType::Tag(Tag::Spectrum(_)) => Record::Spectrum(self.parse_spectrum()?),
            TokenType::Tag(Tag::Cluster(_)) => Record::Cluster(self.parse_cluster()?),
            _ => return self.err_unexpected("a <Spectrum=K> or <Cluster=K> tag"),
        };
        self.skip_blank();
        if !matches!(self.current_token().ttype, TokenType::Eof) {
            return self.err_unexpected("the end of the record");
        }
        Ok(record)
    }

    /// Parses the attribute lines (and blank lines) at the cursor into `attributes`.
    fn parse_attribute_lines(&mut self, attributes: &mut Attributes) -> Result<(), ParserError> {
        loop {
            match &self.current_token().ttype {
                TokenType::Attribute(attribute) => {
                    attributes.push(build_attribute(attribute));
                    self.advance();
                }
                TokenType::Blank => self.advance(),
                TokenType::Unknown(_) => return self.err_unexpected("an attribute line"),
                _ => return Ok(()),
            }
        }
    }

    /// AttributeSetBlock ::= "<AttributeSet Kind=name>" { Attribute }
    fn parse_attribute_set(&mut self, library: &Library) -> Result<AttributeSet, ParserError> {
        let token = self.current_token().clone();
        let TokenType::Tag(Tag::AttributeSet { target, name }) = &token.ttype else {
            return self.err_unexpected("an <AttributeSet Kind=name> tag");
        };
        if library.attribute_set(*target, name).is_some() {
            return Err(self.duplicate_id(&token, &format!("{target} AttributeSet"), name));
        }
        self.advance();

        let mut set = AttributeSet::new(*target, name.clone());
        self.parse_attribute_lines(&mut set.attributes)?;
        debug!("attribute set {target}={name}: {} attributes", set.attributes.len());
        Ok(set)
    }

    /// Spectrum ::= "<Spectrum=K>" { Attribute } { Analyte | Interpretation } [ Peaks ]
    fn parse_spectrum(&mut self) -> Result<Spectrum, ParserError> {
        let open = self.current_token().clone();
        let TokenType::Tag(Tag::Spectrum(id)) = &open.ttype else {
            return self.err_unexpected("a <Spectrum=K> tag");
        };
        if id.is_empty() {
            return self.err_unexpected("a non-empty Spectrum id");
        }
        if !self.spectrum_ids.insert(id.clone()) {
            return Err(self.duplicate_id(&open, "Spectrum", id));
        }
        self.advance();
        debug!("open Spectrum={id} at line {}", open.line);

        let mut spectrum = Spectrum::new(id.clone());
        self.parse_attribute_lines(&mut spectrum.attributes)?;

        loop {
            let token = self.current_token().clone();
            match &token.ttype {
                TokenType::Tag(Tag::Analyte(raw)) => {
                    let analyte_id = self.child_id(&token, "Analyte", raw)?;
                    if spectrum.analytes.contains_key(&analyte_id) {
                        return Err(self.duplicate_id(&token, "Analyte", raw));
                    }
                    self.advance();
                    let mut analyte = Analyte::new(analyte_id);
                    self.parse_attribute_lines(&mut analyte.attributes)?;
                    spectrum.analytes.insert(analyte_id, analyte);
                }
                TokenType::Tag(Tag::Interpretation(raw)) => {
                    let interpretation_id = self.child_id(&token, "Interpretation", raw)?;
                    if spectrum.interpretations.contains_key(&interpretation_id) {
                        return Err(self.duplicate_id(&token, "Interpretation", raw));
                    }
                    self.advance();
                    let interpretation = self.parse_interpretation(interpretation_id)?;
                    spectrum.interpretations.insert(interpretation_id, interpretation);
                }
                TokenType::Tag(Tag::Peaks) => {
                    spectrum.peaks = self.parse_peaks()?;
                    break;
                }
                TokenType::Blank => self.advance(),
                TokenType::Tag(Tag::Spectrum(_)) | TokenType::Tag(Tag::Cluster(_)) | TokenType::Eof => {
                    break
                }
                _ => {
                    return self.err_unexpected(
                        "an <Analyte=K>, <Interpretation=K> or <Peaks> tag inside the spectrum",
                    )
                }
            }
        }

        self.check_peak_count(&open, &spectrum)?;
        debug!("close Spectrum={} with {} peaks", spectrum.id, spectrum.peaks.len());
        Ok(spectrum)
    }

    /// Interpretation ::= "<Interpretation=K>" { Attribute } { InterpretationMember }
    fn parse_interpretation(&mut self, id: u32) -> Result<Interpretation, ParserError> {
        let mut interpretation = Interpretation::new(id);
        self.parse_attribute_lines(&mut interpretation.attributes)?;

        while let TokenType::Tag(Tag::InterpretationMember(raw)) = &self.current_token().ttype {
            let token = self.current_token().clone();
            let member_id = self.child_id(&token, "InterpretationMember", raw)?;
            if interpretation.members.contains_key(&member_id) {
                return Err(self.duplicate_id(&token, "InterpretationMember", raw));
            }
            self.advance();
            let mut member = InterpretationMember::new(member_id);
            self.parse_attribute_lines(&mut member.attributes)?;
            interpretation.members.insert(member_id, member);
        }
        Ok(interpretation)
    }

    /// Peaks ::= "<Peaks>" { PeakRow } ( Blank | Tag | Eof )
    fn parse_peaks(&mut self) -> Result<Vec<Peak>, ParserError> {
        self.advance();
        let mut peaks = Vec::new();
        loop {
            let token = self.current_token();
            match &token.ttype {
                TokenType::PeakRow(fields) => {
                    peaks.push(self.build_peak(token, fields)?);
                    self.advance();
                }
                TokenType::Blank => {
                    self.advance();
                    break;
                }
                TokenType::Tag(_) | TokenType::Eof => break,
                _ => return self.err_unexpected("a peak row"),
            }
        }

        // Once the block is closed only a tag may follow.
        self.skip_blank();
        match self.current_token().ttype {
            TokenType::Tag(_) | TokenType::Header | TokenType::Eof => Ok(peaks),
            _ => self.err_unexpected("a tag after the peak list"),
        }
    }

    /// Cluster ::= "<Cluster=K>" { Attribute }
    fn parse_cluster(&mut self) -> Result<Cluster, ParserError> {
        let open = self.current_token().clone();
        let TokenType::Tag(Tag::Cluster(id)) = &open.ttype else {
            return self.err_unexpected("a <Cluster=K> tag");
        };
        if id.is_empty() {
            return self.err_unexpected("a non-empty Cluster id");
        }
        if !self.cluster_ids.insert(id.clone()) {
            return Err(self.duplicate_id(&open, "Cluster", id));
        }
        self.advance();
        debug!("open Cluster={id} at line {}", open.line);

        let mut cluster = Cluster::new(id.clone());
        self.parse_attribute_lines(&mut cluster.attributes)?;
        Ok(cluster)
    }

    // === Semantic Checks ===

    fn build_peak(&self, token: &Token, fields: &[String]) -> Result<Peak, ParserError> {
        if !(2..=4).contains(&fields.len()) {
            return Err(self.malformed_peak(
                token,
                format!("expected 2 to 4 tab-separated columns, found {}", fields.len()),
            ));
        }
        let mz = fields[0]
            .parse::<f64>()
            .map_err(|_| self.malformed_peak(token, format!("m/z `{}` is not a number", fields[0])))?;
        let intensity = fields[1].parse::<f64>().map_err(|_| {
            self.malformed_peak(token, format!("intensity `{}` is not a number", fields[1]))
        })?;

        let mut peak = Peak::new(mz, intensity);
        if let Some(annotations) = fields.get(2) {
            peak.annotations = split_tokens(annotations);
        }
        if let Some(aggregations) = fields.get(3) {
            peak.aggregations = split_tokens(aggregations);
        }
        Ok(peak)
    }

    fn check_peak_count(&self, open: &Token, spectrum: &Spectrum) -> Result<(), ParserError> {
        let Some(declared) = spectrum.declared_peak_count() else {
            return Ok(());
        };
        let Some(declared) = declared.value.as_i64().and_then(|n| usize::try_from(n).ok()) else {
            return Err(ParserError::MalformedAttribute {
                src: self.src(),
                span: span_of(open),
                line: open.line,
                reason: format!(
                    "number of peaks `{}` is not a non-negative integer",
                    declared.value
                ),
            });
        };
        if declared != spectrum.peaks.len() {
            return Err(ParserError::PeakCountMismatch {
                src: self.src(),
                span: span_of(open),
                line: open.line,
                spectrum: spectrum.id.clone(),
                declared,
                found: spectrum.peaks.len(),
            });
        }
        Ok(())
    }

    fn child_id(&self, token: &Token, entity: &str, raw: &str) -> Result<u32, ParserError> {
        raw.parse::<u32>().map_err(|_| ParserError::UnexpectedLine {
            src: self.src(),
            span: span_of(token),
            line: token.line,
            expected: format!("a non-negative integer id in <{entity}=K>"),
        })
    }

    // === Tokenizer Helper Methods ===

    fn current_token(&self) -> &Token {
        // The lexer always ends the stream with Eof, and `advance` never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn skip_blank(&mut self) {
        while matches!(self.current_token().ttype, TokenType::Blank) {
            self.advance();
        }
    }

    fn src(&self) -> NamedSource<String> {
        (*self.source).clone()
    }

    fn duplicate_id(&self, token: &Token, entity: &str, id: &str) -> ParserError {
        ParserError::DuplicateId {
            src: self.src(),
            span: span_of(token),
            line: token.line,
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    fn malformed_peak(&self, token: &Token, reason: String) -> ParserError {
        ParserError::MalformedPeak {
            src: self.src(),
            span: span_of(token),
            line: token.line,
            reason,
        }
    }

    /// Builds the most specific error for the token at the cursor.
    fn err_unexpected<T>(&self, expected: &str) -> Result<T, ParserError> {
        let token = self.current_token();
        let src = self.src();
        let span = span_of(token);
        let line = token.line;

        let reason = match &token.ttype {
            TokenType::Unknown(LexIssue::BadAccession(accession)) => {
                Some(format!("`{accession}` is not a CV accession"))
            }
            TokenType::Unknown(LexIssue::MissingSeparator) => {
                Some("expected `|` between accession and name".to_string())
            }
            TokenType::Unknown(LexIssue::EmptyName) => Some("the term name is empty".to_string()),
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(ParserError::MalformedAttribute {
                src,
                span,
                line,
                reason,
            });
        }

        let err = match &token.ttype {
            TokenType::Unknown(LexIssue::UnmatchedGroup) => ParserError::UnmatchedGroup { src, span, line },
            TokenType::Unknown(LexIssue::UnclosedTag) => ParserError::UnexpectedLine {
                src,
                span,
                line,
                expected: "a closing `>`".to_string(),
            },
            TokenType::Tag(Tag::Other(tag)) => ParserError::UnknownTag {
                src,
                span,
                line,
                tag: tag.clone(),
            },
            TokenType::Tag(tag @ (Tag::Analyte(_) | Tag::Interpretation(_) | Tag::Peaks)) => {
                ParserError::MissingParent {
                    src,
                    span,
                    line,
                    tag: tag.label().to_string(),
                    parent: "Spectrum".to_string(),
                }
            }
            TokenType::Tag(tag @ Tag::InterpretationMember(_)) => ParserError::MissingParent {
                src,
                span,
                line,
                tag: tag.label().to_string(),
                parent: "Interpretation".to_string(),
            },
            TokenType::Attribute(_) if expected.starts_with("a <Spectrum=K>") => {
                ParserError::UnexpectedLine {
                    src,
                    span,
                    line,
                    expected: "a tag: this attribute is outside any entity".to_string(),
                }
            }
            _ => ParserError::UnexpectedLine {
                src,
                span,
                line,
                expected: expected.to_string(),
            },
        };
        Err(err)
    }
}

fn span_of(token: &Token) -> SourceSpan {
    (token.pos_start, token.pos_end - token.pos_start).into()
}

fn split_tokens(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turns a lexed attribute line into an [`Attribute`], typing its value.
/// A value of the form `ACCESSION|value` becomes a term-valued attribute whose
/// value is typed like any other; an empty value after the bar is null.
pub fn build_attribute(token: &AttributeToken) -> Attribute {
    let attribute = match token.value.as_deref() {
        None => Attribute::flag(token.accession.clone(), token.name.clone()),
        Some(raw) => match split_term_reference(raw) {
            Some((value_accession, value)) => {
                let value = if value.is_empty() {
                    AttributeValue::Null
                } else {
                    AttributeValue::parse(value)
                };
                Attribute::new(token.accession.clone(), token.name.clone(), value)
                    .with_value_accession(value_accession)
            }
            None => Attribute::new(
                token.accession.clone(),
                token.name.clone(),
                AttributeValue::parse(raw),
            ),
        },
    };
    match token.group {
        Some(group_id) => attribute.in_group(group_id),
        None => attribute,
    }
}
