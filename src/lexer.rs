use crate::ast::SetTarget;
use crate::utils::is_accession;

/// The kinds of physical lines in an mzSpecLib text library.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    /// End of input.
    Eof,
    /// An empty or whitespace-only line. Closes a peak block.
    Blank,
    /// The `<mzSpecLib>` line that opens a library.
    Header,
    /// Any other `<...>` line.
    Tag(Tag),
    /// `[group]ACCESSION|name=value`
    Attribute(AttributeToken),
    /// A tab-separated peak row, split into its raw fields.
    PeakRow(Vec<String>),
    /// A line the lexer could not classify, with the reason.
    Unknown(LexIssue),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Tag {
    AttributeSet { target: SetTarget, name: String },
    Spectrum(String),
    Analyte(String),
    Interpretation(String),
    InterpretationMember(String),
    Cluster(String),
    Peaks,
    /// A well-formed tag with an unknown kind; the parser rejects it.
    Other(String),
}

impl Tag {
    pub fn label(&self) -> &str {
        match self {
            Tag::AttributeSet { .. } => "AttributeSet",
            Tag::Spectrum(_) => "Spectrum",
            Tag::Analyte(_) => "Analyte",
            Tag::Interpretation(_) => "Interpretation",
            Tag::InterpretationMember(_) => "InterpretationMember",
            Tag::Cluster(_) => "Cluster",
            Tag::Peaks => "Peaks",
            Tag::Other(text) => text,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AttributeToken {
    pub group: Option<u32>,
    pub accession: String,
    pub name: String,
    /// Raw text after the first `=`, untyped.
    pub value: Option<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum LexIssue {
    /// `[` without a closing `]`, or a non-integer group id.
    UnmatchedGroup,
    BadAccession(String),
    /// No `|` between accession and name.
    MissingSeparator,
    EmptyName,
    /// `<` without a closing `>`.
    UnclosedTag,
    Unrecognized,
}

/// A classified line with its byte span (without the line terminator) and
/// 1-based line number.
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
    pub line: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize, line: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
            line,
        }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_first_line(input, 1)
    }

    /// For input cut out of a larger document: line numbers start at `first_line`.
    pub fn with_first_line(input: &'a str, first_line: usize) -> Self {
        Self {
            input,
            position: 0,
            line: first_line,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        let start = self.position;
        if start >= self.input.len() {
            return Token::new(TokenType::Eof, start, start, self.line);
        }

        let rest = &self.input[start..];
        let (raw, consumed) = match rest.find('\n') {
            Some(newline) => (&rest[..newline], newline + 1),
            None => (rest, rest.len()),
        };
        let text = raw.strip_suffix('\r').unwrap_or(raw);

        let token = Token::new(classify(text), start, start + text.len(), self.line);
        self.position += consumed;
        self.line += 1;
        token
    }
}

fn classify(text: &str) -> TokenType {
    if text.trim().is_empty() {
        return TokenType::Blank;
    }
    match text.chars().next() {
        Some('<') => read_tag(text),
        Some('[') => read_grouped_attribute(text),
        Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
            TokenType::PeakRow(text.split('\t').map(|f| f.trim().to_string()).collect())
        }
        Some(c) if c.is_ascii_alphabetic() => read_attribute(text, None),
        _ => TokenType::Unknown(LexIssue::Unrecognized),
    }
}

fn read_tag(text: &str) -> TokenType {
    let Some(inner) = text
        .trim_end()
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
    else {
        return TokenType::Unknown(LexIssue::UnclosedTag);
    };

    if inner == "mzSpecLib" || inner.starts_with("mzSpecLib ") {
        return TokenType::Header;
    }
    if inner == "Peaks" {
        return TokenType::Tag(Tag::Peaks);
    }
    if let Some(definition) = inner.strip_prefix("AttributeSet ") {
        return match definition.split_once('=') {
            Some((kind, name)) if !name.is_empty() => match SetTarget::from_name(kind.trim()) {
                Some(target) => TokenType::Tag(Tag::AttributeSet {
                    target,
                    name: name.to_string(),
                }),
                None => TokenType::Tag(Tag::Other(inner.to_string())),
            },
            _ => TokenType::Tag(Tag::Other(inner.to_string())),
        };
    }

    let Some((kind, id)) = inner.split_once('=') else {
        return TokenType::Tag(Tag::Other(inner.to_string()));
    };
    let id = id.to_string();
    let tag = match kind {
        "Spectrum" => Tag::Spectrum(id),
        "Analyte" => Tag::Analyte(id),
        "Interpretation" => Tag::Interpretation(id),
        "InterpretationMember" => Tag::InterpretationMember(id),
        "Cluster" => Tag::Cluster(id),
        _ => Tag::Other(inner.to_string()),
    };
    TokenType::Tag(tag)
}

fn read_grouped_attribute(text: &str) -> TokenType {
    let Some((group, rest)) = text[1..].split_once(']') else {
        return TokenType::Unknown(LexIssue::UnmatchedGroup);
    };
    match group.parse::<u32>() {
        Ok(group) => read_attribute(rest, Some(group)),
        Err(_) => TokenType::Unknown(LexIssue::UnmatchedGroup),
    }
}

fn read_attribute(text: &str, group: Option<u32>) -> TokenType {
    let Some((accession, rest)) = text.split_once('|') else {
        return TokenType::Unknown(LexIssue::MissingSeparator);
    };
    if !is_accession(accession) {
        return TokenType::Unknown(LexIssue::BadAccession(accession.to_string()));
    }
    let (name, value) = match rest.split_once('=') {
        Some((name, value)) => (name, Some(value.to_string())),
        None => (rest, None),
    };
    if name.trim().is_empty() {
        return TokenType::Unknown(LexIssue::EmptyName);
    }
    TokenType::Attribute(AttributeToken {
        group,
        accession: accession.to_string(),
        name: name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_types(input: &str) -> Vec<TokenType> {
        Lexer::new(input).lex().into_iter().map(|t| t.ttype).collect()
    }

    fn attribute(group: Option<u32>, accession: &str, name: &str, value: Option<&str>) -> TokenType {
        TokenType::Attribute(AttributeToken {
            group,
            accession: accession.to_string(),
            name: name.to_string(),
            value: value.map(str::to_string),
        })
    }

    #[test]
    fn test_eof() {
        assert_eq!(token_types(""), vec![TokenType::Eof]);
    }

    #[test]
    fn test_tags() {
        let input = "<mzSpecLib>\n<AttributeSet Spectrum=all>\n<Spectrum=1>\n<Analyte=1>\n<Interpretation=1>\n<InterpretationMember=1>\n<Peaks>\n<Cluster=7>\n<Bogus=1>";
        assert_eq!(
            token_types(input),
            vec![
                TokenType::Header,
                TokenType::Tag(Tag::AttributeSet {
                    target: SetTarget::Spectrum,
                    name: "all".to_string()
                }),
                TokenType::Tag(Tag::Spectrum("1".to_string())),
                TokenType::Tag(Tag::Analyte("1".to_string())),
                TokenType::Tag(Tag::Interpretation("1".to_string())),
                TokenType::Tag(Tag::InterpretationMember("1".to_string())),
                TokenType::Tag(Tag::Peaks),
                TokenType::Tag(Tag::Cluster("7".to_string())),
                TokenType::Tag(Tag::Other("Bogus=1".to_string())),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_attributes() {
        let input = "MS:1003061|spectrum name=AAA/2\n[1]UO:0000000|unit=UO:0000010|second\nMS:1000000|flag\nMS:1000001|expr=a=b";
        assert_eq!(
            token_types(input),
            vec![
                attribute(None, "MS:1003061", "spectrum name", Some("AAA/2")),
                attribute(Some(1), "UO:0000000", "unit", Some("UO:0000010|second")),
                attribute(None, "MS:1000000", "flag", None),
                attribute(None, "MS:1000001", "expr", Some("a=b")),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_malformed_lines() {
        let input = "[x]MS:1|a=1\n[1MS:1|a=1\nMS1003061=3\nnot an accession|a=1\nMS:1|=1\n<Spectrum=1\n#";
        assert_eq!(
            token_types(input),
            vec![
                TokenType::Unknown(LexIssue::UnmatchedGroup),
                TokenType::Unknown(LexIssue::UnmatchedGroup),
                TokenType::Unknown(LexIssue::MissingSeparator),
                TokenType::Unknown(LexIssue::BadAccession("not an accession".to_string())),
                TokenType::Unknown(LexIssue::EmptyName),
                TokenType::Unknown(LexIssue::UnclosedTag),
                TokenType::Unknown(LexIssue::Unrecognized),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_peak_rows_and_blank_lines() {
        let input = "<Peaks>\n147.11\t1000.5\tb1,y1\t3/3\n\n  \n";
        assert_eq!(
            token_types(input),
            vec![
                TokenType::Tag(Tag::Peaks),
                TokenType::PeakRow(vec![
                    "147.11".to_string(),
                    "1000.5".to_string(),
                    "b1,y1".to_string(),
                    "3/3".to_string()
                ]),
                TokenType::Blank,
                TokenType::Blank,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_spans_and_lines_ignore_carriage_returns() {
        let input = "<mzSpecLib>\r\nMS:1003186|library format version=1.0\r\n";
        let tokens = Lexer::new(input).lex();
        assert_eq!(tokens[0].ttype, TokenType::Header);
        assert_eq!((tokens[0].pos_start, tokens[0].pos_end), (0, 11));
        assert_eq!(tokens[1].line, 2);
        assert_eq!(&input[tokens[1].pos_start..tokens[1].pos_end], "MS:1003186|library format version=1.0");
        assert_eq!(
            tokens[1].ttype,
            attribute(None, "MS:1003186", "library format version", Some("1.0"))
        );
        assert_eq!(tokens[2].ttype, TokenType::Eof);
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_first_line_offset() {
        let tokens = Lexer::with_first_line("<Spectrum=2>\n", 40).lex();
        assert_eq!(tokens[0].line, 40);
    }
}
