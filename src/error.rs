use crate::ast::SetTarget;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Fatal errors: any of these aborts the operation that produced it.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum MzLibError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    RuleConfig(#[from] RuleConfigError),
}

/// Structural errors in the text format. Parsing is all-or-nothing, so every
/// variant carries the offending line.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error("line {line}: expected the `<mzSpecLib>` header")]
    #[diagnostic(
        code(parser::missing_header),
        help("A library must start with a `<mzSpecLib>` line before any attribute or tag.")
    )]
    MissingHeader {
        #[source_code]
        src: NamedSource<String>,
        #[label("expected `<mzSpecLib>` here")]
        span: SourceSpan,
        line: usize,
    },

    #[error("line {line}: expected {expected}")]
    #[diagnostic(
        code(parser::unexpected_line),
        help("The parser found a line it did not expect in this position.")
    )]
    UnexpectedLine {
        #[source_code]
        src: NamedSource<String>,
        #[label("expected {expected}, but found this")]
        span: SourceSpan,
        line: usize,
        expected: String,
    },

    #[error("line {line}: malformed attribute: {reason}")]
    #[diagnostic(
        code(parser::malformed_attribute),
        help("Attribute lines look like `[group]ACCESSION|name=value`, e.g. `MS:1003061|spectrum name=PEPTIDE/2`.")
    )]
    MalformedAttribute {
        #[source_code]
        src: NamedSource<String>,
        #[label("{reason}")]
        span: SourceSpan,
        line: usize,
        reason: String,
    },

    #[error("line {line}: unmatched or invalid attribute group prefix")]
    #[diagnostic(
        code(parser::unmatched_group),
        help("A group prefix is a non-negative integer in brackets directly before the accession, e.g. `[1]UO:0000000|unit=UO:0000010|second`.")
    )]
    UnmatchedGroup {
        #[source_code]
        src: NamedSource<String>,
        #[label("expected `[N]` here")]
        span: SourceSpan,
        line: usize,
    },

    #[error("line {line}: unknown tag `<{tag}>`")]
    #[diagnostic(
        code(parser::unknown_tag),
        help("Known tags are <mzSpecLib>, <AttributeSet Kind=name>, <Spectrum=K>, <Analyte=K>, <Interpretation=K>, <InterpretationMember=K>, <Cluster=K> and <Peaks>.")
    )]
    UnknownTag {
        #[source_code]
        src: NamedSource<String>,
        #[label("not a recognised tag")]
        span: SourceSpan,
        line: usize,
        tag: String,
    },

    #[error("line {line}: `<{tag}>` must appear inside a {parent}")]
    #[diagnostic(code(parser::missing_parent))]
    MissingParent {
        #[source_code]
        src: NamedSource<String>,
        #[label("no open {parent} here")]
        span: SourceSpan,
        line: usize,
        tag: String,
        parent: String,
    },

    #[error("line {line}: duplicate {entity} id `{id}`")]
    #[diagnostic(
        code(parser::duplicate_id),
        help("Entity ids must be unique within their parent.")
    )]
    DuplicateId {
        #[source_code]
        src: NamedSource<String>,
        #[label("{entity} `{id}` was already defined")]
        span: SourceSpan,
        line: usize,
        entity: String,
        id: String,
    },

    #[error("line {line}: malformed peak row: {reason}")]
    #[diagnostic(
        code(parser::malformed_peak),
        help("Peak rows are `mz<TAB>intensity[<TAB>annotations[<TAB>aggregations]]`.")
    )]
    MalformedPeak {
        #[source_code]
        src: NamedSource<String>,
        #[label("{reason}")]
        span: SourceSpan,
        line: usize,
        reason: String,
    },

    #[error("line {line}: Spectrum={spectrum} declares {declared} peaks but {found} were read")]
    #[diagnostic(
        code(parser::peak_count_mismatch),
        help("The `MS:1003059|number of peaks` attribute must equal the number of rows in the <Peaks> block.")
    )]
    PeakCountMismatch {
        #[source_code]
        src: NamedSource<String>,
        #[label("spectrum opened here")]
        span: SourceSpan,
        line: usize,
        spectrum: String,
        declared: usize,
        found: usize,
    },
}

impl ParserError {
    /// 1-based line of the defect.
    pub fn line(&self) -> usize {
        match self {
            ParserError::MissingHeader { line, .. }
            | ParserError::UnexpectedLine { line, .. }
            | ParserError::MalformedAttribute { line, .. }
            | ParserError::UnmatchedGroup { line, .. }
            | ParserError::UnknownTag { line, .. }
            | ParserError::MissingParent { line, .. }
            | ParserError::DuplicateId { line, .. }
            | ParserError::MalformedPeak { line, .. }
            | ParserError::PeakCountMismatch { line, .. } => *line,
        }
    }
}

/// The JSON document does not follow the interop contract.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum SchemaError {
    #[error("malformed JSON document: {message}")]
    #[diagnostic(code(schema::malformed))]
    Malformed { message: String },

    #[error(
        "spectrum `{spectrum}` has peak arrays of different lengths: {mzs} mzs, {intensities} intensities, {annotations} peak_annotations{}",
        aggregations.map(|n| format!(", {n} aggregations")).unwrap_or_default()
    )]
    #[diagnostic(
        code(schema::peak_array_length),
        help("`mzs`, `intensities`, `peak_annotations` and `aggregations` are parallel columns and must have one entry per peak.")
    )]
    PeakArrayLength {
        spectrum: String,
        mzs: usize,
        intensities: usize,
        annotations: usize,
        aggregations: Option<usize>,
    },

    #[error("invalid cv_param_group `{value}` on {accession}")]
    #[diagnostic(code(schema::invalid_group), help("Groups are non-negative integers."))]
    InvalidGroup { accession: String, value: String },

    #[error("invalid {entity} id `{id}`")]
    #[diagnostic(code(schema::invalid_id))]
    InvalidId { entity: String, id: String },

    #[error("explicit {entity} id `{id}` does not match its key `{key}`")]
    #[diagnostic(
        code(schema::id_mismatch),
        help("Analytes, interpretations and members are keyed by id; an `id` field, when present, must repeat the key.")
    )]
    IdMismatch { entity: String, key: String, id: String },

    #[error("duplicate {entity} id `{id}`")]
    #[diagnostic(code(schema::duplicate_id))]
    DuplicateId { entity: String, id: String },

    #[error("unsupported value for {accession}: {found}")]
    #[diagnostic(
        code(schema::unsupported_value),
        help("Attribute values are strings, numbers, booleans or null.")
    )]
    UnsupportedValue { accession: String, found: String },

    #[error("format_version `{declared}` disagrees with the library format version attribute `{attribute}`")]
    #[diagnostic(code(schema::format_version_mismatch))]
    FormatVersionMismatch { declared: String, attribute: String },
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Malformed {
            message: err.to_string(),
        }
    }
}

/// A rule table that cannot be loaded. Raised before any library is validated.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum RuleConfigError {
    #[error("malformed rule table: {message}")]
    #[diagnostic(code(rules::malformed))]
    Malformed { message: String },

    #[error("rule table has no tier name")]
    #[diagnostic(code(rules::missing_tier))]
    MissingTier,

    #[error("rule `{rule}`: unknown path `{path}`")]
    #[diagnostic(
        code(rules::unknown_path),
        help("Rules apply to /Library, /Library/Spectrum, /Library/Spectrum/Analyte or /Library/Spectrum/Interpretation.")
    )]
    UnknownPath { rule: String, path: String },

    #[error("rule `{rule}`: unknown requirement level `{level}`")]
    #[diagnostic(code(rules::unknown_requirement_level), help("Use MUST or SHOULD."))]
    UnknownRequirementLevel { rule: String, level: String },

    #[error("rule `{rule}`: unknown combination logic `{logic}`")]
    #[diagnostic(code(rules::unknown_combination_logic), help("Use AND or OR."))]
    UnknownCombinationLogic { rule: String, logic: String },

    #[error("rule `{rule}`: unknown value constraint `{constraint}` on {accession}")]
    #[diagnostic(
        code(rules::unknown_value_constraint),
        help("Known constraints are value_is_unique, value_of_type and value_is_child_of.")
    )]
    UnknownValueConstraint {
        rule: String,
        accession: String,
        constraint: String,
    },

    #[error("rule `{rule}`: value constraint `{constraint}` on {accession} is missing its argument")]
    #[diagnostic(code(rules::missing_constraint_argument))]
    MissingConstraintArgument {
        rule: String,
        accession: String,
        constraint: String,
    },

    #[error("rule `{rule}`: unknown value type `{value_type}`")]
    #[diagnostic(
        code(rules::unknown_value_type),
        help("Known types are xsd:string, xsd:integer, xsd:int, xsd:float, xsd:double, xsd:boolean and xsd:dateTime.")
    )]
    UnknownValueType { rule: String, value_type: String },

    #[error("rule `{rule}` has an empty term list")]
    #[diagnostic(code(rules::empty_term_list))]
    EmptyTermList { rule: String },
}

/// Attribute set references that cannot be resolved. These surface as
/// validation failures rather than aborting anything.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ResolverError {
    #[error("unknown {target} attribute set `{name}`")]
    #[diagnostic(
        code(resolver::unknown_attribute_set),
        help("Define it with `<AttributeSet {target}={name}>` in the library header.")
    )]
    UnknownAttributeSet { target: SetTarget, name: String },

    #[error("attribute set references form a cycle: {cycle}")]
    #[diagnostic(code(resolver::circular_reference))]
    CircularReference { cycle: String },
}
