use crate::ast::Library;
use crate::error::MzLibError;
use crate::parser::Parser;
use crate::rules::Tier;
use crate::serialization::{from_json_str, to_json, LibraryDocument};
use crate::validator::{ValidationReport, Validator};
use crate::writer::to_text;
use serde::{Serialize, Serializer};

/// The result of a successful parse of an mzSpecLib library.
///
/// Holds the library tree as parsed, with attribute set references still in
/// place, and provides serialization to the JSON, YAML and text forms.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub library: Library,
}

impl Serialize for AnalysisResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_document().serialize(serializer)
    }
}

impl AnalysisResult {
    /// The library in its JSON interop shape.
    #[must_use]
    pub fn to_document(&self) -> LibraryDocument {
        to_json(&self.library)
    }

    /// Serializes the library into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the library into a YAML string with the JSON document's shape.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }

    /// Renders the library back into the text format.
    #[must_use]
    pub fn to_text(&self) -> String {
        to_text(&self.library)
    }

    /// Validates the library against BASE plus `tiers`.
    #[must_use]
    pub fn validate(&self, validator: &Validator, tiers: &[Tier]) -> ValidationReport {
        validator.validate(&self.library, tiers)
    }
}

/// Parses an mzSpecLib text library.
///
/// This is the primary entry point for text input. Parsing is all-or-nothing;
/// rule checking is a separate step, see [`AnalysisResult::validate`].
///
/// # Arguments
///
/// * `source` - The library text.
/// * `file_name` - The name of the file being analyzed (used for error reporting).
///
/// # Errors
///
/// Returns a `MzLibError::Parser` naming the first malformed line.
pub fn analyze(source: &str, file_name: &str) -> Result<AnalysisResult, MzLibError> {
    let mut parser = Parser::new_with_name(source, file_name.to_string());
    let library = parser.parse_library()?;
    Ok(AnalysisResult { library })
}

/// Reads a library from its JSON interop form.
///
/// # Errors
///
/// Returns a `MzLibError::Schema` if the document does not follow the schema.
pub fn analyze_json(source: &str) -> Result<AnalysisResult, MzLibError> {
    let library = from_json_str(source)?;
    Ok(AnalysisResult { library })
}
