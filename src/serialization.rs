//! The JSON interop form of a library.
//!
//! [`LibraryDocument`] mirrors the JSON schema field for field; [`to_json`]
//! and [`from_json`] map it to and from the attribute model. Peaks are stored
//! column-wise (`mzs`, `intensities`, `peak_annotations`, `aggregations`).

use crate::ast::*;
use crate::error::SchemaError;
use crate::vocabulary::terms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Written when a library carries no `library format version` attribute.
pub const DEFAULT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    pub format_version: String,
    #[serde(default)]
    pub attributes: Vec<JsonAttribute>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spectrum_attribute_sets: BTreeMap<String, Vec<JsonAttribute>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub analyte_attribute_sets: BTreeMap<String, Vec<JsonAttribute>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub interpretation_attribute_sets: BTreeMap<String, Vec<JsonAttribute>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_attribute_sets: BTreeMap<String, Vec<JsonAttribute>>,
    #[serde(default)]
    pub spectra: Vec<SpectrumDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonAttribute {
    pub accession: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_accession: Option<String>,
    /// An integer, or a string of digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_param_group: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<JsonAttribute>,
    #[serde(default)]
    pub mzs: Vec<f64>,
    #[serde(default)]
    pub intensities: Vec<f64>,
    #[serde(default)]
    pub peak_annotations: Vec<TokenColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Vec<TokenColumn>>,
    #[serde(default)]
    pub analytes: BTreeMap<String, AnalyteDocument>,
    #[serde(default)]
    pub interpretations: BTreeMap<String, InterpretationDocument>,
}

/// One peak's tokens: an array, or on input also a comma-joined string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenColumn {
    Tokens(Vec<String>),
    Joined(String),
}

impl TokenColumn {
    fn into_tokens(self) -> Vec<String> {
        match self {
            TokenColumn::Tokens(tokens) => tokens,
            TokenColumn::Joined(text) => text
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyteDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<JsonAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<JsonAttribute>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, AnalyteDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDocument {
    pub id: Value,
    #[serde(default)]
    pub attributes: Vec<JsonAttribute>,
}

// --- Library -> JSON ---

pub fn to_json(library: &Library) -> LibraryDocument {
    let mut sets: BTreeMap<SetTarget, BTreeMap<String, Vec<JsonAttribute>>> = BTreeMap::new();
    for set in library.attribute_sets.values() {
        sets.entry(set.target)
            .or_default()
            .insert(set.name.clone(), attributes_to_json(&set.attributes));
    }
    let mut take = |target: SetTarget| sets.remove(&target).unwrap_or_default();

    LibraryDocument {
        format_version: library
            .format_version()
            .unwrap_or_else(|| DEFAULT_FORMAT_VERSION.to_string()),
        attributes: attributes_to_json(&library.attributes),
        spectrum_attribute_sets: take(SetTarget::Spectrum),
        analyte_attribute_sets: take(SetTarget::Analyte),
        interpretation_attribute_sets: take(SetTarget::Interpretation),
        cluster_attribute_sets: take(SetTarget::Cluster),
        spectra: library.spectra.iter().map(spectrum_to_json).collect(),
        clusters: library
            .clusters
            .iter()
            .map(|cluster| ClusterDocument {
                id: Value::String(cluster.id.clone()),
                attributes: attributes_to_json(&cluster.attributes),
            })
            .collect(),
    }
}

pub fn to_json_string(library: &Library) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&to_json(library))
}

fn spectrum_to_json(spectrum: &Spectrum) -> SpectrumDocument {
    let has_aggregations = spectrum.peaks.iter().any(|p| !p.aggregations.is_empty());
    SpectrumDocument {
        id: Some(Value::String(spectrum.id.clone())),
        attributes: attributes_to_json(&spectrum.attributes),
        mzs: spectrum.peaks.iter().map(|p| p.mz).collect(),
        intensities: spectrum.peaks.iter().map(|p| p.intensity).collect(),
        peak_annotations: spectrum
            .peaks
            .iter()
            .map(|p| TokenColumn::Tokens(p.annotations.clone()))
            .collect(),
        aggregations: has_aggregations.then(|| {
            spectrum
                .peaks
                .iter()
                .map(|p| TokenColumn::Tokens(p.aggregations.clone()))
                .collect()
        }),
        analytes: spectrum
            .analytes
            .values()
            .map(|analyte| (analyte.id.to_string(), member_to_json(analyte.id, &analyte.attributes)))
            .collect(),
        interpretations: spectrum
            .interpretations
            .values()
            .map(|interpretation| {
                let document = InterpretationDocument {
                    id: Some(Value::from(interpretation.id)),
                    attributes: attributes_to_json(&interpretation.attributes),
                    members: interpretation
                        .members
                        .values()
                        .map(|m| (m.id.to_string(), member_to_json(m.id, &m.attributes)))
                        .collect(),
                };
                (interpretation.id.to_string(), document)
            })
            .collect(),
    }
}

fn member_to_json(id: u32, attributes: &Attributes) -> AnalyteDocument {
    AnalyteDocument {
        id: Some(Value::from(id)),
        attributes: attributes_to_json(attributes),
    }
}

fn attributes_to_json(attributes: &Attributes) -> Vec<JsonAttribute> {
    attributes.iter().map(attribute_to_json).collect()
}

fn attribute_to_json(attribute: &Attribute) -> JsonAttribute {
    let value = match &attribute.value {
        AttributeValue::String(s) => Value::String(s.clone()),
        AttributeValue::Integer(i) => Value::from(*i),
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::Boolean(b) => Value::Bool(*b),
        AttributeValue::Null => Value::Null,
    };
    JsonAttribute {
        accession: attribute.accession.clone(),
        name: attribute.name.clone(),
        value,
        value_accession: attribute.value_accession.clone(),
        cv_param_group: attribute.group_id.map(Value::from),
    }
}

// --- JSON -> Library ---

pub fn from_json_str(text: &str) -> Result<Library, SchemaError> {
    let document: LibraryDocument = serde_json::from_str(text)?;
    from_json(&document)
}

pub fn from_json(document: &LibraryDocument) -> Result<Library, SchemaError> {
    let mut library = Library::new();
    library.attributes = attributes_from_json(&document.attributes)?;

    let version = terms::LIBRARY_FORMAT_VERSION;
    match library.format_version() {
        None => library.attributes.insert(
            0,
            Attribute::new(version.accession, version.name, document.format_version.as_str()),
        ),
        Some(attribute) if attribute != document.format_version => {
            return Err(SchemaError::FormatVersionMismatch {
                declared: document.format_version.clone(),
                attribute,
            })
        }
        Some(_) => {}
    }

    let set_groups = [
        (SetTarget::Spectrum, &document.spectrum_attribute_sets),
        (SetTarget::Analyte, &document.analyte_attribute_sets),
        (SetTarget::Interpretation, &document.interpretation_attribute_sets),
        (SetTarget::Cluster, &document.cluster_attribute_sets),
    ];
    for (target, sets) in set_groups {
        for (name, attributes) in sets {
            let mut set = AttributeSet::new(target, name.clone());
            set.attributes = attributes_from_json(attributes)?;
            library.add_attribute_set(set);
        }
    }

    let mut spectrum_ids = HashSet::new();
    for (position, document) in document.spectra.iter().enumerate() {
        let spectrum = spectrum_from_json(position, document)?;
        if !spectrum_ids.insert(spectrum.id.clone()) {
            return Err(SchemaError::DuplicateId {
                entity: "spectrum".to_string(),
                id: spectrum.id,
            });
        }
        library.spectra.push(spectrum);
    }

    let mut cluster_ids = HashSet::new();
    for document in &document.clusters {
        let id = id_text(&document.id).ok_or_else(|| SchemaError::InvalidId {
            entity: "cluster".to_string(),
            id: document.id.to_string(),
        })?;
        if !cluster_ids.insert(id.clone()) {
            return Err(SchemaError::DuplicateId {
                entity: "cluster".to_string(),
                id,
            });
        }
        let mut cluster = Cluster::new(id);
        cluster.attributes = attributes_from_json(&document.attributes)?;
        library.clusters.push(cluster);
    }

    Ok(library)
}

fn spectrum_from_json(position: usize, document: &SpectrumDocument) -> Result<Spectrum, SchemaError> {
    let attributes = attributes_from_json(&document.attributes)?;

    // Spectra written by other tools may carry no id; fall back to the key, then the position.
    let id = match &document.id {
        Some(raw) => id_text(raw).ok_or_else(|| SchemaError::InvalidId {
            entity: "spectrum".to_string(),
            id: raw.to_string(),
        })?,
        None => attributes
            .get(terms::LIBRARY_SPECTRUM_KEY.accession)
            .map(|a| a.value.to_string())
            .unwrap_or_else(|| (position + 1).to_string()),
    };

    let mut spectrum = Spectrum::new(id);
    spectrum.attributes = attributes;
    spectrum.peaks = peaks_from_columns(&spectrum.id, document)?;

    for (key, analyte) in &document.analytes {
        let analyte_id = child_id("analyte", key)?;
        check_explicit_id("analyte", key, analyte_id, &analyte.id)?;
        spectrum.analytes.insert(
            analyte_id,
            Analyte {
                id: analyte_id,
                attributes: attributes_from_json(&analyte.attributes)?,
            },
        );
    }
    for (key, interpretation) in &document.interpretations {
        let interpretation_id = child_id("interpretation", key)?;
        check_explicit_id("interpretation", key, interpretation_id, &interpretation.id)?;
        let mut entity = Interpretation::new(interpretation_id);
        entity.attributes = attributes_from_json(&interpretation.attributes)?;
        for (member_key, member) in &interpretation.members {
            let member_id = child_id("interpretation member", member_key)?;
            check_explicit_id("interpretation member", member_key, member_id, &member.id)?;
            entity.members.insert(
                member_id,
                InterpretationMember {
                    id: member_id,
                    attributes: attributes_from_json(&member.attributes)?,
                },
            );
        }
        spectrum.interpretations.insert(interpretation_id, entity);
    }
    Ok(spectrum)
}

fn peaks_from_columns(spectrum: &str, document: &SpectrumDocument) -> Result<Vec<Peak>, SchemaError> {
    let count = document.mzs.len();
    let aggregations_len = document.aggregations.as_ref().map(Vec::len);
    if document.intensities.len() != count
        || document.peak_annotations.len() != count
        || aggregations_len.is_some_and(|n| n != count)
    {
        return Err(SchemaError::PeakArrayLength {
            spectrum: spectrum.to_string(),
            mzs: count,
            intensities: document.intensities.len(),
            annotations: document.peak_annotations.len(),
            aggregations: aggregations_len,
        });
    }

    let mut aggregations = document
        .aggregations
        .clone()
        .map(|column| column.into_iter().map(TokenColumn::into_tokens));
    let mut peaks = Vec::with_capacity(count);
    for ((mz, intensity), annotations) in document
        .mzs
        .iter()
        .zip(&document.intensities)
        .zip(document.peak_annotations.iter().cloned())
    {
        let mut peak = Peak::new(*mz, *intensity);
        peak.annotations = annotations.into_tokens();
        if let Some(column) = aggregations.as_mut() {
            peak.aggregations = column.next().unwrap_or_default();
        }
        peaks.push(peak);
    }
    Ok(peaks)
}

fn attributes_from_json(attributes: &[JsonAttribute]) -> Result<Attributes, SchemaError> {
    attributes.iter().map(attribute_from_json).collect()
}

fn attribute_from_json(json: &JsonAttribute) -> Result<Attribute, SchemaError> {
    let value = match &json.value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Boolean(*b),
        Value::String(s) => AttributeValue::String(s.clone()),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => AttributeValue::Integer(i),
            (None, Some(f)) => AttributeValue::Float(f),
            (None, None) => {
                return Err(SchemaError::UnsupportedValue {
                    accession: json.accession.clone(),
                    found: n.to_string(),
                })
            }
        },
        other => {
            return Err(SchemaError::UnsupportedValue {
                accession: json.accession.clone(),
                found: other.to_string(),
            })
        }
    };

    let mut attribute = Attribute::new(json.accession.clone(), json.name.clone(), value);
    attribute.value_accession = json.value_accession.clone();
    if let Some(group) = &json.cv_param_group {
        attribute.group_id = Some(group_id(&json.accession, group)?);
    }
    Ok(attribute)
}

fn group_id(accession: &str, raw: &Value) -> Result<u32, SchemaError> {
    let parsed = match raw {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| SchemaError::InvalidGroup {
        accession: accession.to_string(),
        value: raw.to_string(),
    })
}

fn child_id(entity: &str, key: &str) -> Result<u32, SchemaError> {
    key.parse().map_err(|_| SchemaError::InvalidId {
        entity: entity.to_string(),
        id: key.to_string(),
    })
}

fn check_explicit_id(entity: &str, key: &str, id: u32, explicit: &Option<Value>) -> Result<(), SchemaError> {
    let Some(raw) = explicit else {
        return Ok(());
    };
    match id_text(raw) {
        Some(text) if text.parse::<u32>() == Ok(id) => Ok(()),
        text => Err(SchemaError::IdMismatch {
            entity: entity.to_string(),
            key: key.to_string(),
            id: text.unwrap_or_else(|| raw.to_string()),
        }),
    }
}

fn id_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_library() -> Library {
        let mut library = Library::new();
        library
            .attributes
            .push(Attribute::new("MS:1003186", "library format version", "1.0"));
        let mut set = AttributeSet::new(SetTarget::Analyte, "tryptic");
        set.attributes.push(Attribute::flag("MS:1003000", "placeholder"));
        library.add_attribute_set(set);

        let mut spectrum = Spectrum::new("7");
        spectrum
            .attributes
            .push(Attribute::new("MS:1003237", "library spectrum key", 7i64));
        spectrum.attributes.push_group([
            Attribute::new("MS:1000894", "retention time", 12.5),
            Attribute::term_valued("UO:0000000", "unit", "UO:0000010", "second"),
        ]);
        spectrum
            .attributes
            .push(Attribute::new("MS:1000511", "ms level", true));
        let mut analyte = Analyte::new(1);
        analyte
            .attributes
            .push(Attribute::new("MS:1000041", "charge state", 2i64));
        spectrum.analytes.insert(1, analyte);
        let mut interpretation = Interpretation::new(1);
        interpretation.members.insert(1, InterpretationMember::new(1));
        spectrum.interpretations.insert(1, interpretation);
        spectrum.peaks.push(Peak::new(100.5, 10.0).with_annotations(["b1"]));
        spectrum.peaks.push(Peak::new(200.25, 20.0));
        library.spectra.push(spectrum);

        let mut cluster = Cluster::new("c1");
        cluster
            .attributes
            .push(Attribute::new("MS:1003267", "spectrum cluster key", 1i64));
        library.clusters.push(cluster);
        library
    }

    #[test]
    fn test_json_round_trip() {
        let library = sample_library();
        let text = to_json_string(&library).unwrap();
        assert_eq!(from_json_str(&text).unwrap(), library);
    }

    #[test]
    fn test_document_shape() {
        let document = serde_json::to_value(to_json(&sample_library())).unwrap();
        assert_eq!(document["format_version"], json!("1.0"));
        let spectrum = &document["spectra"][0];
        assert_eq!(spectrum["mzs"], json!([100.5, 200.25]));
        assert_eq!(spectrum["peak_annotations"], json!([["b1"], []]));
        assert!(spectrum.get("aggregations").is_none());
        assert_eq!(spectrum["attributes"][1]["cv_param_group"], json!(1));
        assert_eq!(spectrum["attributes"][2]["value_accession"], json!("UO:0000010"));
        assert_eq!(spectrum["analytes"]["1"]["attributes"][0]["value"], json!(2));
        assert!(document["analyte_attribute_sets"]["tryptic"].is_array());
    }

    #[test]
    fn test_lenient_inputs() {
        let text = r#"{
            "format_version": "1.0",
            "attributes": [],
            "spectra": [{
                "attributes": [
                    {"accession": "MS:1003237", "name": "library spectrum key", "value": 3},
                    {"accession": "MS:1000894", "name": "retention time", "value": 1.5, "cv_param_group": "4"}
                ],
                "mzs": [1.0, 2.0],
                "intensities": [3.0, 4.0],
                "peak_annotations": ["b1,y2", "?"]
            }]
        }"#;
        let library = from_json_str(text).unwrap();
        assert_eq!(library.attributes.len(), 1);
        assert_eq!(library.format_version().as_deref(), Some("1.0"));
        let spectrum = &library.spectra[0];
        assert_eq!(spectrum.id, "3");
        assert_eq!(spectrum.attributes.as_slice()[1].group_id, Some(4));
        assert_eq!(spectrum.peaks[0].annotations, vec!["b1", "y2"]);
        assert_eq!(spectrum.peaks[1].annotations, vec!["?"]);
    }

    #[test]
    fn test_peak_array_length_mismatch() {
        let text = r#"{"format_version": "1.0", "spectra": [{"id": "1",
            "mzs": [1.0, 2.0], "intensities": [3.0], "peak_annotations": [[], []]}]}"#;
        assert_eq!(
            from_json_str(text).unwrap_err(),
            SchemaError::PeakArrayLength {
                spectrum: "1".to_string(),
                mzs: 2,
                intensities: 1,
                annotations: 2,
                aggregations: None,
            }
        );
    }

    #[test]
    fn test_explicit_child_ids_must_match_their_keys() {
        let document = |analyte_id: &str, member_id: &str| {
            format!(
                r#"{{"format_version": "1.0", "spectra": [{{"id": "1",
                "analytes": {{"1": {{"id": {analyte_id}}}}},
                "interpretations": {{"1": {{"id": 1, "members": {{"1": {{"id": {member_id}}}}}}}}}}}]}}"#
            )
        };
        assert!(from_json_str(&document("1", "\"1\"")).is_ok());
        assert_eq!(
            from_json_str(&document("2", "1")).unwrap_err(),
            SchemaError::IdMismatch {
                entity: "analyte".to_string(),
                key: "1".to_string(),
                id: "2".to_string(),
            }
        );
        assert_eq!(
            from_json_str(&document("1", "\"x\"")).unwrap_err(),
            SchemaError::IdMismatch {
                entity: "interpretation member".to_string(),
                key: "1".to_string(),
                id: "x".to_string(),
            }
        );
    }

    #[test]
    fn test_format_version_mismatch() {
        let text = r#"{"format_version": "1.0", "attributes": [
            {"accession": "MS:1003186", "name": "library format version", "value": "2.0"}]}"#;
        assert!(matches!(
            from_json_str(text),
            Err(SchemaError::FormatVersionMismatch { .. })
        ));
    }

    #[test]
    fn test_schema_errors() {
        let bad_group = r#"{"format_version": "1.0", "attributes": [
            {"accession": "MS:1", "name": "x", "value": 1, "cv_param_group": -1}]}"#;
        assert!(matches!(from_json_str(bad_group), Err(SchemaError::InvalidGroup { .. })));

        let nested_value = r#"{"format_version": "1.0", "attributes": [
            {"accession": "MS:1", "name": "x", "value": [1, 2]}]}"#;
        assert!(matches!(
            from_json_str(nested_value),
            Err(SchemaError::UnsupportedValue { .. })
        ));

        assert!(matches!(from_json_str("{"), Err(SchemaError::Malformed { .. })));
        assert!(matches!(
            from_json_str(r#"{"attributes": []}"#),
            Err(SchemaError::Malformed { .. })
        ));
    }
}
