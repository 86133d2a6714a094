use crate::utils::looks_numeric;
use crate::vocabulary::terms;
use std::collections::BTreeMap;
use std::fmt;

// --- Attribute values ---

/// The value half of an attribute. Text values are typed on parse: booleans,
/// 64-bit integers and finite floats are recognised, everything else stays a string.
#[derive(Debug, PartialEq, Clone)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl AttributeValue {
    /// Types a raw value taken from the text format.
    pub fn parse(text: &str) -> Self {
        match text {
            "true" => return AttributeValue::Boolean(true),
            "false" => return AttributeValue::Boolean(false),
            _ => {}
        }
        if let Ok(integer) = text.parse::<i64>() {
            return AttributeValue::Integer(integer);
        }
        if looks_numeric(text) {
            if let Ok(float) = text.parse::<f64>() {
                if float.is_finite() {
                    return AttributeValue::Float(float);
                }
            }
        }
        AttributeValue::String(text.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, and floats with no fractional part that fit in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        // 2^63 is exact as an f64; anything at or beyond it would saturate.
        const LIMIT: f64 = 9_223_372_036_854_775_808.0;
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::Float(f) if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            // Debug keeps the shortest representation that parses back to the same bits.
            AttributeValue::Float(x) => write!(f, "{x:?}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Null => Ok(()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

// --- Attributes ---

/// A CV term with an optional value, an optional value term and an optional group.
#[derive(Debug, PartialEq, Clone)]
pub struct Attribute {
    pub accession: String,
    pub name: String,
    pub value: AttributeValue,
    /// Accession of the CV term the value names, e.g. `UO:0000010` for `second`.
    pub value_accession: Option<String>,
    pub group_id: Option<u32>,
}

impl Attribute {
    pub fn new(
        accession: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            accession: accession.into(),
            name: name.into(),
            value: value.into(),
            value_accession: None,
            group_id: None,
        }
    }

    /// An attribute that carries no value.
    pub fn flag(accession: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(accession, name, AttributeValue::Null)
    }

    /// An attribute whose value is itself a CV term, e.g. `unit=UO:0000010|second`.
    pub fn term_valued(
        accession: impl Into<String>,
        name: impl Into<String>,
        value_accession: impl Into<String>,
        value_name: impl Into<String>,
    ) -> Self {
        Self::new(accession, name, AttributeValue::String(value_name.into()))
            .with_value_accession(value_accession)
    }

    pub fn with_value_accession(mut self, value_accession: impl Into<String>) -> Self {
        self.value_accession = Some(value_accession.into());
        self
    }

    pub fn in_group(mut self, group_id: u32) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// `ACCESSION|name`, the form used in messages and rule tables.
    pub fn key(&self) -> String {
        format!("{}|{}", self.accession, self.name)
    }

    pub fn is_attribute_set_reference(&self) -> bool {
        self.accession == terms::LIBRARY_ATTRIBUTE_SET_NAME.accession
    }
}

/// The ordered attribute list owned by one entity.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.items.push(attribute);
    }

    pub fn insert(&mut self, index: usize, attribute: Attribute) {
        self.items.insert(index.min(self.items.len()), attribute);
    }

    /// Appends `attributes` as one new group and returns the group id it received.
    pub fn push_group(&mut self, attributes: impl IntoIterator<Item = Attribute>) -> u32 {
        let group_id = self.next_group_id();
        for attribute in attributes {
            self.items.push(attribute.in_group(group_id));
        }
        group_id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Attribute] {
        &self.items
    }

    /// First attribute with this accession.
    pub fn get(&self, accession: &str) -> Option<&Attribute> {
        self.items.iter().find(|a| a.accession == accession)
    }

    pub fn get_all<'a>(&'a self, accession: &'a str) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.items.iter().filter(move |a| a.accession == accession)
    }

    pub fn contains(&self, accession: &str) -> bool {
        self.get(accession).is_some()
    }

    /// Group id → attributes of that group, each list in insertion order.
    pub fn groups(&self) -> BTreeMap<u32, Vec<&Attribute>> {
        let mut groups: BTreeMap<u32, Vec<&Attribute>> = BTreeMap::new();
        for attribute in &self.items {
            if let Some(group_id) = attribute.group_id {
                groups.entry(group_id).or_default().push(attribute);
            }
        }
        groups
    }

    pub fn group(&self, group_id: u32) -> Vec<&Attribute> {
        self.items
            .iter()
            .filter(|a| a.group_id == Some(group_id))
            .collect()
    }

    pub fn max_group_id(&self) -> Option<u32> {
        self.items.iter().filter_map(|a| a.group_id).max()
    }

    pub fn next_group_id(&self) -> u32 {
        self.max_group_id().map_or(1, |max| max + 1)
    }

    /// Names of the attribute sets this list references, in order.
    pub fn set_references(&self) -> impl Iterator<Item = String> + '_ {
        self.items
            .iter()
            .filter(|a| a.is_attribute_set_reference())
            .map(|a| a.value.to_string())
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// --- Entities ---

/// The entity kinds an attribute set can be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetTarget {
    Spectrum,
    Analyte,
    Interpretation,
    Cluster,
}

impl SetTarget {
    pub const ALL: [SetTarget; 4] = [
        SetTarget::Spectrum,
        SetTarget::Analyte,
        SetTarget::Interpretation,
        SetTarget::Cluster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SetTarget::Spectrum => "Spectrum",
            SetTarget::Analyte => "Analyte",
            SetTarget::Interpretation => "Interpretation",
            SetTarget::Cluster => "Cluster",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        SetTarget::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for SetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeSetKey {
    pub target: SetTarget,
    pub name: String,
}

impl AttributeSetKey {
    pub fn new(target: SetTarget, name: impl Into<String>) -> Self {
        Self {
            target,
            name: name.into(),
        }
    }
}

/// A named bundle of attributes that entities of one kind may reference.
#[derive(Debug, PartialEq, Clone)]
pub struct AttributeSet {
    pub target: SetTarget,
    pub name: String,
    pub attributes: Attributes,
}

impl AttributeSet {
    pub fn new(target: SetTarget, name: impl Into<String>) -> Self {
        Self {
            target,
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn key(&self) -> AttributeSetKey {
        AttributeSetKey::new(self.target, self.name.clone())
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Library {
    pub attributes: Attributes,
    pub attribute_sets: BTreeMap<AttributeSetKey, AttributeSet>,
    pub spectra: Vec<Spectrum>,
    pub clusters: Vec<Cluster>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// The declared `library format version`, if any.
    pub fn format_version(&self) -> Option<String> {
        self.attributes
            .get(terms::LIBRARY_FORMAT_VERSION.accession)
            .map(|a| a.value.to_string())
    }

    pub fn attribute_set(&self, target: SetTarget, name: &str) -> Option<&AttributeSet> {
        self.attribute_sets.get(&AttributeSetKey::new(target, name))
    }

    /// Adds or replaces a set, returning the one it replaced.
    pub fn add_attribute_set(&mut self, set: AttributeSet) -> Option<AttributeSet> {
        self.attribute_sets.insert(set.key(), set)
    }

    pub fn attribute_sets_for(&self, target: SetTarget) -> impl Iterator<Item = &AttributeSet> {
        self.attribute_sets.values().filter(move |s| s.target == target)
    }

    pub fn spectrum(&self, id: &str) -> Option<&Spectrum> {
        self.spectra.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Spectrum {
    /// The `K` of `<Spectrum=K>`.
    pub id: String,
    pub attributes: Attributes,
    pub analytes: BTreeMap<u32, Analyte>,
    pub interpretations: BTreeMap<u32, Interpretation>,
    pub peaks: Vec<Peak>,
}

impl Spectrum {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
            analytes: BTreeMap::new(),
            interpretations: BTreeMap::new(),
            peaks: Vec::new(),
        }
    }

    pub fn key(&self) -> Option<&AttributeValue> {
        self.attributes
            .get(terms::LIBRARY_SPECTRUM_KEY.accession)
            .map(|a| &a.value)
    }

    pub fn index(&self) -> Option<&AttributeValue> {
        self.attributes
            .get(terms::LIBRARY_SPECTRUM_INDEX.accession)
            .map(|a| &a.value)
    }

    /// The `number of peaks` attribute, when present.
    pub fn declared_peak_count(&self) -> Option<&Attribute> {
        self.attributes.get(terms::NUMBER_OF_PEAKS.accession)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Analyte {
    pub id: u32,
    pub attributes: Attributes,
}

impl Analyte {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            attributes: Attributes::new(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Interpretation {
    pub id: u32,
    pub attributes: Attributes,
    /// Keyed by the id of the analyte each member describes.
    pub members: BTreeMap<u32, InterpretationMember>,
}

impl Interpretation {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            attributes: Attributes::new(),
            members: BTreeMap::new(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct InterpretationMember {
    pub id: u32,
    pub attributes: Attributes,
}

impl InterpretationMember {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            attributes: Attributes::new(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Cluster {
    pub id: String,
    pub attributes: Attributes,
}

impl Cluster {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }
}

/// One row of a peak list. Annotations and aggregations are opaque tokens.
#[derive(Debug, PartialEq, Clone)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
    pub annotations: Vec<String>,
    pub aggregations: Vec<String>,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self {
            mz,
            intensity,
            annotations: Vec::new(),
            aggregations: Vec::new(),
        }
    }

    pub fn with_annotations<I, S>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.annotations = annotations.into_iter().map(Into::into).collect();
        self
    }
}

/// A single top-level record, as produced by record-at-a-time parsing.
#[derive(Debug, PartialEq, Clone)]
pub enum Record {
    Spectrum(Spectrum),
    Cluster(Cluster),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_typing() {
        assert_eq!(AttributeValue::parse("true"), AttributeValue::Boolean(true));
        assert_eq!(AttributeValue::parse("42"), AttributeValue::Integer(42));
        assert_eq!(AttributeValue::parse("-3.5e2"), AttributeValue::Float(-350.0));
        assert_eq!(AttributeValue::parse("1.0"), AttributeValue::Float(1.0));
        assert_eq!(
            AttributeValue::parse("inf"),
            AttributeValue::String("inf".to_string())
        );
        assert_eq!(
            AttributeValue::parse("PEPTIDE/2"),
            AttributeValue::String("PEPTIDE/2".to_string())
        );
    }

    #[test]
    fn test_integral_floats_convert_only_within_range() {
        assert_eq!(AttributeValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(AttributeValue::Float(-9.223_372_036_854_775_808e18).as_i64(), Some(i64::MIN));
        assert_eq!(AttributeValue::Float(9.223_372_036_854_775_808e18).as_i64(), None);
        assert_eq!(AttributeValue::Float(1e30).as_i64(), None);
        assert_eq!(AttributeValue::Float(-1e30).as_i64(), None);
    }

    #[test]
    fn test_float_display_is_exact() {
        let value = AttributeValue::Float(1234.567_890_123_456_7);
        let reparsed = AttributeValue::parse(&value.to_string());
        assert_eq!(reparsed, value);
        assert_eq!(AttributeValue::Float(1.0).to_string(), "1.0");
    }

    #[test]
    fn test_groups_follow_insertion_order() {
        let mut attributes = Attributes::new();
        attributes.push(Attribute::new("MS:1003061", "spectrum name", "A/2"));
        let rt = attributes.push_group([
            Attribute::new("MS:1000894", "retention time", 12.5),
            Attribute::term_valued("UO:0000000", "unit", "UO:0000010", "second"),
        ]);
        let ce = attributes.push_group([
            Attribute::new("MS:1000045", "collision energy", 30i64),
            Attribute::term_valued("UO:0000000", "unit", "UO:0000266", "electronvolt"),
        ]);

        assert_eq!((rt, ce), (1, 2));
        let groups = attributes.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&1][0].name, "retention time");
        assert_eq!(groups[&1][1].value_accession.as_deref(), Some("UO:0000010"));
        assert_eq!(attributes.next_group_id(), 3);
        assert_eq!(attributes.group(2).len(), 2);
    }

    #[test]
    fn test_set_references() {
        let attributes: Attributes = [
            Attribute::new("MS:1003212", "library attribute set name", "all"),
            Attribute::new("MS:1003061", "spectrum name", "x"),
            Attribute::new("MS:1003212", "library attribute set name", "hcd"),
        ]
        .into_iter()
        .collect();
        let names: Vec<String> = attributes.set_references().collect();
        assert_eq!(names, vec!["all", "hcd"]);
    }
}
