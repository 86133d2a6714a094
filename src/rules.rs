//! Declarative rule tables.
//!
//! A table holds the rules of one certification tier. Tables are data: they
//! are loaded from JSON or YAML, checked once at load time, and never
//! interpreted as code. The six standard tiers ship embedded in the crate.

use crate::ast::{Attributes, AttributeValue, SetTarget};
use crate::error::RuleConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A certification tier, named by its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Tier(Cow<'static, str>);

impl Tier {
    pub const BASE: Tier = Tier(Cow::Borrowed("BASE"));
    pub const CONSENSUS: Tier = Tier(Cow::Borrowed("CONSENSUS"));
    pub const GOLD: Tier = Tier(Cow::Borrowed("GOLD"));
    pub const PEPTIDE: Tier = Tier(Cow::Borrowed("PEPTIDE"));
    pub const SILVER: Tier = Tier(Cow::Borrowed("SILVER"));
    pub const SINGLE: Tier = Tier(Cow::Borrowed("SINGLE"));

    /// Tier names are case-insensitive and stored upper-case.
    pub fn new(name: &str) -> Self {
        Tier(Cow::Owned(name.trim().to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn builtin() -> [Tier; 6] {
        [
            Tier::BASE,
            Tier::CONSENSUS,
            Tier::GOLD,
            Tier::PEPTIDE,
            Tier::SILVER,
            Tier::SINGLE,
        ]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementLevel {
    Must,
    Should,
}

impl RequirementLevel {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "MUST" => Some(RequirementLevel::Must),
            "SHOULD" => Some(RequirementLevel::Should),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementLevel::Must => "MUST",
            RequirementLevel::Should => "SHOULD",
        }
    }
}

impl fmt::Display for RequirementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombinationLogic {
    And,
    #[default]
    Or,
}

impl CombinationLogic {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "AND" => Some(CombinationLogic::And),
            "OR" => Some(CombinationLogic::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CombinationLogic::And => "AND",
            CombinationLogic::Or => "OR",
        }
    }
}

/// The entity kinds a rule can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityPath {
    Library,
    Spectrum,
    Analyte,
    Interpretation,
}

impl EntityPath {
    pub const ALL: [EntityPath; 4] = [
        EntityPath::Library,
        EntityPath::Spectrum,
        EntityPath::Analyte,
        EntityPath::Interpretation,
    ];

    pub fn parse(text: &str) -> Option<Self> {
        EntityPath::ALL.into_iter().find(|p| p.as_str() == text.trim())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPath::Library => "/Library",
            EntityPath::Spectrum => "/Library/Spectrum",
            EntityPath::Analyte => "/Library/Spectrum/Analyte",
            EntityPath::Interpretation => "/Library/Spectrum/Interpretation",
        }
    }

    /// The attribute set kind entities at this path may reference.
    pub fn set_target(&self) -> Option<SetTarget> {
        match self {
            EntityPath::Library => None,
            EntityPath::Spectrum => Some(SetTarget::Spectrum),
            EntityPath::Analyte => Some(SetTarget::Analyte),
            EntityPath::Interpretation => Some(SetTarget::Interpretation),
        }
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
}

impl ValueType {
    /// Accepts XML Schema names with or without the `xsd:` prefix.
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("xsd:").unwrap_or(&lowered);
        match name {
            "string" => Some(ValueType::String),
            "integer" | "int" | "long" | "nonnegativeinteger" | "positiveinteger" => {
                Some(ValueType::Integer)
            }
            "float" | "double" | "decimal" => Some(ValueType::Float),
            "boolean" | "bool" => Some(ValueType::Boolean),
            "datetime" => Some(ValueType::DateTime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "xsd:string",
            ValueType::Integer => "xsd:integer",
            ValueType::Float => "xsd:float",
            ValueType::Boolean => "xsd:boolean",
            ValueType::DateTime => "xsd:dateTime",
        }
    }

    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match self {
            ValueType::String => matches!(value, AttributeValue::String(_)),
            ValueType::Integer => value.as_i64().is_some(),
            ValueType::Float => value.as_f64().is_some(),
            ValueType::Boolean => matches!(value, AttributeValue::Boolean(_)),
            // Timestamps are not parsed; any non-empty text is taken as one.
            ValueType::DateTime => value.as_str().is_some_and(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueConstraint {
    /// No two entities at the rule's path may share the value.
    Unique,
    /// The value must be one of these types.
    OfType(Vec<ValueType>),
    /// The value's term must be a strict descendant of this accession.
    ChildOf(String),
}

/// One slot of a rule's term list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermRule {
    pub accession: String,
    pub name: String,
    pub repeatable: bool,
    pub allow_children: bool,
    pub value: Option<ValueConstraint>,
}

impl TermRule {
    pub fn new(accession: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            name: name.into(),
            repeatable: false,
            allow_children: false,
            value: None,
        }
    }

    pub fn key(&self) -> String {
        format!("{}|{}", self.accession, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub tier: Tier,
    pub id: String,
    pub path: EntityPath,
    pub requirement_level: RequirementLevel,
    pub combination_logic: CombinationLogic,
    pub terms: Vec<TermRule>,
}

/// Restricts a table's spectrum-level rules to spectra carrying a given
/// term-valued attribute, e.g. `spectrum aggregation type=singleton spectrum`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpectrumPredicate {
    pub accession: String,
    pub value_accession: String,
}

impl SpectrumPredicate {
    pub fn new(accession: impl Into<String>, value_accession: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            value_accession: value_accession.into(),
        }
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        attributes
            .get_all(&self.accession)
            .any(|a| a.value_accession.as_deref() == Some(self.value_accession.as_str()))
    }
}

impl fmt::Display for SpectrumPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.accession, self.value_accession)
    }
}

/// The rules of one tier, in table order with exact duplicates removed.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable {
    tier: Tier,
    rules: Vec<Rule>,
    applies_to: Option<SpectrumPredicate>,
}

impl RuleTable {
    pub fn new(tier: Tier, rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut unique: Vec<Rule> = Vec::new();
        for rule in rules {
            if unique.contains(&rule) {
                debug!("{tier}: dropping duplicate rule `{}`", rule.id);
                continue;
            }
            unique.push(rule);
        }
        Self {
            tier,
            rules: unique,
            applies_to: None,
        }
    }

    /// Limits the Spectrum, Analyte and Interpretation rules to matching spectra.
    pub fn with_spectrum_predicate(mut self, predicate: SpectrumPredicate) -> Self {
        self.applies_to = Some(predicate);
        self
    }

    pub fn tier(&self) -> &Tier {
        &self.tier
    }

    pub fn spectrum_predicate(&self) -> Option<&SpectrumPredicate> {
        self.applies_to.as_ref()
    }

    /// Whether the table's spectrum-level rules apply to a spectrum with
    /// these (resolved) attributes. Tables without a predicate apply to all.
    pub fn applies_to_spectrum(&self, attributes: &Attributes) -> bool {
        self.applies_to
            .as_ref()
            .map_or(true, |predicate| predicate.matches(attributes))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_for(&self, path: EntityPath) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.path == path)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Loads a table from JSON text.
    ///
    /// # Errors
    /// Returns a `RuleConfigError` naming the first rule that fails to load.
    pub fn from_json_str(text: &str) -> Result<Self, RuleConfigError> {
        let raw: RawTable = serde_json::from_str(text).map_err(|e| RuleConfigError::Malformed {
            message: e.to_string(),
        })?;
        raw.into_table()
    }

    /// Loads a table from YAML text with the same shape as the JSON form.
    ///
    /// # Errors
    /// Returns a `RuleConfigError` naming the first rule that fails to load.
    pub fn from_yaml_str(text: &str) -> Result<Self, RuleConfigError> {
        let raw: RawTable = serde_yaml::from_str(text).map_err(|e| RuleConfigError::Malformed {
            message: e.to_string(),
        })?;
        raw.into_table()
    }

    /// The bundled table for one of the six standard tiers.
    pub fn builtin(tier: &Tier) -> Result<Self, RuleConfigError> {
        let text = match tier.as_str() {
            "BASE" => include_str!("../rules/base.json"),
            "CONSENSUS" => include_str!("../rules/consensus.json"),
            "GOLD" => include_str!("../rules/gold.json"),
            "PEPTIDE" => include_str!("../rules/peptide.json"),
            "SILVER" => include_str!("../rules/silver.json"),
            "SINGLE" => include_str!("../rules/single.json"),
            other => {
                return Err(RuleConfigError::Malformed {
                    message: format!("no bundled rule table for tier `{other}`"),
                })
            }
        };
        Self::from_json_str(text)
    }

    pub fn builtin_tables() -> Result<Vec<Self>, RuleConfigError> {
        Tier::builtin().iter().map(Self::builtin).collect()
    }
}

// --- Declarative source form ---

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(default)]
    name: String,
    #[serde(default)]
    applies_to: Option<RawPredicate>,
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawPredicate {
    accession: String,
    value_accession: String,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    id: String,
    path: String,
    requirement_level: String,
    #[serde(default)]
    combination_logic: Option<String>,
    #[serde(default)]
    attr: Vec<RawTerm>,
}

#[derive(Debug, Deserialize)]
struct RawTerm {
    accession: String,
    name: String,
    #[serde(default)]
    repeatable: bool,
    #[serde(default)]
    allow_children: bool,
    #[serde(default)]
    value: Option<RawConstraint>,
}

#[derive(Debug, Deserialize)]
struct RawConstraint {
    name: String,
    #[serde(default)]
    accession: Option<String>,
    #[serde(default)]
    value: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl RawTable {
    fn into_table(self) -> Result<RuleTable, RuleConfigError> {
        if self.name.trim().is_empty() {
            return Err(RuleConfigError::MissingTier);
        }
        let tier = Tier::new(&self.name);
        let rules = self
            .rules
            .into_iter()
            .map(|raw| raw.into_rule(&tier))
            .collect::<Result<Vec<_>, _>>()?;
        let table = RuleTable::new(tier, rules);
        match self.applies_to {
            None => Ok(table),
            Some(raw) if raw.accession.trim().is_empty() || raw.value_accession.trim().is_empty() => {
                Err(RuleConfigError::Malformed {
                    message: format!("table `{}`: applies_to needs an accession and a value_accession", self.name),
                })
            }
            Some(raw) => Ok(table.with_spectrum_predicate(SpectrumPredicate::new(
                raw.accession,
                raw.value_accession,
            ))),
        }
    }
}

impl RawRule {
    fn into_rule(self, tier: &Tier) -> Result<Rule, RuleConfigError> {
        let path = EntityPath::parse(&self.path).ok_or_else(|| RuleConfigError::UnknownPath {
            rule: self.id.clone(),
            path: self.path.clone(),
        })?;
        let requirement_level = RequirementLevel::parse(&self.requirement_level).ok_or_else(|| {
            RuleConfigError::UnknownRequirementLevel {
                rule: self.id.clone(),
                level: self.requirement_level.clone(),
            }
        })?;
        let combination_logic = match &self.combination_logic {
            None => CombinationLogic::default(),
            Some(text) => CombinationLogic::parse(text).ok_or_else(|| {
                RuleConfigError::UnknownCombinationLogic {
                    rule: self.id.clone(),
                    logic: text.clone(),
                }
            })?,
        };
        if self.attr.is_empty() {
            return Err(RuleConfigError::EmptyTermList { rule: self.id });
        }

        let mut terms = Vec::with_capacity(self.attr.len());
        for term in self.attr {
            let value = match term.value {
                Some(constraint) => Some(constraint.into_constraint(&self.id, &term.accession)?),
                None => None,
            };
            terms.push(TermRule {
                accession: term.accession,
                name: term.name,
                repeatable: term.repeatable,
                allow_children: term.allow_children,
                value,
            });
        }

        Ok(Rule {
            tier: tier.clone(),
            id: self.id,
            path,
            requirement_level,
            combination_logic,
            terms,
        })
    }
}

impl RawConstraint {
    fn into_constraint(self, rule: &str, accession: &str) -> Result<ValueConstraint, RuleConfigError> {
        let missing_argument = || RuleConfigError::MissingConstraintArgument {
            rule: rule.to_string(),
            accession: accession.to_string(),
            constraint: self.name.clone(),
        };
        match self.name.as_str() {
            "value_is_unique" => Ok(ValueConstraint::Unique),
            "value_is_child_of" => match &self.accession {
                Some(parent) if !parent.is_empty() => Ok(ValueConstraint::ChildOf(parent.clone())),
                _ => Err(missing_argument()),
            },
            "value_of_type" => {
                let names = match &self.value {
                    Some(OneOrMany::One(name)) => vec![name.clone()],
                    Some(OneOrMany::Many(names)) if !names.is_empty() => names.clone(),
                    _ => return Err(missing_argument()),
                };
                names
                    .iter()
                    .map(|name| {
                        ValueType::parse(name).ok_or_else(|| RuleConfigError::UnknownValueType {
                            rule: rule.to_string(),
                            value_type: name.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(ValueConstraint::OfType)
            }
            other => Err(RuleConfigError::UnknownValueConstraint {
                rule: rule.to_string(),
                accession: accession.to_string(),
                constraint: other.to_string(),
            }),
        }
    }
}
