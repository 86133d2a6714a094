//! Tiered rule checking.
//!
//! Rules never abort: every unmet MUST becomes a failure and every unmet
//! SHOULD a warning, collected into a [`ValidationReport`] that reports each
//! tier independently. Entities are checked against their attributes with
//! attribute set references expanded at this point, not at parse time.

use crate::ast::{Attribute, Attributes, Cluster, Library, SetTarget, Spectrum};
use crate::resolver::{Resolved, Resolver};
use crate::rules::{
    CombinationLogic, EntityPath, RequirementLevel, Rule, RuleTable, TermRule, Tier, ValueConstraint,
    ValueType,
};
use crate::error::RuleConfigError;
use crate::vocabulary::{TermResolver, Vocabulary};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const SET_RESOLUTION_RULE: &str = "attribute_set_resolves";
const TERM_NAME_RULE: &str = "attribute_name_matches_cv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Failure,
    Warning,
}

impl Severity {
    fn level_name(&self) -> &'static str {
        match self {
            Severity::Failure => RequirementLevel::Must.as_str(),
            Severity::Warning => RequirementLevel::Should.as_str(),
        }
    }
}

impl From<RequirementLevel> for Severity {
    fn from(level: RequirementLevel) -> Self {
        match level {
            RequirementLevel::Must => Severity::Failure,
            RequirementLevel::Should => Severity::Warning,
        }
    }
}

/// One unmet rule on one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub tier: Tier,
    pub rule: String,
    pub severity: Severity,
    /// The rule path, e.g. `/Library/Spectrum`.
    pub path: String,
    /// The entity the rule was applied to, e.g. `Spectrum=1/Analyte=1`.
    pub entity: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierOutcome {
    pub tier: Tier,
    pub failures: usize,
    pub warnings: usize,
}

impl TierOutcome {
    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// The tiers that were evaluated, BASE first.
    pub tiers: Vec<Tier>,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn findings_for<'a>(&'a self, tier: &'a Tier) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| &f.tier == tier)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Failure)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    /// A tier passes when it was evaluated and none of its MUST rules failed.
    pub fn passed(&self, tier: &Tier) -> bool {
        self.tiers.contains(tier)
            && self
                .findings_for(tier)
                .all(|f| f.severity != Severity::Failure)
    }

    pub fn is_valid(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcomes(&self) -> Vec<TierOutcome> {
        self.tiers
            .iter()
            .map(|tier| {
                let (failures, warnings) =
                    self.findings_for(tier)
                        .fold((0, 0), |(failures, warnings), f| match f.severity {
                            Severity::Failure => (failures + 1, warnings),
                            Severity::Warning => (failures, warnings + 1),
                        });
                TierOutcome {
                    tier: tier.clone(),
                    failures,
                    warnings,
                }
            })
            .collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mzSpecLib Validation Report")?;
        writeln!(f, "===========================")?;
        writeln!(f)?;

        let outcomes = self.outcomes();
        for outcome in &outcomes {
            let symbol = match (outcome.failures, outcome.warnings) {
                (0, 0) => "✓",
                (0, _) => "⚠",
                _ => "✗",
            };
            write!(f, "[{symbol}] {}", outcome.tier)?;
            if outcome.failures + outcome.warnings > 0 {
                write!(
                    f,
                    " - {} failures, {} warnings",
                    outcome.failures, outcome.warnings
                )?;
            }
            writeln!(f)?;
            for finding in self.findings_for(&outcome.tier) {
                let mark = match finding.severity {
                    Severity::Failure => "✗",
                    Severity::Warning => "⚠",
                };
                writeln!(
                    f,
                    "    {mark} {} at {}: {}",
                    finding.rule, finding.entity, finding.message
                )?;
            }
        }

        let passed = outcomes.iter().filter(|o| o.passed()).count();
        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} passed, {} failed",
            passed,
            outcomes.len() - passed
        )
    }
}

/// Checks libraries against a set of tier tables.
///
/// The CV ontology is consulted only through the injected [`TermResolver`]:
/// for `allow_children` slots, `value_is_child_of` constraints and name checks.
pub struct Validator {
    resolver: Box<dyn TermResolver + Send + Sync>,
    tables: BTreeMap<Tier, RuleTable>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Vocabulary::new())
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("tiers", &self.tables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// A validator with no rule tables loaded.
    pub fn new<R>(resolver: R) -> Self
    where
        R: TermResolver + Send + Sync + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            tables: BTreeMap::new(),
        }
    }

    /// Adds a table, replacing any table already loaded for its tier.
    pub fn with_table(mut self, table: RuleTable) -> Self {
        self.tables.insert(table.tier().clone(), table);
        self
    }

    /// Loads the six bundled tier tables.
    pub fn with_builtin_tiers(mut self) -> Result<Self, RuleConfigError> {
        for table in RuleTable::builtin_tables()? {
            self = self.with_table(table);
        }
        Ok(self)
    }

    pub fn tiers(&self) -> impl Iterator<Item = &Tier> {
        self.tables.keys()
    }

    pub fn table(&self, tier: &Tier) -> Option<&RuleTable> {
        self.tables.get(tier)
    }

    /// Validates a whole library against BASE plus the requested tiers.
    pub fn validate(&self, library: &Library, tiers: &[Tier]) -> ValidationReport {
        let mut session = self.session(library, tiers);
        for spectrum in &library.spectra {
            session.validate_spectrum(spectrum);
        }
        for cluster in &library.clusters {
            session.validate_cluster(cluster);
        }
        session.finish()
    }

    /// Starts a record-at-a-time validation against `header`, which supplies
    /// the library attributes and attribute sets. The library attributes are
    /// checked immediately.
    pub fn session<'v, 'l>(&'v self, header: &'l Library, tiers: &[Tier]) -> ValidationSession<'v, 'l> {
        let mut selected = vec![Tier::BASE];
        for tier in tiers {
            if selected.contains(tier) {
                continue;
            }
            if self.tables.contains_key(tier) {
                selected.push(tier.clone());
            } else {
                warn!("no rule table loaded for tier {tier}, skipping it");
            }
        }
        let tables = selected.iter().filter_map(|t| self.tables.get(t)).collect();

        let mut session = ValidationSession {
            validator: self,
            header,
            tiers: selected,
            tables,
            findings: Vec::new(),
            unique_values: BTreeMap::new(),
        };
        let tables = session.tables.clone();
        session.check_entity(EntityPath::Library, "Library", "Library", &header.attributes, &tables);
        session
    }

    fn matches_term(&self, term: &TermRule, attribute: &Attribute) -> bool {
        attribute.accession == term.accession
            || (term.allow_children
                && self
                    .resolver
                    .is_descendant_of(&attribute.accession, &term.accession))
    }

    /// The local (per-entity) part of a slot's value constraint.
    fn check_value(&self, term: &TermRule, attribute: &Attribute) -> Result<(), String> {
        match &term.value {
            None | Some(ValueConstraint::Unique) => Ok(()),
            Some(ValueConstraint::OfType(types)) => {
                if types.iter().any(|t| t.accepts(&attribute.value)) {
                    return Ok(());
                }
                let expected: Vec<&str> = types.iter().map(ValueType::as_str).collect();
                Err(format!(
                    "{} has value `{}`, expected {}",
                    attribute.key(),
                    attribute.value,
                    expected.join(" or ")
                ))
            }
            Some(ValueConstraint::ChildOf(parent)) => match attribute.value_accession.as_deref() {
                Some(value_term) if self.resolver.is_descendant_of(value_term, parent) => Ok(()),
                Some(value_term) => Err(format!(
                    "{} value {value_term} is not a child of {parent}",
                    attribute.key()
                )),
                None => Err(format!(
                    "{} value `{}` is not a CV term under {parent}",
                    attribute.key(),
                    attribute.value
                )),
            },
        }
    }
}

enum SlotOutcome {
    Satisfied,
    Missing,
    Invalid(String),
}

struct UniqueValues {
    level: RequirementLevel,
    path: EntityPath,
    // (value, spectrum label, entity) in the order they were seen
    seen: Vec<(String, String, String)>,
}

/// Validation of one library, fed one record at a time.
///
/// Only the values of `value_is_unique` slots are retained between records;
/// the uniqueness check runs in [`ValidationSession::finish`].
pub struct ValidationSession<'v, 'l> {
    validator: &'v Validator,
    header: &'l Library,
    tiers: Vec<Tier>,
    tables: Vec<&'v RuleTable>,
    findings: Vec<Finding>,
    unique_values: BTreeMap<(Tier, String, String), UniqueValues>,
}

impl<'v, 'l> ValidationSession<'v, 'l> {
    pub fn validate_spectrum(&mut self, spectrum: &Spectrum) {
        let entity = format!("Spectrum={}", spectrum.id);
        let label = spectrum
            .index()
            .map(|index| index.to_string())
            .unwrap_or_else(|| spectrum.id.clone());
        debug!("validating {entity}");

        let path = EntityPath::Spectrum;
        let resolved = self.check_references(path.as_str(), &entity, path.set_target(), &spectrum.attributes);
        let tables: Vec<&'v RuleTable> = self
            .tables
            .iter()
            .copied()
            .filter(|table| {
                let applies = table.applies_to_spectrum(&resolved.attributes);
                if !applies {
                    debug!("{}: {entity} is not a match for its spectrum predicate", table.tier());
                }
                applies
            })
            .collect();
        self.apply_rules(path, &entity, &label, &resolved.attributes, &tables);

        for analyte in spectrum.analytes.values() {
            let child = format!("{entity}/Analyte={}", analyte.id);
            self.check_entity(EntityPath::Analyte, &child, &label, &analyte.attributes, &tables);
        }
        for interpretation in spectrum.interpretations.values() {
            let child = format!("{entity}/Interpretation={}", interpretation.id);
            self.check_entity(
                EntityPath::Interpretation,
                &child,
                &label,
                &interpretation.attributes,
                &tables,
            );
            for member in interpretation.members.values() {
                let member_entity = format!("{child}/InterpretationMember={}", member.id);
                self.check_references(
                    "/Library/Spectrum/Interpretation/InterpretationMember",
                    &member_entity,
                    Some(SetTarget::Interpretation),
                    &member.attributes,
                );
            }
        }
    }

    /// Clusters carry no tier rules; only their set references and term names are checked.
    pub fn validate_cluster(&mut self, cluster: &Cluster) {
        let entity = format!("Cluster={}", cluster.id);
        debug!("validating {entity}");
        self.check_references("/Library/Cluster", &entity, Some(SetTarget::Cluster), &cluster.attributes);
    }

    /// Runs the library-wide uniqueness check and returns the report.
    pub fn finish(mut self) -> ValidationReport {
        let unique_values = std::mem::take(&mut self.unique_values);
        for ((tier, rule, term), values) in unique_values {
            let mut by_value: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
            for (value, label, entity) in &values.seen {
                by_value
                    .entry(value.as_str())
                    .or_default()
                    .push((label.as_str(), entity.as_str()));
            }
            for (value, holders) in by_value {
                if holders.len() > 1 {
                    debug!("{rule}: {} entities share `{value}`", holders.len());
                }
                for (i, (first, _)) in holders.iter().enumerate() {
                    for (second, entity) in &holders[i + 1..] {
                        let message = format!(
                            "{term} `{value}` is not unique: shared by spectrum index {first} and spectrum index {second}"
                        );
                        self.record(
                            &tier,
                            &rule,
                            values.level.into(),
                            values.path.as_str(),
                            entity,
                            message,
                        );
                    }
                }
            }
        }
        ValidationReport {
            tiers: self.tiers,
            findings: self.findings,
        }
    }

    fn check_entity(
        &mut self,
        path: EntityPath,
        entity: &str,
        label: &str,
        attributes: &Attributes,
        tables: &[&RuleTable],
    ) {
        let resolved = self.check_references(path.as_str(), entity, path.set_target(), attributes);
        self.apply_rules(path, entity, label, &resolved.attributes, tables);
    }

    fn apply_rules(
        &mut self,
        path: EntityPath,
        entity: &str,
        label: &str,
        attributes: &Attributes,
        tables: &[&RuleTable],
    ) {
        for table in tables {
            for rule in table.rules_for(path) {
                self.apply_rule(rule, entity, label, attributes);
            }
        }
    }

    /// Expands set references and records BASE findings for unresolvable
    /// references and for attribute names that disagree with the CV.
    fn check_references(
        &mut self,
        path: &str,
        entity: &str,
        target: Option<SetTarget>,
        attributes: &Attributes,
    ) -> Resolved {
        let resolved = match target {
            Some(target) => Resolver::new(self.header).flatten(target, attributes),
            None => Resolved {
                attributes: attributes.clone(),
                errors: Vec::new(),
            },
        };

        for err in &resolved.errors {
            self.record(
                &Tier::BASE,
                SET_RESOLUTION_RULE,
                Severity::Failure,
                path,
                entity,
                err.to_string(),
            );
        }

        let validator = self.validator;
        for attribute in &resolved.attributes {
            if let Some(canonical) = validator.resolver.resolve_name(&attribute.accession) {
                if canonical != attribute.name {
                    let message = format!(
                        "{} is named `{canonical}` in the controlled vocabulary, found `{}`",
                        attribute.accession, attribute.name
                    );
                    self.record(&Tier::BASE, TERM_NAME_RULE, Severity::Warning, path, entity, message);
                }
            }
        }
        resolved
    }

    fn apply_rule(&mut self, rule: &Rule, entity: &str, label: &str, attributes: &Attributes) {
        debug!("{}: applying {} to {entity}", rule.tier, rule.id);
        let validator = self.validator;
        let severity = Severity::from(rule.requirement_level);
        let path = rule.path.as_str();

        let mut outcomes = Vec::with_capacity(rule.terms.len());
        for term in &rule.terms {
            let matched: Vec<&Attribute> = attributes
                .iter()
                .filter(|a| validator.matches_term(term, a))
                .collect();

            if !term.repeatable && matched.len() > 1 {
                let message = format!("{} cannot be repeated", term.key());
                self.record(&rule.tier, &rule.id, severity, path, entity, message);
            }
            if let Some(ValueConstraint::Unique) = term.value {
                self.remember_unique(rule, term, label, entity, &matched);
            }

            let mut outcome = SlotOutcome::Missing;
            for attribute in &matched {
                match validator.check_value(term, attribute) {
                    Ok(()) => {
                        outcome = SlotOutcome::Satisfied;
                        break;
                    }
                    Err(reason) => {
                        if matches!(outcome, SlotOutcome::Missing) {
                            outcome = SlotOutcome::Invalid(reason);
                        }
                    }
                }
            }
            outcomes.push(outcome);
        }

        if let Some(message) = combine(rule, &outcomes) {
            self.record(&rule.tier, &rule.id, severity, path, entity, message);
        }
    }

    fn remember_unique(&mut self, rule: &Rule, term: &TermRule, label: &str, entity: &str, matched: &[&Attribute]) {
        let values = self
            .unique_values
            .entry((rule.tier.clone(), rule.id.clone(), term.key()))
            .or_insert_with(|| UniqueValues {
                level: rule.requirement_level,
                path: rule.path,
                seen: Vec::new(),
            });
        // An entity holds a value once, however often it repeats the attribute.
        let mut distinct: Vec<String> = Vec::new();
        for attribute in matched {
            let value = attribute.value.to_string();
            if attribute.value.is_null() || distinct.contains(&value) {
                continue;
            }
            values
                .seen
                .push((value.clone(), label.to_string(), entity.to_string()));
            distinct.push(value);
        }
    }

    fn record(
        &mut self,
        tier: &Tier,
        rule: &str,
        severity: Severity,
        path: &str,
        entity: &str,
        message: String,
    ) {
        warn!(
            "{rule} failed to validate {path}:{entity} ({}): {message}",
            severity.level_name()
        );
        self.findings.push(Finding {
            tier: tier.clone(),
            rule: rule.to_string(),
            severity,
            path: path.to_string(),
            entity: entity.to_string(),
            message,
        });
    }
}

/// The message for an unmet rule, or `None` when the slots satisfy its logic.
fn combine(rule: &Rule, outcomes: &[SlotOutcome]) -> Option<String> {
    let terms: Vec<String> = rule.terms.iter().map(TermRule::key).collect();
    let invalid: Vec<&str> = outcomes
        .iter()
        .filter_map(|o| match o {
            SlotOutcome::Invalid(reason) => Some(reason.as_str()),
            _ => None,
        })
        .collect();

    match rule.combination_logic {
        CombinationLogic::Or => {
            if outcomes.iter().any(|o| matches!(o, SlotOutcome::Satisfied)) {
                return None;
            }
            let detail = if invalid.is_empty() {
                "none found".to_string()
            } else {
                invalid.join("; ")
            };
            Some(format!("{} requires one of {}, {detail}", rule.id, terms.join(", ")))
        }
        CombinationLogic::And => {
            if outcomes.iter().all(|o| matches!(o, SlotOutcome::Satisfied)) {
                return None;
            }
            let missing: Vec<&str> = terms
                .iter()
                .zip(outcomes)
                .filter(|(_, o)| matches!(o, SlotOutcome::Missing))
                .map(|(t, _)| t.as_str())
                .collect();
            let mut parts = Vec::new();
            if !missing.is_empty() {
                parts.push(format!("{} were absent", missing.join(", ")));
            }
            parts.extend(invalid.iter().map(|r| r.to_string()));
            Some(format!(
                "{} requires all of {}, {}",
                rule.id,
                terms.join(", "),
                parts.join("; ")
            ))
        }
    }
}
