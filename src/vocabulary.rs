//! Controlled vocabulary lookup.
//!
//! The validator never embeds ontology data. It asks a [`TermResolver`] for
//! canonical names and for the descendants of a term, so callers can plug in
//! whatever release of the PSI-MS and unit ontologies they work against.
//! [`Vocabulary`] is an in-memory resolver that can be filled by hand or from
//! the `[Term]` stanzas of an OBO file.

use std::collections::{HashMap, HashSet, VecDeque};

/// Read-only access to a CV ontology.
pub trait TermResolver {
    /// Canonical name of `accession`, if the term is known.
    fn resolve_name(&self, accession: &str) -> Option<&str>;

    /// All strict descendants of `accession` (children, grandchildren, ...).
    fn descendants_of(&self, accession: &str) -> Vec<String>;

    fn is_descendant_of(&self, accession: &str, ancestor: &str) -> bool {
        self.descendants_of(ancestor).iter().any(|d| d == accession)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TermEntry {
    name: String,
    parents: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    terms: HashMap<String, TermEntry>,
    children: HashMap<String, Vec<String>>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a term and its `is_a` parents.
    pub fn insert(&mut self, accession: &str, name: &str, parents: &[&str]) {
        for parent in parents {
            let siblings = self.children.entry(parent.to_string()).or_default();
            if !siblings.iter().any(|c| c == accession) {
                siblings.push(accession.to_string());
            }
        }
        let entry = self
            .terms
            .entry(accession.to_string())
            .or_insert_with(|| TermEntry {
                name: name.to_string(),
                parents: Vec::new(),
            });
        entry.name = name.to_string();
        for parent in parents {
            if !entry.parents.iter().any(|p| p == parent) {
                entry.parents.push(parent.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn parents_of(&self, accession: &str) -> &[String] {
        self.terms
            .get(accession)
            .map(|entry| entry.parents.as_slice())
            .unwrap_or(&[])
    }

    /// Builds a vocabulary from OBO text. Only `[Term]` stanzas are read, and
    /// only their `id`, `name` and `is_a` tags; anything else is skipped.
    pub fn from_obo(text: &str) -> Self {
        let mut vocabulary = Vocabulary::new();
        let mut in_term = false;
        let mut id: Option<String> = None;
        let mut name: Option<String> = None;
        let mut parents: Vec<String> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.starts_with('[') {
                flush_term(&mut vocabulary, &mut id, &mut name, &mut parents);
                in_term = line == "[Term]";
                continue;
            }
            if !in_term {
                continue;
            }
            let Some((tag, value)) = line.split_once(':') else {
                continue;
            };
            // Trailing `! comment` carries the parent's name on is_a lines.
            let value = value.split(" ! ").next().unwrap_or(value).trim();
            match tag.trim() {
                "id" => id = Some(value.to_string()),
                "name" => name = Some(value.to_string()),
                "is_a" => parents.push(value.to_string()),
                _ => {}
            }
        }
        flush_term(&mut vocabulary, &mut id, &mut name, &mut parents);
        vocabulary
    }
}

fn flush_term(
    vocabulary: &mut Vocabulary,
    id: &mut Option<String>,
    name: &mut Option<String>,
    parents: &mut Vec<String>,
) {
    if let (Some(id), Some(name)) = (id.take(), name.take()) {
        let parent_refs: Vec<&str> = parents.iter().map(String::as_str).collect();
        vocabulary.insert(&id, &name, &parent_refs);
    }
    parents.clear();
}

impl TermResolver for Vocabulary {
    fn resolve_name(&self, accession: &str) -> Option<&str> {
        self.terms.get(accession).map(|entry| entry.name.as_str())
    }

    fn descendants_of(&self, accession: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut out = Vec::new();
        seen.insert(accession);
        queue.push_back(accession);
        while let Some(current) = queue.pop_front() {
            for child in self.children.get(current).into_iter().flatten() {
                if seen.insert(child.as_str()) {
                    out.push(child.clone());
                    queue.push_back(child.as_str());
                }
            }
        }
        out
    }
}

/// A CV term referenced by name in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermRef {
    pub accession: &'static str,
    pub name: &'static str,
}

impl TermRef {
    pub const fn new(accession: &'static str, name: &'static str) -> Self {
        Self { accession, name }
    }
}

/// Terms the format itself depends on.
pub mod terms {
    use super::TermRef;

    pub const LIBRARY_FORMAT_VERSION: TermRef = TermRef::new("MS:1003186", "library format version");
    pub const LIBRARY_NAME: TermRef = TermRef::new("MS:1003188", "library name");
    pub const LIBRARY_ATTRIBUTE_SET_NAME: TermRef =
        TermRef::new("MS:1003212", "library attribute set name");

    pub const LIBRARY_SPECTRUM_KEY: TermRef = TermRef::new("MS:1003237", "library spectrum key");
    pub const LIBRARY_SPECTRUM_INDEX: TermRef = TermRef::new("MS:1003062", "library spectrum index");
    pub const SPECTRUM_NAME: TermRef = TermRef::new("MS:1003061", "spectrum name");
    pub const NUMBER_OF_PEAKS: TermRef = TermRef::new("MS:1003059", "number of peaks");

    pub const CHARGE_STATE: TermRef = TermRef::new("MS:1000041", "charge state");
    pub const POSSIBLE_CHARGE_STATE: TermRef = TermRef::new("MS:1000633", "possible charge state");

    pub const UNIT: TermRef = TermRef::new("UO:0000000", "unit");
}
