use crate::ast::{Attribute, AttributeSetKey, Attributes, Library, SetTarget};
use crate::error::ResolverError;
use log::debug;
use std::collections::HashMap;

/// The attributes of an entity with every attribute set reference expanded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resolved {
    pub attributes: Attributes,
    /// References that could not be expanded. Resolution carries on past them.
    pub errors: Vec<ResolverError>,
}

/// Expands `MS:1003212|library attribute set name` references against the
/// sets of one library.
///
/// Nothing is copied at parse time: the resolver reads the library as it is
/// when called, so edits made to a set before validation are seen by every
/// entity that references it.
pub struct Resolver<'lib> {
    library: &'lib Library,
    // Sets being expanded, outermost first, to detect reference cycles
    resolving_stack: Vec<AttributeSetKey>,
}

impl<'lib> Resolver<'lib> {
    pub fn new(library: &'lib Library) -> Self {
        Resolver {
            library,
            resolving_stack: Vec::new(),
        }
    }

    /// Expands every reference in `attributes`, collecting failures instead
    /// of stopping at the first one.
    ///
    /// Set attributes are inserted right after the reference that pulled them
    /// in. Their groups are renumbered after the entity's highest group id, so
    /// they never merge with the entity's own groups.
    pub fn flatten(&mut self, target: SetTarget, attributes: &Attributes) -> Resolved {
        let mut resolved = Resolved::default();
        let mut next_group = attributes.next_group_id();

        for attribute in attributes {
            resolved.attributes.push(attribute.clone());
            if attribute.is_attribute_set_reference() {
                self.expand(target, &attribute.value.to_string(), &mut next_group, &mut resolved);
            }
        }
        resolved
    }

    /// Like [`Resolver::flatten`], but fails on the first unresolvable reference.
    pub fn resolve(
        &mut self,
        target: SetTarget,
        attributes: &Attributes,
    ) -> Result<Attributes, ResolverError> {
        let mut resolved = self.flatten(target, attributes);
        if resolved.errors.is_empty() {
            Ok(resolved.attributes)
        } else {
            Err(resolved.errors.remove(0))
        }
    }

    fn expand(&mut self, target: SetTarget, name: &str, next_group: &mut u32, out: &mut Resolved) {
        let key = AttributeSetKey::new(target, name);

        if self.resolving_stack.contains(&key) {
            let cycle = self
                .resolving_stack
                .iter()
                .map(|k| k.name.as_str())
                .chain(std::iter::once(name))
                .collect::<Vec<&str>>()
                .join(" -> ");
            out.errors.push(ResolverError::CircularReference {
                cycle: format!("{target} sets {cycle}"),
            });
            return;
        }

        let library = self.library;
        let Some(set) = library.attribute_set(target, name) else {
            out.errors.push(ResolverError::UnknownAttributeSet {
                target,
                name: name.to_string(),
            });
            return;
        };

        debug!("expanding {target} attribute set `{name}`");
        self.resolving_stack.push(key);
        let mut renumbered: HashMap<u32, u32> = HashMap::new();
        for attribute in &set.attributes {
            let mut copy: Attribute = attribute.clone();
            if let Some(group_id) = attribute.group_id {
                let new_id = *renumbered.entry(group_id).or_insert_with(|| {
                    let id = *next_group;
                    *next_group += 1;
                    id
                });
                copy.group_id = Some(new_id);
            }
            out.attributes.push(copy);
            if attribute.is_attribute_set_reference() {
                self.expand(target, &attribute.value.to_string(), next_group, out);
            }
        }
        self.resolving_stack.pop();
    }
}
