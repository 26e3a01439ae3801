//! Record builder - turns rule actions into facts.
//!
//! Construction is two-phase per binding: every record handle is first bound
//! to its entity identity, then tags and attributes are evaluated. Attribute
//! expressions can therefore reference any handle of the same rule,
//! including their own.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use eddy_foundation::{Attribute, EntityId, Fact, Value};
use eddy_store::{Bindings, Diff, FactStore};

use crate::rule::{Action, CompiledRule};

// =============================================================================
// Effects
// =============================================================================

/// What a `remove` action targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Removal {
    /// One exact fact.
    Fact(Fact),
    /// Every value of an attribute.
    Attribute(EntityId, Attribute),
    /// Every fact of an entity.
    Entity(EntityId),
}

impl Removal {
    /// Resolves the removal to the facts it covers in `store`.
    #[must_use]
    pub fn facts(&self, store: &FactStore) -> Vec<Fact> {
        match self {
            Self::Fact(fact) => {
                if store.contains(fact) {
                    vec![fact.clone()]
                } else {
                    Vec::new()
                }
            }
            Self::Attribute(entity, attribute) => store
                .values(*entity, attribute)
                .map(|value| Fact::new(*entity, attribute.clone(), value.clone()))
                .collect(),
            Self::Entity(entity) => store.facts_of(*entity),
        }
    }
}

/// One action outcome for one binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Add a fact.
    Add(Fact),
    /// Remove facts.
    Remove(Removal),
}

// =============================================================================
// Record Builder
// =============================================================================

/// Evaluates a rule's actions for individual bindings.
pub struct RecordBuilder<'a> {
    rule: &'a CompiledRule,
    /// Set when building for one commit firing.
    firing: Option<u64>,
}

impl<'a> RecordBuilder<'a> {
    /// Creates a builder for a compiled rule.
    #[must_use]
    pub fn new(rule: &'a CompiledRule) -> Self {
        Self { rule, firing: None }
    }

    /// Builds records for a commit firing in `program` at `round`.
    ///
    /// Every firing then gets entities of its own: identities also depend on
    /// the program, the round and the whole binding, so a record that was
    /// deleted is never rebuilt under its old id.
    #[must_use]
    pub fn firing(mut self, program: &str, round: u64) -> Self {
        let mut hasher = DefaultHasher::new();
        program.hash(&mut hasher);
        round.hash(&mut hasher);
        self.firing = Some(hasher.finish());
        self
    }

    /// Returns the identity of the record built at action `site` for `bindings`.
    ///
    /// Outside a commit firing this depends only on the rule, the site, and
    /// the values of the site's identity variables, so re-deriving a record
    /// yields the same entity.
    #[must_use]
    pub fn identity(&self, site: usize, bindings: &Bindings) -> EntityId {
        let mut hasher = DefaultHasher::new();
        self.rule.name().hash(&mut hasher);
        site.hash(&mut hasher);
        if let Some(vars) = self.rule.identities.get(site) {
            for var in vars {
                var.hash(&mut hasher);
                bindings.get(var).hash(&mut hasher);
            }
        }
        if let Some(firing) = self.firing {
            firing.hash(&mut hasher);
            for (var, value) in bindings.iter() {
                var.hash(&mut hasher);
                value.hash(&mut hasher);
            }
        }
        EntityId::from_hash(hasher.finish())
    }

    /// Phase one: binds every record handle to its identity.
    #[must_use]
    pub fn allocate(&self, bindings: &Bindings) -> Bindings {
        let mut env = bindings.clone();
        let sites = self.rule.rule.actions.iter().filter_map(|action| match action {
            Action::Record(spec) => Some(spec),
            _ => None,
        });
        for (site, spec) in sites.enumerate() {
            env.insert(spec.handle.clone(), self.identity(site, bindings));
        }
        env
    }

    /// Builds the effects of every action for one binding, in action order.
    ///
    /// Actions whose expressions fail (type mismatch, non-entity target) are
    /// skipped.
    #[must_use]
    pub fn build(&self, bindings: &Bindings) -> Vec<Effect> {
        let env = self.allocate(bindings);
        let mut effects = Vec::new();

        for action in &self.rule.rule.actions {
            match action {
                Action::Record(spec) => {
                    let Some(entity) = env.get(&spec.handle).and_then(Value::as_entity) else {
                        continue;
                    };
                    for tag in &spec.tags {
                        effects.push(Effect::Add(Fact::new(entity, Attribute::tag(), tag.as_str())));
                    }
                    for (attribute, expr) in &spec.attrs {
                        if let Some(value) = expr.eval(&env) {
                            effects.push(Effect::Add(Fact::new(entity, attribute.clone(), value)));
                        }
                    }
                }
                Action::Add {
                    entity,
                    attribute,
                    value,
                } => {
                    let target = entity.eval(&env).as_ref().and_then(Value::as_entity);
                    if let (Some(target), Some(value)) = (target, value.eval(&env)) {
                        effects.push(Effect::Add(Fact::new(target, attribute.clone(), value)));
                    }
                }
                Action::Remove {
                    entity,
                    attribute,
                    value,
                } => {
                    let Some(target) = entity.eval(&env).as_ref().and_then(Value::as_entity) else {
                        continue;
                    };
                    let removal = match (attribute, value) {
                        (None, _) => Removal::Entity(target),
                        (Some(attribute), None) => Removal::Attribute(target, attribute.clone()),
                        (Some(attribute), Some(value)) => match value.eval(&env) {
                            Some(value) => Removal::Fact(Fact::new(target, attribute.clone(), value)),
                            None => continue,
                        },
                    };
                    effects.push(Effect::Remove(removal));
                }
            }
        }
        effects
    }

    /// Collects the facts a block or watch derives from a set of bindings.
    #[must_use]
    pub fn derive<'b>(&self, bindings: impl IntoIterator<Item = &'b Bindings>) -> BTreeSet<Fact> {
        bindings
            .into_iter()
            .flat_map(|env| self.build(env))
            .filter_map(|effect| match effect {
                Effect::Add(fact) => Some(fact),
                Effect::Remove(_) => None,
            })
            .collect()
    }
}

// =============================================================================
// Commit Normalization
// =============================================================================

/// Applies effects in order to a scratch copy of `snapshot` and returns the
/// effective change.
///
/// Removing an absent fact and adding a present one are dropped, so "remove
/// then add the same value" nets out to nothing.
#[must_use]
pub fn normalize(effects: &[Effect], snapshot: &FactStore) -> Diff {
    let mut scratch = snapshot.clone();
    let mut diff = Diff::new();
    for effect in effects {
        match effect {
            Effect::Add(fact) => {
                if scratch.insert(fact.clone()) {
                    diff.add(fact.clone());
                }
            }
            Effect::Remove(removal) => {
                for fact in removal.facts(&scratch) {
                    if scratch.remove(&fact) {
                        diff.remove(fact);
                    }
                }
            }
        }
    }
    diff
}

/// Merges the normalized diffs of several commits; an add of a fact wins
/// over a remove of the same fact.
#[must_use]
pub fn merge_commit_diffs<'a>(diffs: impl IntoIterator<Item = &'a Diff>) -> Diff {
    let mut adds = BTreeSet::new();
    let mut removes = BTreeSet::new();
    for diff in diffs {
        adds.extend(diff.added().cloned());
        removes.extend(diff.removed().cloned());
    }
    let mut merged: Diff = adds.iter().cloned().collect();
    for fact in removes.difference(&adds) {
        merged.remove(fact.clone());
    }
    merged
}
