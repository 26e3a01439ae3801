//! The indexed fact store.
//!
//! Facts live in three persistent indices so that every partially bound
//! lookup can avoid a full scan. All indices are `im` ordered maps: cloning
//! a store is O(1) and gives an immutable snapshot that later writes do not
//! disturb.

use im::{OrdMap, OrdSet};
use tracing::debug;

use eddy_foundation::{Attribute, EntityId, Fact, Value};

use crate::diff::Diff;
use crate::query::{Bindings, FactPattern, Term};

/// The index a lookup will use, from most to least selective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexPlan {
    /// Entity and attribute bound: one value set.
    EntityAttribute,
    /// Entity bound: every attribute of one entity.
    Entity,
    /// Attribute and value bound: one entity set.
    AttributeValue,
    /// Attribute bound: every fact of one attribute.
    Attribute,
    /// Value bound: every (entity, attribute) holding that value.
    Value,
    /// Nothing bound: every fact in the store.
    FullScan,
}

impl IndexPlan {
    /// Returns true if the plan degrades to scanning every fact.
    #[must_use]
    pub const fn is_full_scan(self) -> bool {
        matches!(self, Self::FullScan)
    }
}

/// A persistent triple store.
///
/// Attributes are multi-valued: `(entity, attribute)` maps to a set of
/// values. Set semantics apply throughout, so a fact is either present or
/// absent.
#[derive(Clone, Debug, Default)]
pub struct FactStore {
    /// entity -> attribute -> values
    eav: OrdMap<EntityId, OrdMap<Attribute, OrdSet<Value>>>,
    /// attribute -> value -> entities
    ave: OrdMap<Attribute, OrdMap<Value, OrdSet<EntityId>>>,
    /// value -> (entity, attribute)
    vea: OrdMap<Value, OrdSet<(EntityId, Attribute)>>,
    len: usize,
}

impl FactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the store holds no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // --- Mutation ---

    /// Inserts a fact. Returns false if it was already present.
    pub fn insert(&mut self, fact: Fact) -> bool {
        if self.contains(&fact) {
            return false;
        }
        let Fact {
            entity,
            attribute,
            value,
        } = fact;

        self.eav
            .entry(entity)
            .or_default()
            .entry(attribute.clone())
            .or_default()
            .insert(value.clone());
        self.ave
            .entry(attribute.clone())
            .or_default()
            .entry(value.clone())
            .or_default()
            .insert(entity);
        self.vea.entry(value).or_default().insert((entity, attribute));
        self.len += 1;
        true
    }

    /// Removes a fact. Returns false if it was absent.
    pub fn remove(&mut self, fact: &Fact) -> bool {
        if !self.contains(fact) {
            return false;
        }

        if let Some(attrs) = self.eav.get_mut(&fact.entity) {
            if let Some(values) = attrs.get_mut(&fact.attribute) {
                values.remove(&fact.value);
                if values.is_empty() {
                    attrs.remove(&fact.attribute);
                }
            }
            if attrs.is_empty() {
                self.eav.remove(&fact.entity);
            }
        }

        if let Some(by_value) = self.ave.get_mut(&fact.attribute) {
            if let Some(entities) = by_value.get_mut(&fact.value) {
                entities.remove(&fact.entity);
                if entities.is_empty() {
                    by_value.remove(&fact.value);
                }
            }
            if by_value.is_empty() {
                self.ave.remove(&fact.attribute);
            }
        }

        if let Some(holders) = self.vea.get_mut(&fact.value) {
            holders.remove(&(fact.entity, fact.attribute.clone()));
            if holders.is_empty() {
                self.vea.remove(&fact.value);
            }
        }

        self.len -= 1;
        true
    }

    /// Applies a diff with set semantics and returns the effective change.
    ///
    /// Positive weights insert, negative weights remove. Adding a present
    /// fact or removing an absent one is a no-op and does not appear in the
    /// returned diff.
    pub fn apply(&mut self, diff: &Diff) -> Diff {
        let mut effective = Diff::new();
        for fact in diff.removed() {
            if self.remove(fact) {
                effective.remove(fact.clone());
            }
        }
        for fact in diff.added() {
            if self.insert(fact.clone()) {
                effective.add(fact.clone());
            }
        }
        effective
    }

    // --- Lookup ---

    /// Returns true if the fact is present.
    #[must_use]
    pub fn contains(&self, fact: &Fact) -> bool {
        self.eav
            .get(&fact.entity)
            .and_then(|attrs| attrs.get(&fact.attribute))
            .is_some_and(|values| values.contains(&fact.value))
    }

    /// Iterates over the values of `(entity, attribute)` in value order.
    pub fn values<'a>(
        &'a self,
        entity: EntityId,
        attribute: &str,
    ) -> impl Iterator<Item = &'a Value> + 'a {
        self.eav
            .get(&entity)
            .and_then(|attrs| attrs.get(attribute))
            .into_iter()
            .flat_map(|values| values.iter())
    }

    /// Returns the first (smallest) value of `(entity, attribute)`.
    #[must_use]
    pub fn value(&self, entity: EntityId, attribute: &str) -> Option<&Value> {
        self.values(entity, attribute).next()
    }

    /// Returns every fact about an entity.
    #[must_use]
    pub fn facts_of(&self, entity: EntityId) -> Vec<Fact> {
        self.eav
            .get(&entity)
            .into_iter()
            .flat_map(|attrs| attrs.iter())
            .flat_map(|(attribute, values)| {
                values
                    .iter()
                    .map(move |value| Fact::new(entity, attribute.clone(), value.clone()))
            })
            .collect()
    }

    /// Iterates over entities holding `value` under `attribute`.
    pub fn entities_with<'a>(
        &'a self,
        attribute: &str,
        value: &Value,
    ) -> impl Iterator<Item = EntityId> + 'a {
        self.ave
            .get(attribute)
            .and_then(|by_value| by_value.get(value))
            .into_iter()
            .flat_map(|entities| entities.iter().copied())
    }

    /// Iterates over every entity with at least one fact.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.eav.keys().copied()
    }

    /// Iterates over every fact in (entity, attribute, value) order.
    pub fn iter(&self) -> impl Iterator<Item = Fact> + '_ {
        self.eav.iter().flat_map(|(entity, attrs)| {
            attrs.iter().flat_map(move |(attribute, values)| {
                values
                    .iter()
                    .map(move |value| Fact::new(*entity, attribute.clone(), value.clone()))
            })
        })
    }

    // --- Planning and scanning ---

    /// Chooses the index for a lookup with the given positions bound.
    #[must_use]
    pub fn plan(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&str>,
        value: Option<&Value>,
    ) -> IndexPlan {
        match (entity, attribute, value) {
            (Some(_), Some(_), _) => IndexPlan::EntityAttribute,
            (Some(_), None, _) => IndexPlan::Entity,
            (None, Some(_), Some(_)) => IndexPlan::AttributeValue,
            (None, Some(_), None) => IndexPlan::Attribute,
            (None, None, Some(_)) => IndexPlan::Value,
            (None, None, None) => IndexPlan::FullScan,
        }
    }

    /// Returns every fact matching the bound positions, using [`FactStore::plan`].
    #[must_use]
    pub fn scan(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&str>,
        value: Option<&Value>,
    ) -> Vec<Fact> {
        let candidates: Vec<Fact> = match self.plan(entity, attribute, value) {
            IndexPlan::EntityAttribute => match (entity, attribute) {
                (Some(e), Some(a)) => self
                    .values(e, a)
                    .map(|v| Fact::new(e, a, v.clone()))
                    .collect(),
                _ => Vec::new(),
            },
            IndexPlan::Entity => entity.map(|e| self.facts_of(e)).unwrap_or_default(),
            IndexPlan::AttributeValue => match (attribute, value) {
                (Some(a), Some(v)) => self
                    .entities_with(a, v)
                    .map(|e| Fact::new(e, a, v.clone()))
                    .collect(),
                _ => Vec::new(),
            },
            IndexPlan::Attribute => match attribute {
                Some(a) => self
                    .ave
                    .get(a)
                    .into_iter()
                    .flat_map(|by_value| by_value.iter())
                    .flat_map(|(v, entities)| {
                        entities.iter().map(move |e| Fact::new(*e, a, v.clone()))
                    })
                    .collect(),
                None => Vec::new(),
            },
            IndexPlan::Value => value
                .and_then(|v| self.vea.get(v).map(|holders| (v, holders)))
                .into_iter()
                .flat_map(|(v, holders)| {
                    holders
                        .iter()
                        .map(move |(e, a)| Fact::new(*e, a.clone(), v.clone()))
                })
                .collect(),
            IndexPlan::FullScan => {
                debug!(facts = self.len, "fact store full scan");
                self.iter().collect()
            }
        };

        candidates
            .into_iter()
            .filter(|fact| value.is_none_or(|v| fact.value == *v))
            .collect()
    }

    /// Returns the plan a single-clause query would use under `bindings`.
    ///
    /// `None` means a bound position has the wrong shape and nothing is scanned.
    #[must_use]
    pub fn plan_pattern(&self, pattern: &FactPattern, bindings: &Bindings) -> Option<IndexPlan> {
        Resolved::new(pattern, bindings).map(|r| self.plan(r.entity, r.attribute, r.value))
    }

    /// Returns every extension of `bindings` consistent with one clause.
    ///
    /// Repeated variables within the clause must unify. A bound entity that
    /// is not an entity, or a bound attribute that is not a string, matches
    /// nothing.
    #[must_use]
    pub fn query(&self, pattern: &FactPattern, bindings: &Bindings) -> Vec<Bindings> {
        let Some(resolved) = Resolved::new(pattern, bindings) else {
            return Vec::new();
        };

        self.scan(resolved.entity, resolved.attribute, resolved.value)
            .into_iter()
            .filter_map(|fact| {
                let mut extended = bindings.clone();
                let entity = Value::Entity(fact.entity);
                let attribute = Value::String(fact.attribute.as_str().into());
                for (term, value) in [
                    (&pattern.entity, &entity),
                    (&pattern.attribute, &attribute),
                    (&pattern.value, &fact.value),
                ] {
                    if let Term::Var(name) = term {
                        if !extended.unify(name, value) {
                            return None;
                        }
                    }
                }
                Some(extended)
            })
            .collect()
    }
}

/// A pattern's positions after substituting bound variables.
struct Resolved<'a> {
    entity: Option<EntityId>,
    attribute: Option<&'a str>,
    value: Option<&'a Value>,
}

impl<'a> Resolved<'a> {
    /// Returns `None` when a bound position has the wrong shape.
    fn new(pattern: &'a FactPattern, bindings: &'a Bindings) -> Option<Self> {
        let entity = match pattern.entity.resolve(bindings) {
            Some(value) => Some(value.as_entity()?),
            None => None,
        };
        let attribute = match pattern.attribute.resolve(bindings) {
            Some(value) => Some(value.as_str()?),
            None => None,
        };
        Some(Self {
            entity,
            attribute,
            value: pattern.value.resolve(bindings),
        })
    }
}

impl FromIterator<Fact> for FactStore {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut store = Self::new();
        for fact in iter {
            store.insert(fact);
        }
        store
    }
}
