//! Signed multisets of facts.
//!
//! A [`Diff`] is the unit of change everywhere in Eddy: external input,
//! commit effects, the effective change of a store application, and the
//! net change of a round delivered to subscribers.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use eddy_foundation::{Attribute, EntityId, Fact, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A signed multiset of facts.
///
/// Every fact carries a non-zero weight: positive means added, negative
/// means removed. Composition is weight addition, so an add followed by a
/// remove of the same fact cancels out and the entry disappears.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diff {
    weights: BTreeMap<Fact, i64>,
}

impl Diff {
    /// Creates an empty diff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one addition of `fact`.
    pub fn add(&mut self, fact: Fact) {
        self.add_weighted(fact, 1);
    }

    /// Records one removal of `fact`.
    pub fn remove(&mut self, fact: Fact) {
        self.add_weighted(fact, -1);
    }

    /// Adds `weight` to the fact's current weight, dropping it at zero.
    pub fn add_weighted(&mut self, fact: Fact, weight: i64) {
        if weight == 0 {
            return;
        }
        match self.weights.entry(fact) {
            Entry::Occupied(mut occupied) => {
                *occupied.get_mut() += weight;
                if *occupied.get() == 0 {
                    occupied.remove();
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(weight);
            }
        }
    }

    /// Convenience for adding an (entity, attribute, value) triple.
    pub fn add_triple(
        &mut self,
        entity: EntityId,
        attribute: impl Into<Attribute>,
        value: impl Into<Value>,
    ) {
        self.add(Fact::new(entity, attribute, value));
    }

    /// Convenience for removing an (entity, attribute, value) triple.
    pub fn remove_triple(
        &mut self,
        entity: EntityId,
        attribute: impl Into<Attribute>,
        value: impl Into<Value>,
    ) {
        self.remove(Fact::new(entity, attribute, value));
    }

    /// Builder form of [`Diff::add_triple`].
    #[must_use]
    pub fn with_add(
        mut self,
        entity: EntityId,
        attribute: impl Into<Attribute>,
        value: impl Into<Value>,
    ) -> Self {
        self.add_triple(entity, attribute, value);
        self
    }

    /// Builder form of [`Diff::remove_triple`].
    #[must_use]
    pub fn with_remove(
        mut self,
        entity: EntityId,
        attribute: impl Into<Attribute>,
        value: impl Into<Value>,
    ) -> Self {
        self.remove_triple(entity, attribute, value);
        self
    }

    /// Composes `other` into this diff (weight addition).
    pub fn merge(&mut self, other: &Diff) {
        for (fact, weight) in &other.weights {
            self.add_weighted(fact.clone(), *weight);
        }
    }

    /// Returns the composition of two diffs.
    #[must_use]
    pub fn merged(mut self, other: &Diff) -> Self {
        self.merge(other);
        self
    }

    /// Returns the inverse diff (every weight negated).
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            weights: self
                .weights
                .iter()
                .map(|(fact, weight)| (fact.clone(), -weight))
                .collect(),
        }
    }

    /// Returns the weight of a fact (zero when absent).
    #[must_use]
    pub fn weight(&self, fact: &Fact) -> i64 {
        self.weights.get(fact).copied().unwrap_or(0)
    }

    /// Iterates over facts with positive weight, in fact order.
    pub fn added(&self) -> impl Iterator<Item = &Fact> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0)
            .map(|(fact, _)| fact)
    }

    /// Iterates over facts with negative weight, in fact order.
    pub fn removed(&self) -> impl Iterator<Item = &Fact> {
        self.weights
            .iter()
            .filter(|(_, w)| **w < 0)
            .map(|(fact, _)| fact)
    }

    /// Iterates over every (fact, weight) entry.
    pub fn iter(&self) -> impl Iterator<Item = (&Fact, i64)> {
        self.weights.iter().map(|(fact, weight)| (fact, *weight))
    }

    /// Returns the attributes touched by this diff.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.weights.keys().map(|fact| &fact.attribute)
    }

    /// Returns true if the diff has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Returns the number of distinct facts with non-zero weight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }
}

impl FromIterator<Fact> for Diff {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut diff = Self::new();
        diff.extend(iter);
        diff
    }
}

impl FromIterator<(Fact, i64)> for Diff {
    fn from_iter<I: IntoIterator<Item = (Fact, i64)>>(iter: I) -> Self {
        let mut diff = Self::new();
        for (fact, weight) in iter {
            diff.add_weighted(fact, weight);
        }
        diff
    }
}

impl Extend<Fact> for Diff {
    fn extend<I: IntoIterator<Item = Fact>>(&mut self, iter: I) {
        for fact in iter {
            self.add(fact);
        }
    }
}

impl fmt::Debug for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.weights.iter()).finish()
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (fact, weight) in &self.weights {
            let sign = if *weight > 0 { '+' } else { '-' };
            writeln!(f, "{sign}{} {fact}", weight.unsigned_abs())?;
        }
        Ok(())
    }
}
