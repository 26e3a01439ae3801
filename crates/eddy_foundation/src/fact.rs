//! The fact triple.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::entity::EntityId;
use crate::value::Value;

/// An (entity, attribute, value) triple.
///
/// Facts are immutable; a change is always a remove plus an add. Ordering is
/// entity-major so iteration over a set of facts groups them by entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fact {
    /// The entity the fact is about.
    pub entity: EntityId,
    /// The attribute name.
    pub attribute: Attribute,
    /// The value.
    pub value: Value,
}

impl Fact {
    /// Creates a fact.
    #[must_use]
    pub fn new(entity: EntityId, attribute: impl Into<Attribute>, value: impl Into<Value>) -> Self {
        Self {
            entity,
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?} {:?} {:?}]", self.entity, self.attribute, self.value)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.entity, self.attribute, self.value)
    }
}

impl<A: Into<Attribute>, V: Into<Value>> From<(EntityId, A, V)> for Fact {
    fn from((entity, attribute, value): (EntityId, A, V)) -> Self {
        Self::new(entity, attribute, value)
    }
}
