//! Attribute names.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The attribute half of a fact, e.g. `tag`, `children`, `sort`.
///
/// Attributes are schema-less shared strings. Cloning is O(1).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attribute(Arc<str>);

impl Attribute {
    /// Name of the attribute that carries record tags.
    pub const TAG: &'static str = "tag";

    /// Creates an attribute from a name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.into())
    }

    /// The `tag` attribute.
    #[must_use]
    pub fn tag() -> Self {
        Self::new(Self::TAG)
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Attribute {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Attribute {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Attribute {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<Arc<str>> for Attribute {
    fn from(s: Arc<str>) -> Self {
        Self(s)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
