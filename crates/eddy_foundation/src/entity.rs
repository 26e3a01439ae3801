//! Opaque entity identifiers.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// High bit marks identities derived from a hash (named or record-built).
const HASHED_BIT: u64 = 1 << 63;

/// Process-wide counter for [`EntityId::fresh`].
static NEXT_FRESH: AtomicU64 = AtomicU64::new(1);

/// Opaque entity identifier.
///
/// Identifiers are never reused: fresh ids come from a monotonic counter and
/// every other id is a stable hash of its origin (an external name, or a
/// record construction site plus the values it was built from).
///
/// # Layout
/// - high bit clear: counter-allocated
/// - high bit set: hash-derived
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity ID from its raw representation.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit representation.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Allocates a new identifier that no other call will return.
    #[must_use]
    pub fn fresh() -> Self {
        let raw = NEXT_FRESH.fetch_add(1, Ordering::Relaxed);
        Self(raw & !HASHED_BIT)
    }

    /// Returns the stable identifier for an externally supplied name.
    ///
    /// The same name always maps to the same entity, which lets seed data
    /// refer to well-known entities such as an `init` marker.
    #[must_use]
    pub fn named(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        "named".hash(&mut hasher);
        name.hash(&mut hasher);
        Self::from_hash(hasher.finish())
    }

    /// Wraps a precomputed hash as a derived identifier.
    #[must_use]
    pub const fn from_hash(hash: u64) -> Self {
        Self(hash | HASHED_BIT)
    }

    /// Returns true if this id was derived from a hash rather than allocated.
    #[must_use]
    pub const fn is_derived(self) -> bool {
        self.0 & HASHED_BIT != 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_derived() {
            write!(f, "EntityId(h{:x})", self.0 & !HASHED_BIT)
        } else {
            write!(f, "EntityId({})", self.0)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_derived() {
            write!(f, "#h{:x}", self.0 & !HASHED_BIT)
        } else {
            write!(f, "#{}", self.0)
        }
    }
}
