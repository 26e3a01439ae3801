//! Invariant checks.
//!
//! An invariant is a named body that should never match. Every binding it
//! yields against the final state of a round is reported as a violation;
//! evaluation continues regardless.

use std::collections::BTreeSet;
use std::fmt;

use eddy_foundation::{Error, Result};
use eddy_store::{Bindings, FactStore};

use crate::pattern::{Body, MatchStats, PatternMatcher};
use crate::rule::RuleCompiler;

// =============================================================================
// Invariant
// =============================================================================

/// A named body whose matches are violations.
#[derive(Clone, Debug, PartialEq)]
pub struct Invariant {
    /// Unique name.
    pub name: String,
    /// Pattern describing a violation.
    pub body: Body,
}

impl Invariant {
    /// Creates an invariant.
    #[must_use]
    pub fn new(name: impl Into<String>, body: Body) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// One binding that matched an invariant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Which invariant.
    pub invariant: String,
    /// The offending binding.
    pub bindings: Bindings,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant {} violated by {}", self.invariant, self.bindings)
    }
}

// =============================================================================
// Invariant Checker
// =============================================================================

/// Checks a set of invariants against a store.
#[derive(Clone, Debug, Default)]
pub struct InvariantChecker {
    invariants: Vec<Invariant>,
    names: BTreeSet<String>,
}

impl InvariantChecker {
    /// Creates an empty checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an invariant after validating its body.
    ///
    /// # Errors
    /// Returns a registration error for unbound variables or a duplicate name.
    pub fn add(&mut self, invariant: Invariant) -> Result<()> {
        if self.names.contains(&invariant.name) {
            return Err(Error::invalid_rule(
                &invariant.name,
                "an invariant with this name already exists",
            ));
        }
        RuleCompiler::check_body(&invariant.name, &invariant.body, BTreeSet::new())?;
        self.names.insert(invariant.name.clone());
        self.invariants.push(invariant);
        Ok(())
    }

    /// Number of invariants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Returns true if there are no invariants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Iterates over the invariants in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &Invariant> {
        self.invariants.iter()
    }

    /// Returns every violation in `store`, plus the matching statistics.
    #[must_use]
    pub fn check(&self, store: &FactStore) -> (Vec<InvariantViolation>, MatchStats) {
        let mut matcher = PatternMatcher::new(store);
        let mut violations = Vec::new();
        for invariant in &self.invariants {
            for bindings in matcher.match_body(&invariant.body) {
                violations.push(InvariantViolation {
                    invariant: invariant.name.clone(),
                    bindings,
                });
            }
        }
        (violations, matcher.stats())
    }
}
