//! Trace event and record types.

use eddy_foundation::{Fact, Value};
use eddy_store::Bindings;
use serde::{Deserialize, Serialize};

// =============================================================================
// Trace Event
// =============================================================================

/// Events recorded for a completed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// A round has started.
    RoundStart {
        /// The round number.
        round: u64,
    },

    /// A round has ended.
    RoundEnd {
        /// The round number.
        round: u64,
        /// Number of facts in the round's net diff.
        changes: usize,
        /// Fixpoint iterations the round needed.
        iterations: usize,
    },

    /// A fact became visible.
    FactAdded {
        /// The fact.
        fact: Fact,
    },

    /// A fact stopped being visible.
    FactRemoved {
        /// The fact.
        fact: Fact,
    },

    /// A commit fired for a new binding.
    CommitFired {
        /// The commit rule.
        rule: String,
        /// The binding it fired for.
        bindings: Vec<(String, Value)>,
    },

    /// An invariant reported a violation.
    InvariantViolated {
        /// The invariant name.
        invariant: String,
        /// The offending binding.
        bindings: Vec<(String, Value)>,
    },

    /// Some clause lookups had no usable index.
    QueryDegraded {
        /// Lookups that scanned the whole store.
        full_scans: usize,
        /// All lookups in the round.
        lookups: usize,
    },

    /// A watch produced output on a channel.
    DiffForwarded {
        /// The channel name.
        channel: String,
        /// Number of facts in the forwarded diff.
        changes: usize,
    },
}

impl TraceEvent {
    /// Returns a short name for the event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoundStart { .. } => "round-start",
            Self::RoundEnd { .. } => "round-end",
            Self::FactAdded { .. } => "fact-added",
            Self::FactRemoved { .. } => "fact-removed",
            Self::CommitFired { .. } => "commit-fired",
            Self::InvariantViolated { .. } => "invariant-violated",
            Self::QueryDegraded { .. } => "query-degraded",
            Self::DiffForwarded { .. } => "diff-forwarded",
        }
    }

    /// Returns true if this is a round boundary event.
    #[must_use]
    pub fn is_round_boundary(&self) -> bool {
        matches!(self, Self::RoundStart { .. } | Self::RoundEnd { .. })
    }

    /// Returns true if this event changed the visible store.
    #[must_use]
    pub fn is_fact_event(&self) -> bool {
        matches!(self, Self::FactAdded { .. } | Self::FactRemoved { .. })
    }

    /// Returns true if this event reports a problem.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::InvariantViolated { .. } | Self::QueryDegraded { .. })
    }
}

/// Flattens bindings into owned pairs, ordered by variable name.
pub(crate) fn binding_pairs(bindings: &Bindings) -> Vec<(String, Value)> {
    bindings
        .iter()
        .map(|(var, value)| (var.to_string(), value.clone()))
        .collect()
}

// =============================================================================
// Trace Record
// =============================================================================

/// A timestamped trace record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Unique record ID within the session.
    pub id: u64,
    /// The program the round ran in.
    pub program: String,
    /// The round when this event occurred.
    pub round: u64,
    /// Timestamp in nanoseconds since the tracer was created.
    pub timestamp_ns: u64,
    /// The trace event.
    pub event: TraceEvent,
}

impl TraceRecord {
    /// Creates a new trace record.
    #[must_use]
    pub fn new(
        id: u64,
        program: impl Into<String>,
        round: u64,
        timestamp_ns: u64,
        event: TraceEvent,
    ) -> Self {
        Self {
            id,
            program: program.into(),
            round,
            timestamp_ns,
            event,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

// =============================================================================
// Tests
// =============================================================================
