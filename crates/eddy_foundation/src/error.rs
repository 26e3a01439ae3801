//! Error types for the Eddy evaluator.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

/// The main error type for Eddy operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an unbound variable error for a rule.
    #[must_use]
    pub fn unbound_variable(rule: impl Into<String>, var: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnboundVariable {
            rule: rule.into(),
            var: var.into(),
        })
    }

    /// Creates a duplicate rule name error.
    #[must_use]
    pub fn duplicate_rule(rule: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateRule(rule.into()))
    }

    /// Creates an invalid rule error with a reason.
    #[must_use]
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        })
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Creates an unknown program error.
    #[must_use]
    pub fn unknown_program(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownProgram(name.into()))
    }

    /// Creates a duplicate program error.
    #[must_use]
    pub fn duplicate_program(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateProgram(name.into()))
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationError(message.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns true if this error rejects a rule at registration time.
    #[must_use]
    pub const fn is_registration(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnboundVariable { .. }
                | ErrorKind::DuplicateRule(_)
                | ErrorKind::InvalidRule { .. }
        )
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A variable is used before any clause binds it.
    #[error("unbound variable ?{var} in rule {rule}")]
    UnboundVariable {
        /// The rule being registered.
        rule: String,
        /// The offending variable name (without `?`).
        var: String,
    },

    /// A rule with the same name is already registered.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    /// The rule is structurally invalid.
    #[error("invalid rule {rule}: {reason}")]
    InvalidRule {
        /// The rule being registered.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// No program with this name exists.
    #[error("unknown program: {0}")]
    UnknownProgram(String),

    /// A program with this name already exists.
    #[error("duplicate program: {0}")]
    DuplicateProgram(String),

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// The block fixpoint did not stabilize in time.
    MaxFixpointIterations {
        /// The configured limit.
        limit: usize,
        /// Which rule(s) were still changing.
        context: Option<String>,
    },
    /// Forwarding between programs did not go idle in time.
    MaxForwardHops {
        /// The configured limit.
        limit: usize,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxFixpointIterations { limit, context } => {
                write!(f, "max fixpoint iterations ({limit}) exceeded")?;
                if let Some(ctx) = context {
                    write!(f, ": {ctx}")?;
                }
                Ok(())
            }
            Self::MaxForwardHops { limit } => {
                write!(f, "max forward hops ({limit}) exceeded")
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Program or rule name.
    pub source: Option<String>,
    /// Round number, if the error happened during a round.
    pub round: Option<u64>,
    /// Chain of rule/phase frames, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the round number.
    #[must_use]
    pub fn with_round(mut self, round: u64) -> Self {
        self.round = Some(round);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "at {source}")?;
            if let Some(round) = self.round {
                write!(f, " (round {round})")?;
            }
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
