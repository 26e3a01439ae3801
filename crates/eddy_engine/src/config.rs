//! Evaluator configuration.

/// Limits for a program's rounds and for forwarding between programs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Maximum block re-evaluation passes per fixpoint before the round aborts.
    pub max_fixpoint_iterations: usize,
    /// Maximum forwarding waves a [`Hub`](crate::forward::Hub) runs before giving up.
    pub max_forward_hops: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_fixpoint_iterations: 1000,
            max_forward_hops: 64,
        }
    }
}

impl EvaluatorConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fixpoint iteration limit.
    #[must_use]
    pub fn with_max_fixpoint_iterations(mut self, limit: usize) -> Self {
        self.max_fixpoint_iterations = limit;
        self
    }

    /// Sets the forwarding hop limit.
    #[must_use]
    pub fn with_max_forward_hops(mut self, limit: usize) -> Self {
        self.max_forward_hops = limit;
        self
    }
}
