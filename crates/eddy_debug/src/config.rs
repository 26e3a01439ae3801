//! Configuration for round tracing.

/// Configuration for a [`Tracer`](crate::Tracer).
///
/// A disabled tracer ignores every round it is shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceConfig {
    /// Whether tracing is enabled.
    pub enabled: bool,

    /// Maximum number of records kept; older records are evicted first.
    pub buffer_size: usize,

    /// Echo each record to stderr as it is recorded.
    pub to_stderr: bool,

    /// Output format: true for JSON, false for human-readable.
    pub json: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_size: 10_000,
            to_stderr: false,
            json: false,
        }
    }
}

impl TraceConfig {
    /// Creates a configuration with defaults (disabled).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with tracing enabled.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Creates a configuration for interactive debugging: enabled and echoing
    /// human-readable records to stderr.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            enabled: true,
            to_stderr: true,
            ..Self::default()
        }
    }

    /// Builder method to set enabled state.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builder method to enable/disable stderr echo.
    #[must_use]
    pub fn with_to_stderr(mut self, to_stderr: bool) -> Self {
        self.to_stderr = to_stderr;
        self
    }

    /// Builder method to enable/disable JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}
