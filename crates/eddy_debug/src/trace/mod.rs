//! Round tracing.
//!
//! A [`Tracer`] is a [`Subscriber`]: attach it to one or more programs and it
//! records what each completed round did. Share it with `Rc<RefCell<_>>` to
//! read the buffer back while the programs keep running.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use eddy_debug::{TraceConfig, Tracer};
//! use eddy_engine::Program;
//! use eddy_foundation::EntityId;
//! use eddy_store::Diff;
//!
//! let tracer = Rc::new(RefCell::new(Tracer::new(TraceConfig::enabled())));
//! let mut program = Program::new("app");
//! program.subscribe(Rc::clone(&tracer));
//! program.apply(Diff::new().with_add(EntityId::from_raw(1), "tag", "div")).unwrap();
//!
//! assert_eq!(tracer.borrow().buffer().by_event_type("fact-added").len(), 1);
//! ```

pub mod buffer;
pub mod format;
pub mod record;

pub use buffer::{TraceBuffer, TraceBufferStats};
pub use format::{HumanFormatter, JsonFormatter, TraceFormatter};
pub use record::{TraceEvent, TraceRecord};

use std::io::{self, Write};
use std::time::Instant;

use eddy_engine::{RoundReport, Subscriber};
use eddy_foundation::{Error, Result};
use tracing::debug;

use crate::config::TraceConfig;
use record::binding_pairs;

// =============================================================================
// Tracer
// =============================================================================

/// Records trace events for every round it is shown.
///
/// The `record` fast path returns immediately when tracing is disabled.
pub struct Tracer {
    config: TraceConfig,
    buffer: TraceBuffer,
    start_time: Instant,
    human_formatter: HumanFormatter,
    json_formatter: JsonFormatter,
}

impl Tracer {
    /// Creates a new tracer with the given configuration.
    #[must_use]
    pub fn new(config: TraceConfig) -> Self {
        let buffer_size = config.buffer_size;
        Self {
            config,
            buffer: TraceBuffer::new(buffer_size),
            start_time: Instant::now(),
            human_formatter: HumanFormatter::new().with_timestamps(),
            json_formatter: JsonFormatter::new(),
        }
    }

    /// Creates a disabled tracer.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(TraceConfig::default())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Returns whether tracing is enabled.
    #[must_use]
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Enables tracing.
    pub fn enable(&mut self) {
        self.config.enabled = true;
    }

    /// Disables tracing.
    pub fn disable(&mut self) {
        self.config.enabled = false;
    }

    /// Sets whether to use JSON output format.
    pub fn set_json(&mut self, json: bool) {
        self.config.json = json;
    }

    /// Sets whether records are echoed to stderr.
    pub fn set_to_stderr(&mut self, to_stderr: bool) {
        self.config.to_stderr = to_stderr;
    }

    /// Records a trace event.
    #[inline]
    pub fn record(&mut self, program: &str, round: u64, event: TraceEvent) {
        if !self.config.enabled {
            return;
        }

        self.record_internal(program, round, event);
    }

    fn record_internal(&mut self, program: &str, round: u64, event: TraceEvent) {
        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ns = self.start_time.elapsed().as_nanos() as u64;
        self.buffer.push(program, round, timestamp_ns, event);

        if self.config.to_stderr {
            if let Some(record) = self.buffer.last() {
                let line = self.format_record(record);
                let _ = writeln!(io::stderr(), "{line}");
            }
        }
    }

    /// Formats a record using the current format settings.
    #[must_use]
    pub fn format_record(&self, record: &TraceRecord) -> String {
        if self.config.json {
            self.json_formatter.format(record)
        } else {
            self.human_formatter.format(record)
        }
    }

    /// Formats multiple records.
    #[must_use]
    pub fn format_records(&self, records: &[&TraceRecord]) -> String {
        if self.config.json {
            self.json_formatter.format_many(records)
        } else {
            self.human_formatter.format_many(records)
        }
    }

    /// Returns the trace buffer.
    #[must_use]
    pub fn buffer(&self) -> &TraceBuffer {
        &self.buffer
    }

    /// Clears the trace buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns buffer statistics.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        self.buffer.stats()
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Serializes the buffered records to `MessagePack`.
    ///
    /// Uses named serialization to preserve struct field names.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export(&self) -> Result<Vec<u8>> {
        let records: Vec<&TraceRecord> = self.buffer.iter().collect();
        let bytes = rmp_serde::to_vec_named(&records)
            .map_err(|e| Error::serialization(e.to_string()))?;
        debug!(records = records.len(), bytes = bytes.len(), "trace exported");
        Ok(bytes)
    }

    /// Writes the `MessagePack` export to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn export_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let bytes = self.export()?;
        writer
            .write_all(&bytes)
            .map_err(|e| Error::serialization(format!("failed to write trace: {e}")))
    }

    /// Decodes records produced by [`Tracer::export`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid trace export.
    pub fn import(bytes: &[u8]) -> Result<Vec<TraceRecord>> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::serialization(e.to_string()))
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Subscriber for Tracer {
    fn on_round(&mut self, report: &RoundReport) {
        if !self.config.enabled {
            return;
        }

        let program = report.program.as_str();
        let round = report.round;
        self.record_internal(program, round, TraceEvent::RoundStart { round });

        for fact in report.diff.removed() {
            self.record_internal(program, round, TraceEvent::FactRemoved { fact: fact.clone() });
        }
        for fact in report.diff.added() {
            self.record_internal(program, round, TraceEvent::FactAdded { fact: fact.clone() });
        }
        for fired in &report.fired {
            let event = TraceEvent::CommitFired {
                rule: fired.rule.clone(),
                bindings: binding_pairs(&fired.bindings),
            };
            self.record_internal(program, round, event);
        }
        for violation in &report.violations {
            let event = TraceEvent::InvariantViolated {
                invariant: violation.invariant.clone(),
                bindings: binding_pairs(&violation.bindings),
            };
            self.record_internal(program, round, event);
        }
        if report.stats.full_scans > 0 {
            let event = TraceEvent::QueryDegraded {
                full_scans: report.stats.full_scans,
                lookups: report.stats.lookups,
            };
            self.record_internal(program, round, event);
        }
        for (channel, diff) in &report.outbound {
            let event = TraceEvent::DiffForwarded {
                channel: channel.clone(),
                changes: diff.len(),
            };
            self.record_internal(program, round, event);
        }

        let end = TraceEvent::RoundEnd {
            round,
            changes: report.diff.len(),
            iterations: report.stats.fixpoint_iterations,
        };
        self.record_internal(program, round, end);
    }
}

// =============================================================================
// Tests
// =============================================================================
