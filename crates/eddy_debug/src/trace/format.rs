//! Trace output formatters.
//!
//! Provides human-readable and JSON formatters for trace records.

use std::fmt::Write;

use eddy_foundation::Value;

use super::record::{TraceEvent, TraceRecord};

// =============================================================================
// Trace Formatter Trait
// =============================================================================

/// Trait for formatting trace records.
pub trait TraceFormatter {
    /// Formats a single trace record to a string.
    fn format(&self, record: &TraceRecord) -> String;

    /// Formats multiple records, one per line.
    fn format_many(&self, records: &[&TraceRecord]) -> String {
        records
            .iter()
            .map(|r| self.format(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Human-Readable Formatter
// =============================================================================

/// Formats trace records in human-readable form.
#[derive(Clone, Debug, Default)]
pub struct HumanFormatter {
    /// Whether to include timestamps.
    pub show_timestamps: bool,
    /// Whether to include record IDs.
    pub show_ids: bool,
}

impl HumanFormatter {
    /// Creates a new human formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    /// Builder method to show record IDs.
    #[must_use]
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    #[allow(clippy::cast_precision_loss)]
    fn format_timestamp(ns: u64) -> String {
        let us = ns / 1000;
        if us >= 1_000_000 {
            format!("{:.3}s", us as f64 / 1_000_000.0)
        } else if us >= 1000 {
            format!("{:.3}ms", us as f64 / 1000.0)
        } else {
            format!("{us}us")
        }
    }

    fn format_bindings(bindings: &[(String, Value)]) -> String {
        let pairs: Vec<_> = bindings.iter().map(|(k, v)| format!("?{k}={v}")).collect();
        format!("{{{}}}", pairs.join(", "))
    }
}

impl TraceFormatter for HumanFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let mut prefix = String::new();

        if self.show_ids {
            let _ = write!(prefix, "[{:06}] ", record.id);
        }

        let _ = write!(prefix, "{}#{:04} ", record.program, record.round);

        if self.show_timestamps {
            let _ = write!(
                prefix,
                "{:>10} ",
                Self::format_timestamp(record.timestamp_ns)
            );
        }

        let event_str = match &record.event {
            TraceEvent::RoundStart { round } => format!("=== ROUND {round} START ==="),
            TraceEvent::RoundEnd {
                round,
                changes,
                iterations,
            } => format!("=== ROUND {round} END ({changes} changes, {iterations} iterations) ==="),
            TraceEvent::FactAdded { fact } => format!("    + {fact}"),
            TraceEvent::FactRemoved { fact } => format!("    - {fact}"),
            TraceEvent::CommitFired { rule, bindings } => {
                format!("  COMMIT \"{rule}\" {}", Self::format_bindings(bindings))
            }
            TraceEvent::InvariantViolated {
                invariant,
                bindings,
            } => format!("  VIOLATED \"{invariant}\" {}", Self::format_bindings(bindings)),
            TraceEvent::QueryDegraded {
                full_scans,
                lookups,
            } => format!("  DEGRADED {full_scans}/{lookups} lookups scanned the store"),
            TraceEvent::DiffForwarded { channel, changes } => {
                format!("  FORWARD {channel} ({changes} changes)")
            }
        };

        format!("{prefix}{event_str}")
    }
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// Formats trace records as single-line JSON objects.
#[derive(Clone, Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    /// Creates a new JSON formatter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Escapes a string for JSON.
    fn escape_string(s: &str) -> String {
        s.replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    fn format_value(value: &Value) -> String {
        match value {
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => {
                if f.is_nan() {
                    "\"NaN\"".to_string()
                } else if f.is_infinite() {
                    if *f > 0.0 {
                        "\"Infinity\"".to_string()
                    } else {
                        "\"-Infinity\"".to_string()
                    }
                } else {
                    f.to_string()
                }
            }
            Value::String(s) => format!("\"{}\"", Self::escape_string(s)),
            Value::Entity(e) => format!("\"{e}\""),
        }
    }

    fn format_fact(fact: &eddy_foundation::Fact) -> String {
        format!(
            "\"entity\":\"{}\",\"attribute\":\"{}\",\"value\":{}",
            fact.entity,
            Self::escape_string(fact.attribute.as_str()),
            Self::format_value(&fact.value)
        )
    }

    fn format_bindings(bindings: &[(String, Value)]) -> String {
        let pairs: Vec<_> = bindings
            .iter()
            .map(|(k, v)| format!("\"{}\":{}", Self::escape_string(k), Self::format_value(v)))
            .collect();
        format!("{{{}}}", pairs.join(","))
    }
}

impl TraceFormatter for JsonFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let event_data = match &record.event {
            TraceEvent::RoundStart { round } => format!("\"round_number\":{round}"),
            TraceEvent::RoundEnd {
                round,
                changes,
                iterations,
            } => format!(
                "\"round_number\":{round},\"changes\":{changes},\"iterations\":{iterations}"
            ),
            TraceEvent::FactAdded { fact } | TraceEvent::FactRemoved { fact } => {
                Self::format_fact(fact)
            }
            TraceEvent::CommitFired { rule, bindings } => format!(
                "\"rule\":\"{}\",\"bindings\":{}",
                Self::escape_string(rule),
                Self::format_bindings(bindings)
            ),
            TraceEvent::InvariantViolated {
                invariant,
                bindings,
            } => format!(
                "\"invariant\":\"{}\",\"bindings\":{}",
                Self::escape_string(invariant),
                Self::format_bindings(bindings)
            ),
            TraceEvent::QueryDegraded {
                full_scans,
                lookups,
            } => format!("\"full_scans\":{full_scans},\"lookups\":{lookups}"),
            TraceEvent::DiffForwarded { channel, changes } => format!(
                "\"channel\":\"{}\",\"changes\":{changes}",
                Self::escape_string(channel)
            ),
        };

        format!(
            "{{\"id\":{},\"program\":\"{}\",\"round\":{},\"ts\":{},\"type\":\"{}\",{}}}",
            record.id,
            Self::escape_string(&record.program),
            record.round,
            record.timestamp_ns,
            record.event_type(),
            event_data
        )
    }

    fn format_many(&self, records: &[&TraceRecord]) -> String {
        let items: Vec<_> = records.iter().map(|r| self.format(r)).collect();
        format!("[{}]", items.join(","))
    }
}

// =============================================================================
// Tests
// =============================================================================
