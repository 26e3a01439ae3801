//! Round tracing and trace export for Eddy.
//!
//! This crate provides:
//! - [`Tracer`] - A round subscriber that records trace events
//! - [`TraceBuffer`] - Bounded storage for recent records
//! - [`HumanFormatter`] and [`JsonFormatter`] - Text output

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod trace;

pub use config::TraceConfig;
pub use trace::{
    HumanFormatter, JsonFormatter, TraceBuffer, TraceBufferStats, TraceEvent, TraceFormatter,
    TraceRecord, Tracer,
};
