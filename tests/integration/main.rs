//! Cross-layer integration tests for Eddy
//!
//! Tests that drive whole programs: rounds, commits, forwarding between
//! programs, tracing, and end-to-end scenarios.

mod rounds;
mod scenarios;
mod traces;

use eddy_foundation::EntityId;

pub fn e(n: u64) -> EntityId {
    EntityId::from_raw(n)
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
