//! Eddy - Round-based incremental rule evaluator
//!
//! This crate re-exports all layers of the Eddy system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: eddy_debug      - Round tracing, trace formatting and export
//! Layer 2: eddy_engine     - Joins, rules, rounds, forwarding, queries
//! Layer 1: eddy_store      - Indexed fact store, signed diffs
//! Layer 0: eddy_foundation - Core types (EntityId, Value, Fact, Error)
//! ```

pub use eddy_debug as debug;
pub use eddy_engine as engine;
pub use eddy_foundation as foundation;
pub use eddy_store as store;
