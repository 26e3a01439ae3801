//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: EntityId, Value, Fact, and Error.

mod errors;
mod values;
