//! Integration tests for Layer 2: Engine
//!
//! Tests for joins, rule registration, record construction, queries, and
//! invariants.

mod patterns;
mod rules;
