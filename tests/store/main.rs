//! Integration tests for Layer 1: Store
//!
//! Tests for the indexed fact store, signed diffs, and single-clause queries.
