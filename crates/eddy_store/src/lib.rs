//! Indexed fact storage for Eddy.
//!
//! This crate provides:
//! - [`Diff`] - Signed multisets of facts
//! - [`FactStore`] - Triple store with persistent indices and O(1) snapshots
//! - [`FactPattern`], [`Term`], [`Bindings`] - Single-clause queries

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod diff;
pub mod query;
pub mod store;

pub use diff::Diff;
pub use query::{Bindings, FactPattern, Term};
pub use store::{FactStore, IndexPlan};
