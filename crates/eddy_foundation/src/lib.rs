//! Core types, values, and errors for Eddy.
//!
//! This crate provides:
//! - [`EntityId`] - Opaque, never-reused entity identifiers
//! - [`Attribute`] - Shared attribute names
//! - [`Value`] - The value half of a fact
//! - [`Fact`] - The (entity, attribute, value) triple
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod attribute;
pub mod entity;
pub mod error;
pub mod fact;
pub mod value;

pub use attribute::Attribute;
pub use entity::EntityId;
pub use error::{Error, ErrorContext, ErrorKind, SemanticLimit};
pub use fact::Fact;
pub use value::Value;

/// Result type alias using Eddy's error type.
pub type Result<T> = std::result::Result<T, Error>;
