//! Integration tests for Error types
//!
//! Tests error construction, display, context, and error kinds.

use eddy_foundation::{Error, ErrorContext, ErrorKind, SemanticLimit};

// =============================================================================
// Error Construction
// =============================================================================

#[test]
fn error_unbound_variable() {
    let err = Error::unbound_variable("label", "t");
    assert!(matches!(err.kind, ErrorKind::UnboundVariable { .. }));
    assert_eq!(err.to_string(), "unbound variable ?t in rule label");
}

#[test]
fn error_duplicate_rule() {
    let err = Error::duplicate_rule("label");
    assert!(matches!(err.kind, ErrorKind::DuplicateRule(ref name) if name == "label"));
    assert!(err.to_string().contains("label"));
}

#[test]
fn error_invalid_rule() {
    let err = Error::invalid_rule("label", "choose has no branches");
    assert!(err.to_string().contains("choose has no branches"));
}

#[test]
fn error_programs() {
    assert!(Error::unknown_program("ui").to_string().contains("ui"));
    assert!(matches!(Error::duplicate_program("ui").kind, ErrorKind::DuplicateProgram(_)));
}

#[test]
fn error_serialization() {
    let err = Error::serialization("unexpected end of input");
    assert_eq!(err.to_string(), "serialization error: unexpected end of input");
}

#[test]
fn registration_errors_are_classified() {
    assert!(Error::unbound_variable("r", "x").is_registration());
    assert!(Error::duplicate_rule("r").is_registration());
    assert!(Error::invalid_rule("r", "bad").is_registration());
    assert!(!Error::internal("oops").is_registration());
    assert!(!Error::limit_exceeded(SemanticLimit::MaxForwardHops { limit: 1 }).is_registration());
}

// =============================================================================
// Semantic Limits
// =============================================================================

#[test]
fn limit_display() {
    let err = Error::limit_exceeded(SemanticLimit::MaxFixpointIterations {
        limit: 10,
        context: Some("still changing: count up".to_string()),
    });
    assert_eq!(
        err.to_string(),
        "limit exceeded: max fixpoint iterations (10) exceeded: still changing: count up"
    );

    let err = Error::limit_exceeded(SemanticLimit::MaxForwardHops { limit: 3 });
    assert_eq!(err.to_string(), "limit exceeded: max forward hops (3) exceeded");
}

// =============================================================================
// Context
// =============================================================================

#[test]
fn context_attaches_to_error() {
    let context = ErrorContext::new()
        .with_source("app")
        .with_round(4)
        .with_frame("fixpoint");
    let err = Error::internal("boom").with_context(context);

    let context = err.context.as_ref().unwrap();
    assert_eq!(context.source.as_deref(), Some("app"));
    assert_eq!(context.round, Some(4));
    assert_eq!(context.stack, vec!["fixpoint".to_string()]);
}

#[test]
fn context_display() {
    let context = ErrorContext::new()
        .with_source("app")
        .with_round(2)
        .with_frame("committing");
    let text = context.to_string();
    assert!(text.starts_with("at app (round 2)"));
    assert!(text.contains("  in committing"));
}
