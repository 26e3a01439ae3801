//! Rule registration integration tests
//!
//! Registration is the only place rule errors surface: every invalid rule is
//! rejected before it can run.

use eddy_engine::{Body, Branch, Expr, Gather, Order, RecordSpec, Rule, RuleKind, RuleRegistry};
use eddy_foundation::{Attribute, ErrorKind};

fn registry(rules: Vec<Rule>) -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    for rule in rules {
        registry.register(rule).unwrap();
    }
    registry
}

// =============================================================================
// Registration errors
// =============================================================================

#[test]
fn unbound_action_variable() {
    let err = RuleRegistry::new()
        .register(Rule::block("label").find("?e", "text", "?t").add("?e", "label", "?missing"))
        .unwrap_err();
    assert!(err.is_registration());
    assert!(matches!(err.kind, ErrorKind::UnboundVariable { ref var, .. } if var == "missing"));
}

#[test]
fn unbound_filter_variable() {
    let err = RuleRegistry::new()
        .register(Rule::block("f").find("?e", "sort", "?s").filter(Expr::var("n").greater_than(1)))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnboundVariable { ref var, .. } if var == "n"));
}

#[test]
fn duplicate_names_are_rejected() {
    let mut registry = registry(vec![Rule::block("a")]);
    let err = registry.register(Rule::commit("a")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateRule(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn remove_outside_commit_is_rejected() {
    let err = RuleRegistry::new()
        .register(Rule::block("strip").find("?e", "tag", "x").remove_attribute("?e", "tag"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidRule { .. }));

    let ok = RuleRegistry::new()
        .register(Rule::commit("strip").find("?e", "tag", "x").remove_attribute("?e", "tag"))
        .is_ok();
    assert!(ok);
}

#[test]
fn malformed_choose_is_rejected() {
    let empty = Rule::block("c").find("?e", "tag", "_").choose(["?x"], vec![]);
    assert!(RuleRegistry::new().register(empty).is_err());

    let arity = Rule::block("c").find("?e", "tag", "_").choose(
        ["?x", "?y"],
        vec![Branch::new(Body::new(), vec![Expr::constant(1)])],
    );
    assert!(matches!(
        RuleRegistry::new().register(arity).unwrap_err().kind,
        ErrorKind::InvalidRule { .. }
    ));
}

#[test]
fn gather_into_bound_variable_is_rejected() {
    let rule = Rule::block("g")
        .find("?p", "children", "?c")
        .gather(Gather::count("?c").per(["?p"]));
    assert!(RuleRegistry::new().register(rule).is_err());

    let rule = Rule::block("g")
        .find("?p", "children", "?c")
        .gather(Gather::count("?n").per(["?q"]));
    let err = RuleRegistry::new().register(rule).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnboundVariable { ref var, .. } if var == "q"));
}

#[test]
fn gather_without_projection_is_rejected() {
    let rule = Rule::block("g")
        .find("?p", "children", "?c")
        .gather(Gather::count("?n").per(["?p"]));
    let err = RuleRegistry::new().register(rule).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidRule { .. }));

    let rule = Rule::block("g")
        .find("?p", "children", "?c")
        .gather(Gather::rank(Vec::<&str>::new(), Order::Ascending, "?r").per(["?p"]));
    assert!(RuleRegistry::new().register(rule).is_err());

    // rank keys alone are enough to tell members apart
    let rule = Rule::block("g")
        .find("?p", "children", "?c")
        .gather(Gather::rank(["?c"], Order::Ascending, "?r").per(["?p"]));
    assert!(RuleRegistry::new().register(rule).is_ok());
}

#[test]
fn record_handles_must_be_fresh() {
    let rule = Rule::commit("r")
        .find("?e", "tag", "x")
        .record(RecordSpec::new("?e").tag("copy"));
    assert!(RuleRegistry::new().register(rule).is_err());

    let rule = Rule::commit("r")
        .find("?e", "tag", "x")
        .record(RecordSpec::new("?n"))
        .record(RecordSpec::new("?n"));
    assert!(RuleRegistry::new().register(rule).is_err());
}

#[test]
fn empty_names_are_rejected() {
    assert!(RuleRegistry::new().register(Rule::block("  ")).is_err());
}

// =============================================================================
// Compiled metadata
// =============================================================================

#[test]
fn kinds_are_partitioned() {
    let registry = registry(vec![
        Rule::block("b"),
        Rule::commit("c"),
        Rule::watch("w", "render"),
    ]);
    assert_eq!(registry.blocks().count(), 1);
    assert_eq!(registry.commits().count(), 1);
    assert_eq!(registry.watches().count(), 1);
    assert_eq!(
        registry.get("w").unwrap().kind(),
        &RuleKind::Watch { channel: "render".to_string() }
    );
    assert_eq!(Rule::watch("w", "render").to_string(), "watch w -> render");
}

#[test]
fn dependencies_and_outputs() {
    let registry = registry(vec![Rule::block("count")
        .find("?p", "children", "?c")
        .gather(Gather::count("?n").project(["?c"]).per(["?p"]))
        .add("?p", "child-count", "?n")
        .record(RecordSpec::new("?badge").tag("badge").attr("of", "?p"))]);
    let rule = registry.get("count").unwrap();
    assert!(rule.deps.attributes.contains(&Attribute::new("children")));
    let outputs: Vec<_> = rule.outputs.iter().map(|a| a.as_str().to_string()).collect();
    assert_eq!(outputs, vec!["child-count", "of", "tag"]);
}

#[test]
fn recursive_groups_include_mutual_recursion_only() {
    let registry = registry(vec![
        Rule::block("parent").find("?p", "children", "?c").add("?c", "ancestor", "?p"),
        Rule::block("ancestor")
            .find("?c", "ancestor", "?p")
            .find("?p", "ancestor", "?g")
            .add("?c", "ancestor", "?g"),
        Rule::block("depth").find("?c", "ancestor", "_").add("?c", "nested", true),
    ]);
    assert_eq!(registry.recursive_groups().len(), 1);
    assert!(registry.group_of("ancestor").is_some());
    assert!(registry.group_of("parent").is_none());
    assert!(registry.group_of("depth").is_none());
}
