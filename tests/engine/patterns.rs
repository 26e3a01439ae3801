//! Join engine integration tests
//!
//! Exercises `find`, `not`, `choose`, `gather`, `filter` and `bind` against
//! a populated store.

use eddy_engine::{Body, Branch, Expr, Function, Gather, Order, PatternMatcher};
use eddy_foundation::{EntityId, Fact, Value};
use eddy_store::{Bindings, FactStore};

fn e(n: u64) -> EntityId {
    EntityId::from_raw(n)
}

/// Two containers: #1 holds #11 and #12, #2 holds #21.
fn store() -> FactStore {
    [
        Fact::new(e(1), "tag", "container"),
        Fact::new(e(2), "tag", "container"),
        Fact::new(e(1), "children", e(11)),
        Fact::new(e(1), "children", e(12)),
        Fact::new(e(2), "children", e(21)),
        Fact::new(e(11), "sort", 2),
        Fact::new(e(12), "sort", 1),
        Fact::new(e(21), "sort", 5),
        Fact::new(e(11), "text", "b"),
        Fact::new(e(12), "text", "a"),
        Fact::new(e(21), "text", "c"),
    ]
    .into_iter()
    .collect()
}

fn run(body: &Body) -> Vec<Bindings> {
    PatternMatcher::new(&store()).match_body(body)
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn multi_clause_join() {
    let rows = run(&Body::new()
        .find("?p", "tag", "container")
        .find("?p", "children", "?c")
        .find("?c", "text", "?t"));
    assert_eq!(rows.len(), 3);
    assert!(rows.contains(&Bindings::new().with("p", e(2)).with("c", e(21)).with("t", "c")));
}

#[test]
fn join_results_are_sets() {
    let rows = run(&Body::new()
        .find("?p", "children", "?c")
        .find("?p", "tag", "_"));
    assert_eq!(rows.len(), 3);
}

#[test]
fn join_counts_lookups_and_scans() {
    let store = store();
    let mut matcher = PatternMatcher::new(&store);
    matcher.match_body(&Body::new().find("?p", "tag", "container").find("?p", "children", "?c"));
    let stats = matcher.stats();
    assert_eq!(stats.lookups, 3);
    assert_eq!(stats.full_scans, 0);

    let mut matcher = PatternMatcher::new(&store);
    matcher.match_body(&Body::new().find("?x", "?a", "?v"));
    assert_eq!(matcher.stats().full_scans, 1);
}

// =============================================================================
// Negation
// =============================================================================

#[test]
fn not_keeps_unmatched_environments() {
    let rows = run(&Body::new()
        .find("?c", "sort", "?s")
        .not(Body::new().find("?p", "children", "?c").find("?p", "tag", "container").filter(Expr::var("s").greater_than(1))));
    assert_eq!(rows, vec![Bindings::new().with("c", e(12)).with("s", 1)]);
}

#[test]
fn not_with_attribute_variables() {
    // entities nothing points at
    let rows = run(&Body::new()
        .find("?e", "tag", "_")
        .not(Body::new().find("?x", "?a", "?e")));
    assert_eq!(rows.len(), 2);
}

// =============================================================================
// Choose
// =============================================================================

#[test]
fn choose_takes_the_first_branch_with_results() {
    let rows = run(&Body::new().find("?c", "text", "?t").choose(
        ["?label"],
        vec![
            Branch::new(Body::new().find("?c", "title", "?x"), vec![Expr::var("x")]),
            Branch::new(
                Body::new().find("?c", "sort", "?s").filter(Expr::var("s").greater_than(1)),
                vec![Expr::call(Function::Uppercase, vec![Expr::var("t")])],
            ),
            Branch::new(Body::new(), vec![Expr::var("t")]),
        ],
    ));
    let labels: Vec<_> = rows.iter().map(|r| r.get("label").cloned().unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert!(labels.contains(&Value::from("B")));
    assert!(labels.contains(&Value::from("C")));
    assert!(labels.contains(&Value::from("a")));
}

#[test]
fn choose_branch_variables_stay_local() {
    let rows = run(&Body::new().find("?c", "sort", "?s").choose(
        ["?n"],
        vec![Branch::new(Body::new().bind("?tmp", Expr::var("s").times(10)), vec![Expr::var("tmp")])],
    ));
    assert!(rows.iter().all(|r| !r.contains("tmp")));
    assert!(rows.contains(&Bindings::new().with("c", e(21)).with("s", 5).with("n", 50)));
}

// =============================================================================
// Gather
// =============================================================================

#[test]
fn gather_counts_per_group() {
    let rows = run(&Body::new()
        .find("?p", "children", "?c")
        .gather(Gather::count("?n").project(["?c"]).per(["?p"])));
    let count_of = |p: u64| {
        rows.iter()
            .find(|r| r.get("p") == Some(&Value::from(e(p))))
            .and_then(|r| r.get("n").cloned())
    };
    assert_eq!(count_of(1), Some(Value::from(2)));
    assert_eq!(count_of(2), Some(Value::from(1)));
}

#[test]
fn gather_sum_min_max() {
    let base = Body::new().find("?p", "children", "?c").find("?c", "sort", "?s");
    let sums = run(&base.clone().gather(Gather::sum("?s", "?total").project(["?c"]).per(["?p"])));
    assert!(sums.iter().any(|r| r.get("p") == Some(&Value::from(e(1))) && r.get("total") == Some(&Value::from(3))));

    let mins = run(&base.clone().gather(Gather::min("?s", "?low")));
    assert!(mins.iter().all(|r| r.get("low") == Some(&Value::from(1))));

    let maxes = run(&base.gather(Gather::max("?s", "?high").per(["?p"])));
    assert!(maxes.iter().any(|r| r.get("p") == Some(&Value::from(e(2))) && r.get("high") == Some(&Value::from(5))));
}

#[test]
fn gather_rank_orders_members() {
    let rows = run(&Body::new()
        .find("?p", "children", "?c")
        .find("?c", "sort", "?s")
        .gather(Gather::rank(["?s"], Order::Descending, "?r").project(["?c"]).per(["?p"])));
    let rank_of = |c: u64| {
        rows.iter()
            .find(|r| r.get("c") == Some(&Value::from(e(c))))
            .and_then(|r| r.get("r").cloned())
    };
    assert_eq!(rank_of(11), Some(Value::from(1)));
    assert_eq!(rank_of(12), Some(Value::from(2)));
    assert_eq!(rank_of(21), Some(Value::from(1)));
}

// =============================================================================
// Filter and Bind
// =============================================================================

#[test]
fn filter_drops_failing_and_ill_typed_rows() {
    let rows = run(&Body::new()
        .find("?c", "text", "?t")
        .filter(Expr::var("t").plus(1).greater_than(0)));
    assert!(rows.is_empty());
}

#[test]
fn bind_as_equality_test() {
    let rows = run(&Body::new()
        .find("?c", "sort", "?s")
        .bind("?s", Expr::constant(2.0)));
    assert_eq!(rows, vec![Bindings::new().with("c", e(11)).with("s", 2)]);
}

#[test]
fn dependencies_cover_nested_bodies() {
    let body = Body::new()
        .find("?c", "sort", "?s")
        .not(Body::new().find("?c", "hidden", true))
        .choose(["?x"], vec![Branch::new(Body::new().find("?c", "label", "?l"), vec![Expr::var("l")])]);
    let deps = body.dependencies();
    assert!(!deps.any_attribute);
    let names: Vec<_> = deps.attributes.iter().map(|a| a.as_str().to_string()).collect();
    assert_eq!(names, vec!["hidden", "label", "sort"]);
}
