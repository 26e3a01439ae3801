//! Round lifecycle integration tests
//!
//! Tests input queueing, derived support, rollback, and subscriber delivery.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use eddy_engine::{Body, EvaluatorConfig, Expr, Function, Phase, Program, RoundLog, Rule};
use eddy_foundation::{ErrorKind, Fact, SemanticLimit};
use eddy_store::Diff;

use crate::{e, init_logging};

fn labels() -> Program {
    let mut program = Program::new("app");
    program
        .register(
            Rule::block("label")
                .find("?e", "tag", "div")
                .find("?e", "text", "?t")
                .add("?e", "label", Expr::call(Function::Uppercase, vec![Expr::var("t")])),
        )
        .unwrap();
    program
}

// =============================================================================
// Input
// =============================================================================

#[test]
fn queued_input_runs_one_round_per_diff() {
    init_logging();
    let mut program = labels();
    program.input_eavs([(e(1), "tag", "div"), (e(1), "text", "hi")]);
    program.submit(Diff::new().with_add(e(2), "tag", "div").with_add(e(2), "text", "yo"));
    assert_eq!(program.round(), 0);

    let reports = program.run_pending().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].round, 1);
    assert_eq!(reports[1].round, 2);
    assert!(program.store().contains(&Fact::new(e(1), "label", "HI")));
    assert!(program.store().contains(&Fact::new(e(2), "label", "YO")));
    assert_eq!(program.phase(), Phase::Idle);
}

#[test]
fn rules_registered_later_see_existing_facts() {
    let mut program = Program::new("app");
    program.apply(Diff::new().with_add(e(1), "tag", "div").with_add(e(1), "text", "hi")).unwrap();

    program
        .register(Rule::block("copy").find("?e", "text", "?t").add("?e", "copy", "?t"))
        .unwrap();
    let reports = program.run_pending().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].diff, Diff::new().with_add(e(1), "copy", "hi"));
}

#[test]
fn round_diff_is_net_change() {
    let mut program = labels();
    program.apply(Diff::new().with_add(e(1), "tag", "div").with_add(e(1), "text", "a")).unwrap();

    let report = program
        .apply(Diff::new().with_remove(e(1), "text", "a").with_add(e(1), "text", "b"))
        .unwrap();
    assert_eq!(
        report.diff,
        Diff::new()
            .with_remove(e(1), "text", "a")
            .with_add(e(1), "text", "b")
            .with_remove(e(1), "label", "A")
            .with_add(e(1), "label", "B")
    );
}

#[test]
fn no_op_input_is_quiet() {
    let mut program = labels();
    program.apply(Diff::new().with_add(e(1), "tag", "div")).unwrap();
    let report = program.apply(Diff::new().with_add(e(1), "tag", "div")).unwrap();
    assert!(report.is_quiet());
    assert_eq!(program.round(), 2);
}

// =============================================================================
// Derived Support
// =============================================================================

#[test]
fn facts_derived_twice_survive_one_retraction() {
    let mut program = Program::new("app");
    program
        .register(Rule::block("by width").find("?e", "width", "_").add("?e", "sized", true))
        .unwrap();
    program
        .register(Rule::block("by height").find("?e", "height", "_").add("?e", "sized", true))
        .unwrap();
    program.apply(Diff::new().with_add(e(1), "width", 3).with_add(e(1), "height", 4)).unwrap();
    let sized = Fact::new(e(1), "sized", true);
    assert_eq!(program.executor().state().support(&sized), 2);

    program.apply(Diff::new().with_remove(e(1), "width", 3)).unwrap();
    assert!(program.store().contains(&sized));

    let report = program.apply(Diff::new().with_remove(e(1), "height", 4)).unwrap();
    assert!(!program.store().contains(&sized));
    assert_eq!(report.diff.weight(&sized), -1);
}

#[test]
fn chained_blocks_reach_a_fixpoint() {
    let mut program = Program::new("app");
    program
        .register(Rule::block("depth 1").find("?p", "children", "?c").add("?c", "depth", 1))
        .unwrap();
    program
        .register(
            Rule::block("depth 2")
                .find("?c", "depth", 1)
                .find("?c", "children", "?g")
                .add("?g", "depth", 2),
        )
        .unwrap();
    let report = program
        .apply(Diff::new().with_add(e(1), "children", e(2)).with_add(e(2), "children", e(3)))
        .unwrap();
    assert!(program.store().contains(&Fact::new(e(3), "depth", 2)));
    assert!(report.stats.fixpoint_iterations >= 2);
    assert!(report.stats.block_evaluations >= 2);
}

// =============================================================================
// Rollback
// =============================================================================

fn runaway() -> Program {
    let mut program = Program::new("app").with_config(EvaluatorConfig::new().with_max_fixpoint_iterations(10));
    program
        .register(Rule::block("count up").find("?e", "n", "?n").add("?e", "n", Expr::var("n").plus(1)))
        .unwrap();
    program
}

#[test]
fn failed_round_leaves_no_trace() {
    init_logging();
    let log = Rc::new(RefCell::new(RoundLog::new()));
    let mut program = runaway();
    program.subscribe(Rc::clone(&log));
    program.apply(Diff::new().with_add(e(5), "tag", "div")).unwrap();
    let before: Vec<Fact> = program.store().iter().collect();

    let err = program.apply(Diff::new().with_add(e(1), "n", 0)).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::LimitExceeded(SemanticLimit::MaxFixpointIterations { limit: 10, .. })
    ));
    let context = err.context.unwrap();
    assert_eq!(context.source.as_deref(), Some("app"));
    assert_eq!(context.round, Some(2));
    assert_eq!(context.stack, vec!["fixpoint".to_string()]);

    assert_eq!(program.round(), 1);
    assert_eq!(program.phase(), Phase::Idle);
    assert_eq!(program.store().iter().collect::<Vec<_>>(), before);
    assert_eq!(log.borrow().reports().len(), 1);
}

#[test]
fn program_keeps_working_after_rollback() {
    let mut program = runaway();
    program.submit(Diff::new().with_add(e(1), "n", 0));
    program.submit(Diff::new().with_add(e(2), "tag", "div"));
    assert!(program.run_pending().is_err());

    // the failed input is dropped, the next one is still queued
    let reports = program.run_pending().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(program.store().contains(&Fact::new(e(2), "tag", "div")));
    assert!(program.query(&Body::new().find("?e", "n", "_")).unwrap().is_empty());
}

// =============================================================================
// Subscribers
// =============================================================================

#[test]
fn subscriber_diffs_compose_to_the_store() {
    let log = Rc::new(RefCell::new(RoundLog::new()));
    let mut program = labels();
    program.subscribe(Rc::clone(&log));

    program.apply(Diff::new().with_add(e(1), "tag", "div").with_add(e(1), "text", "a")).unwrap();
    program.apply(Diff::new().with_add(e(2), "tag", "div").with_add(e(2), "text", "b")).unwrap();
    program.apply(Diff::new().with_remove(e(1), "tag", "div")).unwrap();

    let total = log.borrow().total();
    let added: BTreeSet<Fact> = total.added().cloned().collect();
    assert_eq!(added, program.store().iter().collect::<BTreeSet<_>>());
    assert_eq!(total.removed().count(), 0);
}
