//! End-to-end scenarios
//!
//! Small applications built from blocks, commits, watchers and invariants.

use eddy_engine::{
    Body, Branch, Expr, Function, Gather, Invariant, Order, Program, Query, RecordSpec, Rule,
    Watcher, watcher_fn,
};
use eddy_foundation::{EntityId, Fact, Value};
use eddy_store::{Bindings, Diff};

use crate::{e, init_logging};

// =============================================================================
// Sorted Children
// =============================================================================

fn sorted_children() -> Program {
    let mut program = Program::new("list");
    program
        .register(
            Rule::block("next sort")
                .find("?c", "tag", "container")
                .choose(
                    ["?n"],
                    vec![
                        Branch::new(
                            Body::new()
                                .find("?c", "children", "?x")
                                .find("?x", "sort", "?s")
                                .gather(Gather::max("?s", "?m").per(["?c"])),
                            vec![Expr::var("m").plus(1)],
                        ),
                        Branch::new(Body::new(), vec![Expr::constant(1)]),
                    ],
                )
                .add("?c", "next-sort", "?n"),
        )
        .unwrap();
    program
        .register(
            Rule::commit("add child")
                .find("?c", "tag", "container")
                .find("?c", "add-child", true)
                .find("?c", "next-sort", "?n")
                .remove("?c", "add-child", true)
                .record(RecordSpec::new("?child").tag("item").attr("sort", "?n"))
                .add("?c", "children", "?child"),
        )
        .unwrap();
    program
        .register(
            Rule::block("child count")
                .find("?c", "children", "?x")
                .gather(Gather::count("?k").project(["?x"]).per(["?c"]))
                .add("?c", "child-count", "?k"),
        )
        .unwrap();
    program
}

fn value(program: &Program, entity: EntityId, attribute: &str) -> Option<Value> {
    program.store().value(entity, attribute).cloned()
}

#[test]
fn empty_container_starts_at_one() {
    let mut program = sorted_children();
    program.apply(Diff::new().with_add(e(1), "tag", "container")).unwrap();
    assert_eq!(value(&program, e(1), "next-sort"), Some(Value::Int(1)));
    assert_eq!(value(&program, e(1), "child-count"), None);
}

#[test]
fn appended_children_take_the_next_sort() {
    init_logging();
    let mut program = sorted_children();
    program
        .apply(
            Diff::new()
                .with_add(e(1), "tag", "container")
                .with_add(e(1), "children", e(11))
                .with_add(e(1), "children", e(12))
                .with_add(e(11), "sort", 1)
                .with_add(e(12), "sort", 2)
                .with_add(e(1), "add-child", true),
        )
        .unwrap();

    let rows = program.query(&Body::new().find("?x", "tag", "item").find("?x", "sort", "?s")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("s"), Some(&Value::Int(3)));
    let child = rows[0].get("x").and_then(Value::as_entity).unwrap();
    assert!(child.is_derived());
    assert!(program.store().contains(&Fact::new(e(1), "children", child)));
    assert_eq!(value(&program, e(1), "child-count"), Some(Value::Int(3)));
    assert_eq!(value(&program, e(1), "next-sort"), Some(Value::Int(4)));
    assert!(!program.store().contains(&Fact::new(e(1), "add-child", true)));

    let report = program.apply(Diff::new().with_add(e(1), "add-child", true)).unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(value(&program, e(1), "child-count"), Some(Value::Int(4)));
    assert_eq!(value(&program, e(1), "next-sort"), Some(Value::Int(5)));
    let sorts = program
        .run_query(
            &Query::new(Body::new().find("?x", "tag", "item").find("?x", "sort", "?s"))
                .select(["?s"])
                .order_by("?s", Order::Ascending),
        )
        .unwrap();
    assert_eq!(sorts, vec![Bindings::new().with("s", 3), Bindings::new().with("s", 4)]);
}

#[test]
fn deleted_children_are_not_resurrected() {
    let mut program = sorted_children();
    let items = Body::new().find("?x", "tag", "item");
    let only_child = |program: &Program| {
        let rows = program.query(&items).unwrap();
        assert_eq!(rows.len(), 1);
        rows[0].get("x").and_then(Value::as_entity).unwrap()
    };

    program
        .apply(Diff::new().with_add(e(1), "tag", "container").with_add(e(1), "add-child", true))
        .unwrap();
    let first = only_child(&program);
    assert_eq!(value(&program, first, "sort"), Some(Value::Int(1)));

    let mut delete = Diff::new().with_remove(e(1), "children", first);
    for fact in program.store().facts_of(first) {
        delete.remove(fact);
    }
    program.apply(delete).unwrap();
    assert_eq!(value(&program, e(1), "next-sort"), Some(Value::Int(1)));

    program.apply(Diff::new().with_add(e(1), "add-child", true)).unwrap();
    let second = only_child(&program);
    assert_eq!(value(&program, second, "sort"), Some(Value::Int(1)));
    assert_ne!(first, second);
    assert!(program.store().facts_of(first).is_empty());
}

// =============================================================================
// Tree
// =============================================================================

fn tree() -> Program {
    let mut program = Program::new("tree");
    program
        .register(Rule::block("parent link").find("?p", "children", "?c").add("?c", "parent", "?p"))
        .unwrap();
    program
        .register(
            Rule::block("roots")
                .find("?e", "tag", "_")
                .not(
                    Body::new()
                        .find("?x", "?a", "?e")
                        .filter(Expr::var("a").not_equals("parent"))
                        .filter(Expr::var("x").not_equals(Expr::var("e"))),
                )
                .add("?e", "root", true),
        )
        .unwrap();
    program
        .register(
            Rule::block("sibling rank")
                .find("?p", "children", "?c")
                .find("?c", "sort", "?s")
                .gather(Gather::rank(["?s"], Order::Ascending, "?r").project(["?c", "?s"]).per(["?p"]))
                .add("?c", "position", "?r"),
        )
        .unwrap();
    program
        .add_invariant(Invariant::new(
            "one parent",
            Body::new()
                .find("?c", "parent", "?p")
                .find("?c", "parent", "?q")
                .filter(Expr::var("p").not_equals(Expr::var("q"))),
        ))
        .unwrap();
    program
}

fn roots(program: &Program) -> Vec<EntityId> {
    program
        .query(&Body::new().find("?e", "root", true))
        .unwrap()
        .iter()
        .filter_map(|row| row.get("e").and_then(Value::as_entity))
        .collect()
}

#[test]
fn roots_follow_the_parent_links() {
    let mut program = tree();
    program
        .apply(
            Diff::new()
                .with_add(e(1), "tag", "div")
                .with_add(e(2), "tag", "div")
                .with_add(e(3), "tag", "span")
                .with_add(e(1), "children", e(2))
                .with_add(e(2), "children", e(3)),
        )
        .unwrap();
    assert_eq!(roots(&program), vec![e(1)]);
    assert!(program.store().contains(&Fact::new(e(3), "parent", e(2))));

    program.apply(Diff::new().with_remove(e(1), "children", e(2))).unwrap();
    assert_eq!(roots(&program), vec![e(1), e(2)]);
    assert!(!program.store().contains(&Fact::new(e(2), "parent", e(1))));
}

#[test]
fn siblings_are_ranked_by_sort() {
    let mut program = tree();
    program
        .apply(
            Diff::new()
                .with_add(e(1), "children", e(2))
                .with_add(e(1), "children", e(3))
                .with_add(e(1), "children", e(4))
                .with_add(e(2), "sort", 30)
                .with_add(e(3), "sort", 10)
                .with_add(e(4), "sort", 20),
        )
        .unwrap();
    assert_eq!(program.store().value(e(3), "position"), Some(&Value::Int(1)));
    assert_eq!(program.store().value(e(4), "position"), Some(&Value::Int(2)));
    assert_eq!(program.store().value(e(2), "position"), Some(&Value::Int(3)));

    let report = program
        .apply(Diff::new().with_remove(e(3), "sort", 10).with_add(e(3), "sort", 40))
        .unwrap();
    assert_eq!(program.store().value(e(3), "position"), Some(&Value::Int(3)));
    assert_eq!(program.store().value(e(4), "position"), Some(&Value::Int(1)));
    assert_eq!(report.diff.weight(&Fact::new(e(2), "position", 2)), 1);
}

#[test]
fn shared_children_are_reported() {
    let mut program = tree();
    let report = program
        .apply(Diff::new().with_add(e(1), "children", e(3)).with_add(e(2), "children", e(3)))
        .unwrap();
    // reported once per ordered pair of parents
    assert_eq!(report.violations.len(), 2);
    assert!(report.violations.iter().all(|v| v.invariant == "one parent"));
}

// =============================================================================
// Editor Seeding
// =============================================================================

fn editor() -> impl Watcher {
    watcher_fn("editor", |program: &mut Program| {
        program.register(
            Rule::commit("open editor")
                .find("?i", "tag", "init")
                .record(RecordSpec::new("?ed").tag("editor").attr("mode", "edit")),
        )?;
        program.register(
            Rule::block("editor title")
                .find("?ed", "tag", "editor")
                .find("?ed", "mode", "?m")
                .add(
                    "?ed",
                    "title",
                    Expr::call(Function::Concat, vec![Expr::constant("editing: "), Expr::var("m")]),
                ),
        )?;
        program.submit(Diff::new().with_add(EntityId::named("|init"), "tag", "init"));
        Ok(())
    })
}

#[test]
fn editor_watcher_seeds_itself_once() {
    let mut program = Program::new("ide");
    assert!(program.attach(editor()).unwrap());
    assert!(!program.attach(editor()).unwrap());
    program.run_pending().unwrap();

    let editors: Vec<_> = program.store().entities_with("tag", &"editor".into()).collect();
    assert_eq!(editors.len(), 1);
    assert_eq!(
        program.store().value(editors[0], "title"),
        Some(&Value::from("editing: edit"))
    );
    assert!(program.store().contains(&Fact::new(EntityId::named("|init"), "tag", "init")));
    assert!(!program.has_work());
}
