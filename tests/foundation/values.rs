//! Integration tests for Value

use eddy_foundation::{EntityId, Value};
use proptest::prelude::*;

// =============================================================================
// Conversions and accessors
// =============================================================================

#[test]
fn conversions() {
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from(3), Value::Int(3));
    assert_eq!(Value::from(3_i64), Value::Int(3));
    assert_eq!(Value::from(1.5), Value::Float(1.5));
    assert_eq!(Value::from("hi").as_str(), Some("hi"));
    assert_eq!(Value::from(String::from("hi")).as_str(), Some("hi"));
    let e = EntityId::from_raw(7);
    assert_eq!(Value::from(e).as_entity(), Some(e));
}

#[test]
fn accessors_reject_other_types() {
    assert_eq!(Value::from("1").as_int(), None);
    assert_eq!(Value::from(1).as_str(), None);
    assert_eq!(Value::from(1).as_number(), Some(1.0));
    assert_eq!(Value::from(true).as_number(), None);
    assert!(Value::from(2.5).is_number());
    assert!(!Value::from("x").is_number());
}

#[test]
fn type_names() {
    assert_eq!(Value::from(true).type_name(), "bool");
    assert_eq!(Value::from(1).type_name(), "int");
    assert_eq!(Value::from(1.0).type_name(), "float");
    assert_eq!(Value::from("s").type_name(), "string");
    assert_eq!(Value::from(EntityId::from_raw(1)).type_name(), "entity");
}

#[test]
fn display() {
    assert_eq!(Value::from("div").to_string(), "div");
    assert_eq!(Value::from(-4).to_string(), "-4");
    assert_eq!(Value::from(EntityId::from_raw(3)).to_string(), "#3");
}

// =============================================================================
// Equality and ordering
// =============================================================================

#[test]
fn int_and_float_are_distinct_but_loosely_equal() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
    assert!(Value::Int(1).loosely_equals(&Value::Float(1.0)));
    assert!(!Value::Int(1).loosely_equals(&Value::from("1")));
}

#[test]
fn numbers_order_numerically_across_types() {
    assert!(Value::Int(2) < Value::Float(2.5));
    assert!(Value::Float(2.5) < Value::Int(3));
    assert!(Value::Int(1) < Value::Float(1.0));
    assert!(Value::Int(i64::MAX) < Value::Float(f64::INFINITY));
}

#[test]
fn type_rank_orders_mixed_values() {
    let mut values = vec![
        Value::from(EntityId::from_raw(1)),
        Value::from("a"),
        Value::from(10),
        Value::from(false),
    ];
    values.sort();
    assert_eq!(values[0], Value::Bool(false));
    assert_eq!(values[1], Value::Int(10));
    assert_eq!(values[2], Value::from("a"));
    assert!(values[3].as_entity().is_some());
}

proptest! {
    #[test]
    fn int_order_matches_i64(a in any::<i64>(), b in any::<i64>()) {
        prop_assert_eq!(Value::Int(a).cmp(&Value::Int(b)), a.cmp(&b));
    }

    #[test]
    fn ordering_is_total_for_floats(a in any::<f64>(), b in any::<f64>()) {
        let (x, y) = (Value::Float(a), Value::Float(b));
        prop_assert_eq!(x.cmp(&y), y.cmp(&x).reverse());
        prop_assert_eq!(x == y, x.cmp(&y) == std::cmp::Ordering::Equal);
    }
}
