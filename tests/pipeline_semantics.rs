//! Row Pipeline Tests
//!
//! Tests for result post-processing:
//! - distinct, ordering, offset and limit compose in a fixed order
//! - An index-provided sort order short-circuits the in-memory sort
//! - The upper-bound stop signal ends an ordered scan early
//! - Row counts are stable across repeated executions

use arborq::ast::{
    CompareOp, Column, Constraint, DynamicOperand, Order, OrderSpec, SelectorRef, Source,
    StaticOperand,
};
use arborq::index::{Filter, IndexPlan, OrderEntry, QueryIndex, StaticIndexProvider};
use arborq::query::{saturated_add, Query};
use arborq::store::{MemoryRootState, RootState};
use serde_json::{json, Value};
use std::rc::Rc;

// =============================================================================
// Helper Functions
// =============================================================================

/// An index whose plan promises rows sorted ascending by `x`, and whose scan
/// delivers them that way.
struct SortedByX;

impl QueryIndex for SortedByX {
    fn index_name(&self) -> &str {
        "ordered"
    }

    fn minimum_cost(&self) -> f64 {
        0.0
    }

    fn cost(&self, _filter: &Filter, _root: &dyn RootState) -> f64 {
        f64::INFINITY
    }

    fn plans(
        &self,
        _filter: &Filter,
        _sort_order: Option<&[OrderEntry]>,
        _root: &dyn RootState,
    ) -> Option<Vec<IndexPlan>> {
        Some(vec![IndexPlan {
            estimated_entry_count: 10,
            cost_per_execution: 1.0,
            cost_per_entry: 0.1,
            sort_order: Some(vec![OrderEntry::ascending("x")]),
            plan_name: Some("x-asc".into()),
        }])
    }

    fn query(
        &self,
        _filter: &Filter,
        _plan: Option<&IndexPlan>,
        root: &dyn RootState,
    ) -> Vec<String> {
        let mut paths = root.all_paths();
        paths.sort_by_key(|p| {
            root.tree(p)
                .and_then(|t| t.property("x").and_then(Value::as_i64))
                .unwrap_or(i64::MAX)
        });
        paths
    }
}

fn store_with_x(n: u64) -> MemoryRootState {
    let mut root = MemoryRootState::new();
    for i in 1..=n {
        root.add_json(format!("/n{}", i), json!({ "x": i }));
    }
    root
}

fn x_query() -> Query {
    let mut query = Query::new(
        "",
        Source::selector("a"),
        None,
        vec![Column::new("a", "x", "x")],
    );
    query.init().unwrap();
    query
}

fn order_by_x(order: Order) -> OrderSpec {
    let operand = DynamicOperand::PropertyValue(SelectorRef::new("a"), "x".into());
    match order {
        Order::Ascending => OrderSpec::ascending(operand),
        Order::Descending => OrderSpec::descending(operand),
    }
}

fn x_values(query: &Query, root: &MemoryRootState) -> Vec<i64> {
    query
        .execute(root)
        .unwrap()
        .map(|r| r.value(0).and_then(Value::as_i64).unwrap())
        .collect()
}

// =============================================================================
// Ordering, Offset and Limit
// =============================================================================

/// Descending order, then offset, then limit.
#[test]
fn test_order_offset_limit_composition() {
    let root = store_with_x(7);
    let provider = StaticIndexProvider::new();
    let mut query = x_query();
    query.set_order_by(vec![order_by_x(Order::Descending)]);
    query.set_offset(2);
    query.set_limit(3);
    query.prepare(&root, &provider).unwrap();
    let rows = query.execute(&root).unwrap();
    // The in-memory sort materialized the result, so its size is known:
    // clamp(min(offset + limit, 7) - offset, 0) = 3.
    assert_eq!(rows.known_size(), Some(3));
    let values: Vec<i64> = rows.map(|r| r.value(0).and_then(Value::as_i64).unwrap()).collect();
    assert_eq!(values, vec![5, 4, 3]);
}

/// An offset past the end yields an empty, known-size-zero result.
#[test]
fn test_offset_past_end() {
    let root = store_with_x(4);
    let provider = StaticIndexProvider::new();
    let mut query = x_query();
    query.set_order_by(vec![order_by_x(Order::Ascending)]);
    query.set_offset(10);
    query.prepare(&root, &provider).unwrap();
    let rows = query.execute(&root).unwrap();
    assert_eq!(rows.known_size(), Some(0));
    assert_eq!(rows.count(), 0);
}

/// Executing the same prepared query twice returns identical rows.
#[test]
fn test_repeated_execution_stable() {
    let root = store_with_x(9);
    let provider = StaticIndexProvider::new();
    let mut query = x_query();
    query.set_offset(1);
    query.set_limit(4);
    query.prepare(&root, &provider).unwrap();
    let first = x_values(&query, &root);
    let second = x_values(&query, &root);
    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
}

/// Unbounded limit plus a positive offset never wraps.
#[test]
fn test_saturated_add_clamps() {
    assert_eq!(saturated_add(i64::MAX, 1), i64::MAX);
    assert_eq!(saturated_add(i64::MIN, -1), i64::MIN);
    let root = store_with_x(3);
    let provider = StaticIndexProvider::new();
    let mut query = x_query();
    query.set_offset(1);
    query.prepare(&root, &provider).unwrap();
    assert_eq!(query.execute(&root).unwrap().count(), 2);
}

// =============================================================================
// Distinct
// =============================================================================

/// Distinct collapses rows with equal non-score column values.
#[test]
fn test_distinct_ignores_score_column() {
    let mut root = MemoryRootState::new();
    root.add_json("/n1", json!({ "x": 1, "score": 0.3 }));
    root.add_json("/n2", json!({ "x": 1, "score": 0.9 }));
    root.add_json("/n3", json!({ "x": 2, "score": 0.5 }));
    let provider = StaticIndexProvider::new();
    let mut query = Query::new(
        "",
        Source::selector("a"),
        None,
        vec![Column::new("a", "x", "x"), Column::new("a", "score", "score")],
    );
    query.set_distinct(true);
    query.init().unwrap();
    query.prepare(&root, &provider).unwrap();
    // /n1 and /n2 differ only in score, which does not count.
    assert_eq!(query.execute(&root).unwrap().count(), 2);
}

// =============================================================================
// Index-Provided Sort Order
// =============================================================================

/// A structurally matching index sort order skips the in-memory sort, so the
/// result streams with unknown size.
#[test]
fn test_sorted_by_index_streams() {
    let root = store_with_x(5);
    let provider = StaticIndexProvider::new().with_index(Rc::new(SortedByX));
    let mut query = x_query();
    query.set_order_by(vec![order_by_x(Order::Ascending)]);
    query.set_traversal_enabled(false);
    query.prepare(&root, &provider).unwrap();
    assert!(query.is_sorted_by_index());
    let rows = query.execute(&root).unwrap();
    assert_eq!(rows.known_size(), None);
    let values: Vec<i64> = rows.map(|r| r.value(0).and_then(Value::as_i64).unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

/// A direction mismatch falls back to the in-memory sort.
#[test]
fn test_direction_mismatch_sorts_in_memory() {
    let root = store_with_x(5);
    let provider = StaticIndexProvider::new().with_index(Rc::new(SortedByX));
    let mut query = x_query();
    query.set_order_by(vec![order_by_x(Order::Descending)]);
    query.set_traversal_enabled(false);
    query.prepare(&root, &provider).unwrap();
    assert!(!query.is_sorted_by_index());
    let rows = query.execute(&root).unwrap();
    assert_eq!(rows.known_size(), Some(5));
    let values: Vec<i64> = rows.map(|r| r.value(0).and_then(Value::as_i64).unwrap()).collect();
    assert_eq!(values, vec![5, 4, 3, 2, 1]);
}

/// On an ascending scan, an upper bound on the sorted property stops the
/// scan at the first row past the bound.
#[test]
fn test_upper_bound_stops_ordered_scan() {
    let root = store_with_x(7);
    let provider = StaticIndexProvider::new().with_index(Rc::new(SortedByX));
    let constraint = Constraint::Comparison {
        left: DynamicOperand::PropertyValue(SelectorRef::new("a"), "x".into()),
        op: CompareOp::Lt,
        right: StaticOperand::Literal(json!(3)),
    };
    let mut query = Query::new(
        "",
        Source::selector("a"),
        Some(constraint),
        vec![Column::new("a", "x", "x")],
    );
    query.set_measure(true);
    query.set_traversal_enabled(false);
    query.init().unwrap();
    query.prepare(&root, &provider).unwrap();
    let rows: Vec<_> = query.execute(&root).unwrap().collect();
    // x = 1 and 2 match; x = 3 is examined, fails the bound, and stops the
    // scan: 3 rows read, not 7.
    assert_eq!(rows[0].value(0), Some(&Value::String("query".into())));
    assert_eq!(rows[0].value(1), Some(&json!(3)));
}

// =============================================================================
// Hidden Paths
// =============================================================================

/// Hidden subtrees never produce rows.
#[test]
fn test_hidden_paths_skipped() {
    let mut root = MemoryRootState::new();
    root.add_json("/visible", json!({ "x": 1 }));
    root.add_json("/:index/hidden", json!({ "x": 2 }));
    let provider = StaticIndexProvider::new();
    let mut query = x_query();
    query.prepare(&root, &provider).unwrap();
    let rows: Vec<_> = query.execute(&root).unwrap().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].path(0), Some("/visible"));
}
