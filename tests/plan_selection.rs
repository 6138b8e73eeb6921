//! Plan Selection Tests
//!
//! Tests for cost-based index selection:
//! - The cheapest access path wins, traversal included
//! - Explain mode returns a single plan row
//! - Measure mode reports read and scan counts

use arborq::ast::{CompareOp, Column, Constraint, DynamicOperand, SelectorRef, Source, StaticOperand};
use arborq::index::{Filter, IndexPlan, QueryIndex, StaticIndexProvider};
use arborq::query::Query;
use arborq::store::{MemoryRootState, RootState};
use serde_json::{json, Value};
use std::rc::Rc;

// =============================================================================
// Helper Functions
// =============================================================================

/// An index with a fixed reported cost that scans every node.
struct FixedCostIndex {
    name: &'static str,
    cost: f64,
}

impl QueryIndex for FixedCostIndex {
    fn index_name(&self) -> &str {
        self.name
    }

    fn minimum_cost(&self) -> f64 {
        0.5
    }

    fn cost(&self, _filter: &Filter, _root: &dyn RootState) -> f64 {
        self.cost
    }

    fn query(
        &self,
        filter: &Filter,
        _plan: Option<&IndexPlan>,
        root: &dyn RootState,
    ) -> Vec<String> {
        root.all_paths()
            .into_iter()
            .filter(|p| filter.path_restriction.matches(p))
            .collect()
    }
}

fn store_with_x(n: u64) -> MemoryRootState {
    let mut root = MemoryRootState::new();
    for i in 1..=n {
        root.add_json(format!("/n{}", i), json!({ "x": i }));
    }
    root
}

fn x_query(constraint: Option<Constraint>) -> Query {
    let mut query = Query::new(
        "",
        Source::selector("a"),
        constraint,
        vec![Column::new("a", "x", "x")],
    );
    query.init().unwrap();
    query
}

fn x_at_most(bound: u64) -> Constraint {
    Constraint::Comparison {
        left: DynamicOperand::PropertyValue(SelectorRef::new("a"), "x".into()),
        op: CompareOp::Le,
        right: StaticOperand::Literal(json!(bound)),
    }
}

// =============================================================================
// Index Selection Tests
// =============================================================================

/// An index reporting cost 5 beats a 10-node traversal.
#[test]
fn test_index_beats_traversal() {
    let root = store_with_x(10);
    let provider = StaticIndexProvider::new()
        .with_index(Rc::new(FixedCostIndex { name: "property", cost: 5.0 }));
    let mut query = x_query(None);
    query.prepare(&root, &provider).unwrap();
    assert_eq!(query.estimated_cost(), Some(5.0));
    assert!(query.plan_text().contains("property"));
}

/// Traversal wins when it is cheaper than every index.
#[test]
fn test_traversal_wins_when_cheaper() {
    let root = store_with_x(2);
    let provider = StaticIndexProvider::new()
        .with_index(Rc::new(FixedCostIndex { name: "property", cost: 50.0 }));
    let mut query = x_query(None);
    query.prepare(&root, &provider).unwrap();
    assert_eq!(query.estimated_cost(), Some(2.0));
    assert!(query.plan_text().contains("traverse"));
}

/// Traversal is adopted when no index reports a finite cost.
#[test]
fn test_traversal_fallback_for_infinite_cost() {
    let root = store_with_x(100);
    let provider = StaticIndexProvider::new().with_index(Rc::new(FixedCostIndex {
        name: "property",
        cost: f64::INFINITY,
    }));
    let mut query = x_query(None);
    query.prepare(&root, &provider).unwrap();
    assert!(query.plan_text().contains("traverse"));
}

/// With traversal disabled and no index, prepare fails.
#[test]
fn test_no_index_and_traversal_disabled() {
    let root = store_with_x(3);
    let provider = StaticIndexProvider::new();
    let mut query = x_query(None);
    query.set_traversal_enabled(false);
    assert!(query.prepare(&root, &provider).is_err());
}

// =============================================================================
// Explain and Measure Tests
// =============================================================================

/// Explain mode produces exactly one row in a single `plan` column.
#[test]
fn test_explain_single_plan_row() {
    let root = store_with_x(5);
    let provider = StaticIndexProvider::new();
    let mut query = x_query(Some(x_at_most(3)));
    query.set_explain(true);
    query.prepare(&root, &provider).unwrap();
    let rows = query.execute(&root).unwrap();
    assert_eq!(rows.column_names(), ["plan".to_string()]);
    assert_eq!(rows.known_size(), Some(1));
    let collected: Vec<_> = rows.collect();
    assert_eq!(collected.len(), 1);
    let plan = collected[0].value(0).unwrap();
    assert!(plan.as_str().unwrap().contains("traverse"));
}

/// Measure mode drains the query and reports 7 rows read for 3 matched.
#[test]
fn test_measure_counts() {
    let root = store_with_x(7);
    let provider = StaticIndexProvider::new();

    let mut plain = x_query(Some(x_at_most(3)));
    plain.prepare(&root, &provider).unwrap();
    assert_eq!(plain.execute(&root).unwrap().count(), 3);

    let mut measured = x_query(Some(x_at_most(3)));
    measured.set_measure(true);
    measured.prepare(&root, &provider).unwrap();
    let rows = measured.execute(&root).unwrap();
    assert_eq!(
        rows.column_names(),
        ["selector".to_string(), "scanCount".to_string()]
    );
    let collected: Vec<_> = rows.collect();
    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0].value(0), Some(&Value::String("query".into())));
    assert_eq!(collected[0].value(1), Some(&json!(7)));
    assert_eq!(collected[1].value(0), Some(&Value::String("a".into())));
    assert_eq!(collected[1].value(1), Some(&json!(7)));
}

/// Prepare refuses to run while a referenced bind variable is unset.
#[test]
fn test_unset_bind_variable_rejected() {
    let root = store_with_x(3);
    let provider = StaticIndexProvider::new();
    let constraint = Constraint::Comparison {
        left: DynamicOperand::PropertyValue(SelectorRef::new("a"), "x".into()),
        op: CompareOp::Eq,
        right: StaticOperand::BindVariable("v".into()),
    };
    let mut query = x_query(Some(constraint));
    assert_eq!(query.bind_variable_names(), ["v"]);
    assert!(query.prepare(&root, &provider).is_err());
    query.bind_value("v", json!(2)).unwrap();
    query.prepare(&root, &provider).unwrap();
    let rows: Vec<_> = query.execute(&root).unwrap().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].path(0), Some("/n2"));
}
