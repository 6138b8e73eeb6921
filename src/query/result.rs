//! Result row model.

use std::cmp::Ordering;

use serde_json::Value;

use crate::ast::{value_cmp, OrderSpec};
use crate::store::NodeTree;

/// One immutable row of a query result.
///
/// A row captures everything it needs at creation time: the trees the source
/// cursors were positioned on (declaration order), the projected column
/// values, and the values of the ORDER BY operands. Nothing is re-evaluated
/// after the cursors move on.
#[derive(Debug, Clone)]
pub struct ResultRow {
    trees: Vec<Option<NodeTree>>,
    values: Vec<Value>,
    order_values: Vec<Value>,
}

impl ResultRow {
    pub fn new(trees: Vec<Option<NodeTree>>, values: Vec<Value>, order_values: Vec<Value>) -> Self {
        Self {
            trees,
            values,
            order_values,
        }
    }

    /// A row carrying plain values only, used for explain and measure output.
    pub fn synthetic(values: Vec<Value>) -> Self {
        Self {
            trees: Vec::new(),
            values,
            order_values: Vec::new(),
        }
    }

    pub fn tree(&self, selector: usize) -> Option<&NodeTree> {
        self.trees.get(selector).and_then(|t| t.as_ref())
    }

    /// The path of the given selector's tree, None for an outer-join row
    /// where the selector produced no node.
    pub fn path(&self, selector: usize) -> Option<&str> {
        self.tree(selector).map(|t| t.path.as_str())
    }

    pub fn value(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Key over the columns that count toward DISTINCT.
    pub fn distinct_key(&self, counts: &[bool]) -> String {
        let selected: Vec<&Value> = self
            .values
            .iter()
            .zip(counts.iter().copied().chain(std::iter::repeat(true)))
            .filter_map(|(v, keep)| keep.then_some(v))
            .collect();
        serde_json::to_string(&selected).unwrap_or_default()
    }

    /// Key over paths and all values, used to deduplicate across the
    /// branches of a UNION.
    pub fn dedupe_key(&self) -> String {
        let paths: Vec<Option<&str>> = (0..self.trees.len()).map(|i| self.path(i)).collect();
        serde_json::to_string(&(paths, &self.values)).unwrap_or_default()
    }

    /// Direction-aware comparison over the captured ORDER BY values. Safe to
    /// use with a stable sort; equal rows keep their scan order.
    pub fn compare_order(&self, other: &ResultRow, orderings: &[OrderSpec]) -> Ordering {
        for (i, spec) in orderings.iter().enumerate() {
            let a = self.order_values.get(i).unwrap_or(&Value::Null);
            let b = other.order_values.get(i).unwrap_or(&Value::Null);
            let mut ord = value_cmp(a, b);
            if spec.is_descending() {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
