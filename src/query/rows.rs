//! Row production: source cursors and the constraint-filtering iterator.
//!
//! A [`RowIterator`] walks the prepared source tree against one snapshot. The
//! selector cursor pulls candidate paths from the chosen index; the join
//! cursor runs a nested loop, restarting its right side for every row of the
//! left. Every combined cursor position is counted as read, then checked
//! against the constraint; a stop signal from the constraint abandons the
//! scan early.

use std::cell::Cell;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::{
    Column, Constraint, EvalContext, JoinCondition, JoinType, OrderSpec, SelectorId, Source,
};
use crate::index::SelectorExecutionPlan;
use crate::observability::Logger;
use crate::query::result::ResultRow;
use crate::store::{is_hidden_path, NodeTree, RootState};

/// Everything one execution needs, borrowed from the prepared query.
pub(crate) struct ExecutionContext<'a> {
    pub source: &'a Source,
    pub plans: &'a [SelectorExecutionPlan],
    pub selector_names: &'a [String],
    pub constraint: Option<&'a Constraint>,
    pub columns: &'a [Column],
    pub orderings: &'a [OrderSpec],
    pub binds: &'a BTreeMap<String, Option<Value>>,
    pub root: &'a dyn RootState,
    pub warned_hidden: &'a Cell<bool>,
}

/// Cursor state for one selector.
pub(crate) struct SelectorState {
    plan: SelectorExecutionPlan,
    name: String,
    paths: Option<Vec<String>>,
    position: usize,
    current: Option<NodeTree>,
    scan_count: u64,
}

impl SelectorState {
    fn new(plan: SelectorExecutionPlan, name: String) -> Self {
        Self {
            plan,
            name,
            paths: None,
            position: 0,
            current: None,
            scan_count: 0,
        }
    }

    /// Restarts the scan; the candidate paths stay fetched.
    fn restart(&mut self) {
        self.position = 0;
        self.current = None;
    }

    /// Positions on the next existing, non-hidden candidate node.
    fn advance(&mut self, root: &dyn RootState, warned_hidden: &Cell<bool>) -> bool {
        if self.paths.is_none() {
            self.paths = Some(self.plan.index.query(
                &self.plan.filter,
                self.plan.index_plan.as_ref(),
                root,
            ));
        }
        loop {
            let path = {
                let Some(paths) = &self.paths else {
                    return false;
                };
                match paths.get(self.position) {
                    Some(path) => path.clone(),
                    None => {
                        self.current = None;
                        return false;
                    }
                }
            };
            self.position += 1;
            if is_hidden_path(&path) {
                if !warned_hidden.get() {
                    warned_hidden.set(true);
                    Logger::warn("HIDDEN_PATH", &[("path", &path)]);
                }
                continue;
            }
            match root.tree(&path) {
                Some(tree) => {
                    self.scan_count += 1;
                    self.current = Some(tree);
                    return true;
                }
                None => continue,
            }
        }
    }
}

/// Constraint-evaluation view over the current cursor positions.
pub(crate) struct EvalView<'a> {
    states: &'a [SelectorState],
    binds: &'a BTreeMap<String, Option<Value>>,
}

impl EvalContext for EvalView<'_> {
    fn current_tree(&self, selector: SelectorId) -> Option<&NodeTree> {
        self.states.get(selector.0)?.current.as_ref()
    }

    fn bind_value(&self, name: &str) -> Option<&Value> {
        self.binds.get(name)?.as_ref()
    }

    fn sorted_property(&self, selector: SelectorId) -> Option<&str> {
        self.states.get(selector.0)?.plan.sorted_property()
    }
}

/// A cursor over the prepared source tree.
enum SourceCursor {
    Selector(usize),
    Join {
        left: Box<SourceCursor>,
        right: Box<SourceCursor>,
        join_type: JoinType,
        condition: JoinCondition,
        left_positioned: bool,
        left_matched: bool,
    },
}

impl SourceCursor {
    fn build(source: &Source) -> Self {
        match source {
            Source::Selector(leaf) => {
                SourceCursor::Selector(leaf.resolved().map(|id| id.0).unwrap_or(0))
            }
            Source::Join(join) => SourceCursor::Join {
                left: Box::new(SourceCursor::build(&join.left)),
                right: Box::new(SourceCursor::build(&join.right)),
                join_type: join.join_type,
                condition: join.condition.clone(),
                left_positioned: false,
                left_matched: false,
            },
        }
    }

    fn restart(&mut self, states: &mut [SelectorState]) {
        match self {
            SourceCursor::Selector(i) => states[*i].restart(),
            SourceCursor::Join {
                left,
                right,
                left_positioned,
                left_matched,
                ..
            } => {
                left.restart(states);
                right.restart(states);
                *left_positioned = false;
                *left_matched = false;
            }
        }
    }

    /// Clears the current trees of every selector under this cursor, for the
    /// null side of an outer-join row.
    fn clear(&self, states: &mut [SelectorState]) {
        match self {
            SourceCursor::Selector(i) => states[*i].current = None,
            SourceCursor::Join { left, right, .. } => {
                left.clear(states);
                right.clear(states);
            }
        }
    }

    fn next(
        &mut self,
        states: &mut [SelectorState],
        root: &dyn RootState,
        binds: &BTreeMap<String, Option<Value>>,
        warned_hidden: &Cell<bool>,
    ) -> bool {
        match self {
            SourceCursor::Selector(i) => states[*i].advance(root, warned_hidden),
            SourceCursor::Join {
                left,
                right,
                join_type,
                condition,
                left_positioned,
                left_matched,
            } => loop {
                if !*left_positioned {
                    if !left.next(states, root, binds, warned_hidden) {
                        return false;
                    }
                    *left_positioned = true;
                    *left_matched = false;
                    right.restart(states);
                }
                while right.next(states, root, binds, warned_hidden) {
                    let view = EvalView { states, binds };
                    if condition.evaluate(&view) {
                        *left_matched = true;
                        return true;
                    }
                }
                if *join_type == JoinType::LeftOuter && !*left_matched {
                    right.clear(states);
                    *left_positioned = false;
                    return true;
                }
                *left_positioned = false;
            },
        }
    }
}

/// Streams the rows that satisfy the constraint, in source scan order.
pub struct RowIterator<'a> {
    exec: ExecutionContext<'a>,
    cursor: SourceCursor,
    states: Vec<SelectorState>,
    read_count: u64,
    ended: bool,
}

impl<'a> RowIterator<'a> {
    pub(crate) fn new(exec: ExecutionContext<'a>) -> Self {
        let cursor = SourceCursor::build(exec.source);
        let states = exec
            .selector_names
            .iter()
            .enumerate()
            .map(|(i, name)| SelectorState::new(exec.plans[i].clone(), name.clone()))
            .collect();
        Self {
            exec,
            cursor,
            states,
            read_count: 0,
            ended: false,
        }
    }

    /// Rows examined so far, matched or not.
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// Per-selector (name, rows scanned) pairs, declaration order.
    pub fn scan_counts(&self) -> Vec<(String, u64)> {
        self.states
            .iter()
            .map(|s| (s.name.clone(), s.scan_count))
            .collect()
    }

    fn build_row(&self, view: &EvalView<'_>) -> ResultRow {
        let trees = self.states.iter().map(|s| s.current.clone()).collect();
        let values = self
            .exec
            .columns
            .iter()
            .map(|c| c.current_value(view))
            .collect();
        let order_values = self
            .exec
            .orderings
            .iter()
            .map(|o| o.operand.value(view).unwrap_or(Value::Null))
            .collect();
        ResultRow::new(trees, values, order_values)
    }
}

impl Iterator for RowIterator<'_> {
    type Item = ResultRow;

    fn next(&mut self) -> Option<ResultRow> {
        if self.ended {
            return None;
        }
        // The stop signal relies on the index scan order; a join restarts its
        // right side, so it only applies to single-selector sources.
        let allow_stop = self.states.len() == 1;
        loop {
            if !self.cursor.next(
                &mut self.states,
                self.exec.root,
                self.exec.binds,
                self.exec.warned_hidden,
            ) {
                self.ended = true;
                return None;
            }
            self.read_count += 1;
            let view = EvalView {
                states: &self.states,
                binds: self.exec.binds,
            };
            let Some(constraint) = self.exec.constraint else {
                return Some(self.build_row(&view));
            };
            if constraint.evaluate(&view) {
                return Some(self.build_row(&view));
            }
            if allow_stop && constraint.evaluate_stop(&view) {
                self.ended = true;
                return None;
            }
        }
    }
}
