//! Index provider contract.
//!
//! Concrete indexes (full-text, property, ...) live outside this crate; the
//! planner consumes them through the [`QueryIndex`] capability interface and
//! an [`IndexProvider`]. The only in-crate implementation is the traversal
//! fallback used when no specialized index wins.
//!
//! Cost queries must be side-effect-free and repeatable: candidates are
//! built, cost-compared and discarded, and only the winning candidate is
//! committed to a selector.

mod filter;
mod plan;
mod traversal;

use std::rc::Rc;

pub use filter::{Filter, PathRestriction, PropertyRestriction};
pub use plan::{IndexPlan, OrderEntry, SelectorExecutionPlan};
pub use traversal::TraversingIndex;

use crate::store::RootState;

/// One access path candidate.
pub trait QueryIndex {
    fn index_name(&self) -> &str;

    /// A cheap lower bound on any cost this index can report. Candidates are
    /// cost-compared in ascending minimum-cost order so the selection loop
    /// can stop early.
    fn minimum_cost(&self) -> f64;

    /// The estimated cost of answering `filter` with this index.
    fn cost(&self, filter: &Filter, root: &dyn RootState) -> f64;

    /// Multi-plan proposals for the filter and an optional requested sort
    /// order (the advanced capability). Simple indexes return None.
    fn plans(
        &self,
        _filter: &Filter,
        _sort_order: Option<&[OrderEntry]>,
        _root: &dyn RootState,
    ) -> Option<Vec<IndexPlan>> {
        None
    }

    /// The candidate row paths for the filter under the chosen plan, in the
    /// index's scan order.
    fn query(&self, filter: &Filter, plan: Option<&IndexPlan>, root: &dyn RootState)
        -> Vec<String>;
}

/// Supplies the candidate indexes for a snapshot.
pub trait IndexProvider {
    fn query_indexes(&self, root: &dyn RootState) -> Vec<Rc<dyn QueryIndex>>;
}

/// A fixed set of indexes, independent of the snapshot.
#[derive(Default)]
pub struct StaticIndexProvider {
    indexes: Vec<Rc<dyn QueryIndex>>,
}

impl StaticIndexProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: Rc<dyn QueryIndex>) -> Self {
        self.indexes.push(index);
        self
    }
}

impl IndexProvider for StaticIndexProvider {
    fn query_indexes(&self, _root: &dyn RootState) -> Vec<Rc<dyn QueryIndex>> {
        self.indexes.clone()
    }
}
