//! Traversal fallback: a full scan of the snapshot, narrowed only by the
//! filter's path restriction. Always available, usually the most expensive
//! option, and the reason every query can run without any index at all.

use super::filter::Filter;
use super::plan::IndexPlan;
use super::QueryIndex;
use crate::store::{is_hidden_path, RootState};

pub const TRAVERSAL_INDEX_NAME: &str = "traverse";

/// Per-node cost charged by the traversal estimate. Kept above typical
/// per-entry index costs so any usable index beats a scan of the same size.
const COST_PER_NODE: f64 = 1.0;

#[derive(Debug, Default)]
pub struct TraversingIndex;

impl TraversingIndex {
    pub fn new() -> Self {
        Self
    }

    fn matching_paths(&self, filter: &Filter, root: &dyn RootState) -> Vec<String> {
        root.all_paths()
            .into_iter()
            .filter(|path| !is_hidden_path(path))
            .filter(|path| filter.path_restriction.matches(path))
            .collect()
    }
}

impl QueryIndex for TraversingIndex {
    fn index_name(&self) -> &str {
        TRAVERSAL_INDEX_NAME
    }

    fn minimum_cost(&self) -> f64 {
        0.0
    }

    fn cost(&self, filter: &Filter, root: &dyn RootState) -> f64 {
        self.matching_paths(filter, root).len() as f64 * COST_PER_NODE
    }

    fn query(
        &self,
        filter: &Filter,
        _plan: Option<&IndexPlan>,
        root: &dyn RootState,
    ) -> Vec<String> {
        self.matching_paths(filter, root)
    }
}
