//! Cost descriptors exchanged with index providers.

use std::fmt;
use std::rc::Rc;

use super::filter::Filter;
use super::QueryIndex;
use crate::ast::{Order, SelectorId};

/// One entry of an index's native sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEntry {
    pub property_name: String,
    pub order: Order,
}

impl OrderEntry {
    pub fn ascending(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            order: Order::Ascending,
        }
    }

    pub fn descending(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            order: Order::Descending,
        }
    }
}

/// A cost/shape proposal from an advanced index for one filter.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub estimated_entry_count: u64,
    pub cost_per_execution: f64,
    pub cost_per_entry: f64,
    /// The order the plan delivers rows in, if any. An exact structural match
    /// with the query's ORDER BY lets the engine skip in-memory sorting.
    pub sort_order: Option<Vec<OrderEntry>>,
    pub plan_name: Option<String>,
}

impl IndexPlan {
    /// Plan cost for an effective row cap: fixed per-execution cost plus
    /// per-entry cost over the rows the execution can actually touch.
    pub fn cost(&self, row_cap: u64) -> f64 {
        let entries = self.estimated_entry_count.min(row_cap);
        self.cost_per_execution + entries as f64 * self.cost_per_entry
    }
}

/// The access path committed to one selector at prepare time.
#[derive(Clone)]
pub struct SelectorExecutionPlan {
    pub selector: SelectorId,
    pub index: Rc<dyn QueryIndex>,
    /// The chosen sub-plan for advanced indexes; None for simple indexes and
    /// the traversal fallback.
    pub index_plan: Option<IndexPlan>,
    pub estimated_cost: f64,
    /// Index name, with the chosen plan name appended for diagnostics.
    pub plan_name: String,
    /// The per-selector filter the plan was costed against; reused when the
    /// scan is executed.
    pub filter: Filter,
}

impl SelectorExecutionPlan {
    /// The property the chosen plan scans in ascending order first, if any.
    /// Drives the upper-bound stop signal during constraint evaluation.
    pub fn sorted_property(&self) -> Option<&str> {
        let order = self.index_plan.as_ref()?.sort_order.as_ref()?;
        match order.first() {
            Some(entry) if entry.order == Order::Ascending => Some(&entry.property_name),
            _ => None,
        }
    }
}

impl fmt::Debug for SelectorExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorExecutionPlan")
            .field("selector", &self.selector)
            .field("plan_name", &self.plan_name)
            .field("estimated_cost", &self.estimated_cost)
            .field("index_plan", &self.index_plan)
            .finish()
    }
}
