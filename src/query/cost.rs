//! Cost-based index selection for one selector.

use std::rc::Rc;

use crate::errors::{QueryError, QueryResult};
use crate::index::{
    Filter, IndexPlan, OrderEntry, QueryIndex, SelectorExecutionPlan, TraversingIndex,
};
use crate::observability::{Logger, Severity};
use crate::store::RootState;

/// Addition that clamps at the numeric range instead of wrapping.
pub fn saturated_add(a: i64, b: i64) -> i64 {
    a.saturating_add(b)
}

/// The number of rows an execution can actually deliver: offset plus limit,
/// clamped. Unbounded when the sum saturates.
pub fn effective_row_cap(limit: i64, offset: i64) -> u64 {
    let cap = saturated_add(limit, offset);
    if cap < 0 {
        0
    } else {
        cap as u64
    }
}

struct Candidate {
    index: Rc<dyn QueryIndex>,
    index_plan: Option<IndexPlan>,
    cost: f64,
    plan_name: String,
}

/// Picks the cheapest access path for one selector.
///
/// Candidates are compared in ascending minimum-cost order; once the running
/// best is below the next candidate's minimum cost the loop stops, since no
/// later candidate can report less than its own minimum. The traversal
/// fallback is compared last and adopted when it is cheaper or when no index
/// produced a finite cost.
pub fn best_selector_execution_plan(
    filter: Filter,
    sort_order: Option<&[OrderEntry]>,
    indexes: &[Rc<dyn QueryIndex>],
    root: &dyn RootState,
    traversal_enabled: bool,
    row_cap: u64,
    internal: bool,
) -> QueryResult<SelectorExecutionPlan> {
    let cost_severity = if internal {
        Severity::Trace
    } else {
        Severity::Debug
    };

    let mut sorted: Vec<&Rc<dyn QueryIndex>> = indexes.iter().collect();
    sorted.sort_by(|a, b| {
        a.minimum_cost()
            .partial_cmp(&b.minimum_cost())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut best: Option<Candidate> = None;
    for index in sorted {
        if let Some(current) = &best {
            if index.minimum_cost() >= current.cost {
                break;
            }
        }
        let candidate = match index.plans(&filter, sort_order, root) {
            Some(plans) => cheapest_plan(index, plans, row_cap),
            None => Some(Candidate {
                index: Rc::clone(index),
                index_plan: None,
                cost: index.cost(&filter, root),
                plan_name: index.index_name().to_string(),
            }),
        };
        let Some(candidate) = candidate else {
            continue;
        };
        if candidate.cost < 0.0 {
            Logger::error(
                "INDEX_COST_NEGATIVE",
                &[
                    ("index", index.index_name()),
                    ("cost", &candidate.cost.to_string()),
                ],
            );
        }
        Logger::log(
            cost_severity,
            "INDEX_COST",
            &[
                ("index", &candidate.plan_name),
                ("cost", &candidate.cost.to_string()),
            ],
        );
        let better = best
            .as_ref()
            .map(|current| candidate.cost < current.cost)
            .unwrap_or(true);
        if better {
            best = Some(candidate);
        }
    }

    if traversal_enabled {
        let traversal: Rc<dyn QueryIndex> = Rc::new(TraversingIndex::new());
        let cost = traversal.cost(&filter, root);
        Logger::log(
            cost_severity,
            "INDEX_COST",
            &[
                ("index", traversal.index_name()),
                ("cost", &cost.to_string()),
            ],
        );
        let adopt = match &best {
            None => true,
            Some(current) => cost < current.cost || current.cost.is_infinite(),
        };
        if adopt {
            let plan_name = traversal.index_name().to_string();
            best = Some(Candidate {
                index: traversal,
                index_plan: None,
                cost,
                plan_name,
            });
        }
    }

    let best = best.ok_or_else(|| QueryError::NoIndexAvailable(filter.selector_name.clone()))?;
    Ok(SelectorExecutionPlan {
        selector: filter.selector,
        index: best.index,
        index_plan: best.index_plan,
        estimated_cost: best.cost,
        plan_name: best.plan_name,
        filter,
    })
}

/// The cheapest of an advanced index's proposals, or None when the index
/// proposed nothing for this filter.
fn cheapest_plan(
    index: &Rc<dyn QueryIndex>,
    plans: Vec<IndexPlan>,
    row_cap: u64,
) -> Option<Candidate> {
    let mut best: Option<(f64, IndexPlan)> = None;
    for plan in plans {
        let cost = plan.cost(row_cap);
        let better = best.as_ref().map(|(c, _)| cost < *c).unwrap_or(true);
        if better {
            best = Some((cost, plan));
        }
    }
    let (cost, plan) = best?;
    let plan_name = match &plan.plan_name {
        Some(name) => format!("{}[{}]", index.index_name(), name),
        None => index.index_name().to_string(),
    };
    Some(Candidate {
        index: Rc::clone(index),
        index_plan: Some(plan),
        cost,
        plan_name,
    })
}
