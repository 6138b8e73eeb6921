//! Greedy join ordering.
//!
//! For a join over N selectors the planner builds a left-deep tree: it starts
//! from the cheapest selector and each round adds the cheapest remaining
//! selector that some declared join condition connects to the tree built so
//! far. The candidate's condition is the first one in declaration order that
//! was not evaluable over the already-joined selectors but becomes evaluable
//! once the candidate is added; this first-fit tie-break is deliberate and
//! kept stable. Candidates are fresh immutable values each round, so a losing
//! candidate leaves no state behind.

use std::collections::HashSet;

use crate::ast::{JoinCondition, JoinType, SelectorId, SelectorRef, Source};
use crate::errors::{QueryError, QueryResult};
use crate::index::SelectorExecutionPlan;

/// Reorders an inner-join tree by cost. Returns the rebuilt source and the
/// accumulated estimated cost of the committed join order.
///
/// Trees containing outer joins, or join graphs with more conditions than a
/// spanning tree needs, keep their declaration order; reordering either would
/// drop or reassociate conditions the declared tree relies on.
pub fn order_joins(
    source: &Source,
    plans: &[SelectorExecutionPlan],
) -> QueryResult<(Source, f64)> {
    let leaves: Vec<SelectorRef> = source
        .inner_join_selectors()
        .into_iter()
        .cloned()
        .collect();
    let total_cost = |ids: &[SelectorRef]| {
        ids.iter()
            .filter_map(|r| r.resolved())
            .map(|id| plans[id.0].estimated_cost)
            .sum::<f64>()
    };
    if leaves.len() < 2 {
        return Ok((source.clone(), total_cost(&leaves)));
    }
    let conditions: Vec<JoinCondition> = source
        .inner_join_conditions()
        .into_iter()
        .cloned()
        .collect();
    if has_outer_join(source) || conditions.len() != leaves.len() - 1 {
        verify_connected(&leaves, &conditions)?;
        return Ok((source.clone(), total_cost(&leaves)));
    }

    let cost_of = |r: &SelectorRef| {
        r.resolved()
            .map(|id| plans[id.0].estimated_cost)
            .unwrap_or(f64::INFINITY)
    };

    let mut remaining: Vec<SelectorRef> = leaves;
    let mut used = vec![false; conditions.len()];
    let mut joined: HashSet<SelectorId> = HashSet::new();

    // Seed with the cheapest selector.
    let seed = cheapest(&remaining, &cost_of);
    let first = remaining.remove(seed);
    if let Some(id) = first.resolved() {
        joined.insert(id);
    }
    let mut cost = cost_of(&first);
    let mut tree = Source::Selector(first);

    while !remaining.is_empty() {
        let mut best: Option<(usize, usize)> = None;
        for (ci, candidate) in remaining.iter().enumerate() {
            let Some(id) = candidate.resolved() else {
                continue;
            };
            let mut extended = joined.clone();
            extended.insert(id);
            let newly_evaluable = conditions.iter().enumerate().position(|(i, c)| {
                !used[i] && !c.can_evaluate(&joined) && c.can_evaluate(&extended)
            });
            let Some(condition_index) = newly_evaluable else {
                continue;
            };
            let better = best
                .map(|(prev, _)| cost_of(candidate) < cost_of(&remaining[prev]))
                .unwrap_or(true);
            if better {
                best = Some((ci, condition_index));
            }
        }
        let Some((ci, condition_index)) = best else {
            return Err(QueryError::DisconnectedJoin(remaining[0].name.clone()));
        };
        let candidate = remaining.remove(ci);
        used[condition_index] = true;
        if let Some(id) = candidate.resolved() {
            joined.insert(id);
        }
        cost += cost_of(&candidate);
        tree = Source::join(
            tree,
            Source::Selector(candidate),
            JoinType::Inner,
            conditions[condition_index].clone(),
        );
    }
    Ok((tree, cost))
}

fn cheapest(refs: &[SelectorRef], cost_of: &impl Fn(&SelectorRef) -> f64) -> usize {
    let mut best = 0;
    for i in 1..refs.len() {
        if cost_of(&refs[i]) < cost_of(&refs[best]) {
            best = i;
        }
    }
    best
}

fn has_outer_join(source: &Source) -> bool {
    match source {
        Source::Selector(_) => false,
        Source::Join(join) => {
            join.join_type == JoinType::LeftOuter
                || has_outer_join(&join.left)
                || has_outer_join(&join.right)
        }
    }
}

/// Flood-fill over the condition graph; every selector must be reachable from
/// the first one.
fn verify_connected(leaves: &[SelectorRef], conditions: &[JoinCondition]) -> QueryResult<()> {
    let mut reached: HashSet<SelectorId> = HashSet::new();
    if let Some(id) = leaves[0].resolved() {
        reached.insert(id);
    }
    loop {
        let before = reached.len();
        for condition in conditions {
            let ids: Vec<SelectorId> = condition
                .selector_refs()
                .iter()
                .filter_map(|r| r.resolved())
                .collect();
            if ids.iter().any(|id| reached.contains(id)) {
                reached.extend(ids);
            }
        }
        if reached.len() == before {
            break;
        }
    }
    for leaf in leaves {
        if let Some(id) = leaf.resolved() {
            if !reached.contains(&id) {
                return Err(QueryError::DisconnectedJoin(leaf.name.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SelectorId;
    use crate::index::{Filter, QueryIndex, TraversingIndex};
    use std::rc::Rc;

    fn bound(name: &str, id: usize) -> SelectorRef {
        let mut r = SelectorRef::new(name);
        r.id = Some(SelectorId(id));
        r
    }

    fn plan(id: usize, name: &str, cost: f64) -> SelectorExecutionPlan {
        let index: Rc<dyn QueryIndex> = Rc::new(TraversingIndex::new());
        SelectorExecutionPlan {
            selector: SelectorId(id),
            index,
            index_plan: None,
            estimated_cost: cost,
            plan_name: "traverse".into(),
            filter: Filter::for_selector(SelectorId(id), name),
        }
    }

    fn equi(l: &SelectorRef, lp: &str, r: &SelectorRef, rp: &str) -> JoinCondition {
        JoinCondition::Equi {
            left: l.clone(),
            left_property: lp.into(),
            right: r.clone(),
            right_property: rp.into(),
        }
    }

    fn selector_order(source: &Source) -> Vec<String> {
        source
            .inner_join_selectors()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    #[test]
    fn test_three_selector_greedy_order() {
        // Declared as (c join a) join b with conditions c-a and a-b; a is
        // cheapest, b next, c most expensive. Greedy order: a, b, c.
        let a = bound("a", 0);
        let b = bound("b", 1);
        let c = bound("c", 2);
        let source = Source::join(
            Source::join(
                Source::Selector(c.clone()),
                Source::Selector(a.clone()),
                JoinType::Inner,
                equi(&c, "ref", &a, "id"),
            ),
            Source::Selector(b.clone()),
            JoinType::Inner,
            equi(&a, "x", &b, "x"),
        );
        let plans = vec![plan(0, "a", 1.0), plan(1, "b", 5.0), plan(2, "c", 100.0)];
        let (ordered, cost) = order_joins(&source, &plans).unwrap();
        // c has a direct condition to a; b is cheaper, so b joins first.
        assert_eq!(selector_order(&ordered), vec!["a", "b", "c"]);
        assert_eq!(cost, 106.0);
    }

    #[test]
    fn test_condition_availability_constrains_order() {
        // Conditions connect a-c and c-b only. Even though b is cheaper than
        // c, b cannot join until c is in the tree.
        let a = bound("a", 0);
        let b = bound("b", 1);
        let c = bound("c", 2);
        let source = Source::join(
            Source::join(
                Source::Selector(a.clone()),
                Source::Selector(c.clone()),
                JoinType::Inner,
                equi(&a, "x", &c, "x"),
            ),
            Source::Selector(b.clone()),
            JoinType::Inner,
            equi(&c, "y", &b, "y"),
        );
        let plans = vec![plan(0, "a", 1.0), plan(1, "b", 2.0), plan(2, "c", 50.0)];
        let (ordered, _) = order_joins(&source, &plans).unwrap();
        assert_eq!(selector_order(&ordered), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_disconnected_graph_rejected() {
        // The only condition references a and b; c is unreachable.
        let a = bound("a", 0);
        let b = bound("b", 1);
        let c = bound("c", 2);
        let source = Source::join(
            Source::join(
                Source::Selector(a.clone()),
                Source::Selector(b.clone()),
                JoinType::Inner,
                equi(&a, "x", &b, "x"),
            ),
            Source::Selector(c.clone()),
            JoinType::Inner,
            equi(&a, "y", &b, "y"),
        );
        let plans = vec![plan(0, "a", 1.0), plan(1, "b", 2.0), plan(2, "c", 3.0)];
        let err = order_joins(&source, &plans).unwrap_err();
        assert_eq!(err, QueryError::DisconnectedJoin("c".into()));
    }

    #[test]
    fn test_outer_join_keeps_declared_order() {
        let a = bound("a", 0);
        let b = bound("b", 1);
        let source = Source::join(
            Source::Selector(a.clone()),
            Source::Selector(b.clone()),
            JoinType::LeftOuter,
            equi(&a, "x", &b, "x"),
        );
        let plans = vec![plan(0, "a", 100.0), plan(1, "b", 1.0)];
        let (ordered, cost) = order_joins(&source, &plans).unwrap();
        assert_eq!(selector_order(&ordered), vec!["a", "b"]);
        assert_eq!(cost, 101.0);
    }

    #[test]
    fn test_single_selector_untouched() {
        let source = Source::Selector(bound("a", 0));
        let plans = vec![plan(0, "a", 7.0)];
        let (ordered, cost) = order_joins(&source, &plans).unwrap();
        assert_eq!(selector_order(&ordered), vec!["a"]);
        assert_eq!(cost, 7.0);
    }
}
