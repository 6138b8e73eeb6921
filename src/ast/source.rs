//! Source nodes: the from-clause tree.
//!
//! A source is a single selector or a join of two sources. The join tree is
//! rebuilt during prepare: candidate trees are freshly constructed values and
//! only the winning candidate replaces the committed tree.

use std::collections::HashSet;
use std::fmt;

use super::operand::{EvalContext, SelectorId, SelectorRef};
use crate::store::parent_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner join",
            JoinType::LeftOuter => "left outer join",
        }
    }
}

/// A join condition between two selectors.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// left.[left_property] = right.[right_property]
    Equi {
        left: SelectorRef,
        left_property: String,
        right: SelectorRef,
        right_property: String,
    },
    /// Both selectors positioned on the same node.
    SameNode { left: SelectorRef, right: SelectorRef },
    /// The child selector's node is a direct child of the parent selector's.
    ChildNode { child: SelectorRef, parent: SelectorRef },
    /// The descendant selector's node is below the ancestor selector's.
    DescendantNode {
        descendant: SelectorRef,
        ancestor: SelectorRef,
    },
}

impl JoinCondition {
    pub(crate) fn selector_refs(&self) -> [&SelectorRef; 2] {
        match self {
            JoinCondition::Equi { left, right, .. }
            | JoinCondition::SameNode { left, right } => [left, right],
            JoinCondition::ChildNode { child, parent } => [child, parent],
            JoinCondition::DescendantNode {
                descendant,
                ancestor,
            } => [descendant, ancestor],
        }
    }

    /// True when every selector this condition references is in the set.
    pub fn can_evaluate(&self, selectors: &HashSet<SelectorId>) -> bool {
        self.selector_refs()
            .iter()
            .all(|r| r.resolved().map(|id| selectors.contains(&id)).unwrap_or(false))
    }

    pub fn evaluate(&self, ctx: &dyn EvalContext) -> bool {
        let tree = |r: &SelectorRef| r.resolved().and_then(|id| ctx.current_tree(id));
        match self {
            JoinCondition::Equi {
                left,
                left_property,
                right,
                right_property,
            } => match (tree(left), tree(right)) {
                (Some(l), Some(r)) => {
                    match (l.property(left_property), r.property(right_property)) {
                        (Some(lv), Some(rv)) => lv == rv,
                        _ => false,
                    }
                }
                _ => false,
            },
            JoinCondition::SameNode { left, right } => match (tree(left), tree(right)) {
                (Some(l), Some(r)) => l.path == r.path,
                _ => false,
            },
            JoinCondition::ChildNode { child, parent } => match (tree(child), tree(parent)) {
                (Some(c), Some(p)) => parent_path(&c.path) == Some(p.path.as_str()),
                _ => false,
            },
            JoinCondition::DescendantNode {
                descendant,
                ancestor,
            } => match (tree(descendant), tree(ancestor)) {
                (Some(d), Some(a)) => crate::store::is_descendant(&d.path, &a.path),
                _ => false,
            },
        }
    }

    pub fn for_each_selector_ref_mut(&mut self, f: &mut dyn FnMut(&mut SelectorRef)) {
        match self {
            JoinCondition::Equi { left, right, .. }
            | JoinCondition::SameNode { left, right } => {
                f(left);
                f(right);
            }
            JoinCondition::ChildNode { child, parent } => {
                f(child);
                f(parent);
            }
            JoinCondition::DescendantNode {
                descendant,
                ancestor,
            } => {
                f(descendant);
                f(ancestor);
            }
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinCondition::Equi {
                left,
                left_property,
                right,
                right_property,
            } => write!(
                f,
                "{}.[{}] = {}.[{}]",
                left, left_property, right, right_property
            ),
            JoinCondition::SameNode { left, right } => {
                write!(f, "issamenode({}, {})", left, right)
            }
            JoinCondition::ChildNode { child, parent } => {
                write!(f, "ischildnode({}, {})", child, parent)
            }
            JoinCondition::DescendantNode {
                descendant,
                ancestor,
            } => write!(f, "isdescendantnode({}, {})", descendant, ancestor),
        }
    }
}

/// The from-clause tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Selector(SelectorRef),
    Join(Box<Join>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Source,
    pub right: Source,
    pub join_type: JoinType,
    pub condition: JoinCondition,
}

impl Source {
    pub fn selector(name: impl Into<String>) -> Self {
        Source::Selector(SelectorRef::new(name))
    }

    pub fn join(left: Source, right: Source, join_type: JoinType, condition: JoinCondition) -> Self {
        Source::Join(Box::new(Join {
            left,
            right,
            join_type,
            condition,
        }))
    }

    /// The flattened leaf-selector list, in declaration order.
    pub fn inner_join_selectors(&self) -> Vec<&SelectorRef> {
        let mut leaves = Vec::new();
        self.collect_selectors(&mut leaves);
        leaves
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a SelectorRef>) {
        match self {
            Source::Selector(leaf) => out.push(leaf),
            Source::Join(join) => {
                join.left.collect_selectors(out);
                join.right.collect_selectors(out);
            }
        }
    }

    /// All join conditions, in declaration order.
    pub fn inner_join_conditions(&self) -> Vec<&JoinCondition> {
        let mut conditions = Vec::new();
        self.collect_conditions(&mut conditions);
        conditions
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a JoinCondition>) {
        if let Source::Join(join) = self {
            join.left.collect_conditions(out);
            join.right.collect_conditions(out);
            out.push(&join.condition);
        }
    }

    pub fn for_each_selector_ref_mut(&mut self, f: &mut dyn FnMut(&mut SelectorRef)) {
        match self {
            Source::Selector(leaf) => f(leaf),
            Source::Join(join) => {
                join.left.for_each_selector_ref_mut(f);
                join.right.for_each_selector_ref_mut(f);
                join.condition.for_each_selector_ref_mut(f);
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Selector(leaf) => write!(f, "[{}]", leaf.name),
            Source::Join(join) => write!(
                f,
                "{} {} {} on {}",
                join.left,
                join.join_type.as_str(),
                join.right,
                join.condition
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::operand::SelectorId;
    use crate::store::NodeTree;
    use serde_json::{json, Value};

    fn bound(name: &str, id: usize) -> SelectorRef {
        SelectorRef {
            name: name.into(),
            id: Some(SelectorId(id)),
        }
    }

    fn equi(l: SelectorRef, lp: &str, r: SelectorRef, rp: &str) -> JoinCondition {
        JoinCondition::Equi {
            left: l,
            left_property: lp.into(),
            right: r,
            right_property: rp.into(),
        }
    }

    struct PairContext {
        trees: Vec<Option<NodeTree>>,
    }

    impl EvalContext for PairContext {
        fn current_tree(&self, selector: SelectorId) -> Option<&NodeTree> {
            self.trees.get(selector.0).and_then(|t| t.as_ref())
        }
        fn bind_value(&self, _name: &str) -> Option<&Value> {
            None
        }
        fn sorted_property(&self, _selector: SelectorId) -> Option<&str> {
            None
        }
    }

    fn tree(path: &str, props: Value) -> Option<NodeTree> {
        Some(NodeTree::new(path, props.as_object().unwrap().clone()))
    }

    #[test]
    fn test_flatten_selectors_and_conditions() {
        let c1 = equi(bound("a", 0), "x", bound("b", 1), "x");
        let c2 = equi(bound("b", 1), "y", bound("c", 2), "y");
        let source = Source::join(
            Source::join(
                Source::selector("a"),
                Source::selector("b"),
                JoinType::Inner,
                c1.clone(),
            ),
            Source::selector("c"),
            JoinType::Inner,
            c2.clone(),
        );
        let names: Vec<&str> = source
            .inner_join_selectors()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(source.inner_join_conditions(), vec![&c1, &c2]);
    }

    #[test]
    fn test_can_evaluate() {
        let cond = equi(bound("a", 0), "x", bound("b", 1), "x");
        let mut set = HashSet::from([SelectorId(0)]);
        assert!(!cond.can_evaluate(&set));
        set.insert(SelectorId(1));
        assert!(cond.can_evaluate(&set));
    }

    #[test]
    fn test_equi_join_evaluation() {
        let cond = equi(bound("a", 0), "ref", bound("b", 1), "id");
        let ctx = PairContext {
            trees: vec![tree("/a", json!({"ref": "n1"})), tree("/b", json!({"id": "n1"}))],
        };
        assert!(cond.evaluate(&ctx));

        let ctx = PairContext {
            trees: vec![tree("/a", json!({"ref": "n1"})), tree("/b", json!({"id": "n2"}))],
        };
        assert!(!cond.evaluate(&ctx));
    }

    #[test]
    fn test_structural_join_conditions() {
        let ctx = PairContext {
            trees: vec![tree("/docs/a", json!({})), tree("/docs", json!({}))],
        };
        assert!(JoinCondition::ChildNode {
            child: bound("a", 0),
            parent: bound("b", 1),
        }
        .evaluate(&ctx));
        assert!(JoinCondition::DescendantNode {
            descendant: bound("a", 0),
            ancestor: bound("b", 1),
        }
        .evaluate(&ctx));
        assert!(!JoinCondition::SameNode {
            left: bound("a", 0),
            right: bound("b", 1),
        }
        .evaluate(&ctx));
    }

    #[test]
    fn test_display() {
        let source = Source::join(
            Source::selector("a"),
            Source::selector("b"),
            JoinType::Inner,
            equi(SelectorRef::new("a"), "x", SelectorRef::new("b"), "y"),
        );
        assert_eq!(
            source.to_string(),
            "[a] inner join [b] on a.[x] = b.[y]"
        );
    }
}
