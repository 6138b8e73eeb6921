//! Constraint nodes: the where-clause predicate tree.
//!
//! A constraint must be simplified (`simplify`) before it is bound or
//! evaluated. Evaluation is a boolean test against the current cursor
//! position of the bound selectors; `evaluate_stop` is the early-termination
//! signal for scans where no later row can match.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::operand::{value_cmp, DynamicOperand, EvalContext, SelectorRef, StaticOperand};
use crate::store::{is_descendant, parent_path};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn matches(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The where-clause predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Comparison {
        left: DynamicOperand,
        op: CompareOp,
        right: StaticOperand,
    },
    /// Full-text containment on one property, or on all properties when
    /// `property` is None.
    FullText {
        selector: SelectorRef,
        property: Option<String>,
        term: String,
    },
    PropertyExists {
        selector: SelectorRef,
        property: String,
    },
    PropertyNotExists {
        selector: SelectorRef,
        property: String,
    },
    SameNode {
        selector: SelectorRef,
        path: String,
    },
    ChildNode {
        selector: SelectorRef,
        path: String,
    },
    DescendantNode {
        selector: SelectorRef,
        path: String,
    },
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
    Not(Box<Constraint>),
}

impl Constraint {
    /// Algebraic simplification: flattens nested AND/OR, drops duplicate
    /// children, collapses single-child combinators and double negation.
    /// Must run before binding and evaluation.
    pub fn simplify(self) -> Constraint {
        match self {
            Constraint::And(children) => {
                Constraint::combine(children, true)
            }
            Constraint::Or(children) => {
                Constraint::combine(children, false)
            }
            Constraint::Not(inner) => match inner.simplify() {
                Constraint::Not(nested) => *nested,
                simplified => Constraint::Not(Box::new(simplified)),
            },
            leaf => leaf,
        }
    }

    fn combine(children: Vec<Constraint>, conjunction: bool) -> Constraint {
        let mut flat: Vec<Constraint> = Vec::with_capacity(children.len());
        for child in children {
            match (child.simplify(), conjunction) {
                (Constraint::And(nested), true) | (Constraint::Or(nested), false) => {
                    for c in nested {
                        if !flat.contains(&c) {
                            flat.push(c);
                        }
                    }
                }
                (c, _) => {
                    if !flat.contains(&c) {
                        flat.push(c);
                    }
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else if conjunction {
            Constraint::And(flat)
        } else {
            Constraint::Or(flat)
        }
    }

    /// The experimental extra pass: pushes NOT through AND/OR (De Morgan) and
    /// re-simplifies. Enabled per query via the engine settings.
    pub fn normalise(self) -> Constraint {
        fn push_not(c: Constraint, negated: bool) -> Constraint {
            match (c, negated) {
                (Constraint::Not(inner), negated) => push_not(*inner, !negated),
                (Constraint::And(children), false) => {
                    Constraint::And(children.into_iter().map(|c| push_not(c, false)).collect())
                }
                (Constraint::Or(children), false) => {
                    Constraint::Or(children.into_iter().map(|c| push_not(c, false)).collect())
                }
                (Constraint::And(children), true) => {
                    Constraint::Or(children.into_iter().map(|c| push_not(c, true)).collect())
                }
                (Constraint::Or(children), true) => {
                    Constraint::And(children.into_iter().map(|c| push_not(c, true)).collect())
                }
                (leaf, false) => leaf,
                (leaf, true) => Constraint::Not(Box::new(leaf)),
            }
        }
        push_not(self, false).simplify()
    }

    /// Boolean test at the current cursor position. A selector without a
    /// current tree, or a missing operand value, never matches.
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> bool {
        match self {
            Constraint::Comparison { left, op, right } => {
                match (left.value(ctx), right.value(ctx)) {
                    (Some(l), Some(r)) => op.matches(value_cmp(&l, &r)),
                    _ => false,
                }
            }
            Constraint::FullText {
                selector,
                property,
                term,
            } => {
                let Some(tree) = selector.resolved().and_then(|id| ctx.current_tree(id)) else {
                    return false;
                };
                let needle = term.to_lowercase();
                match property {
                    Some(p) => tree
                        .property(p)
                        .map(|v| value_contains(v, &needle))
                        .unwrap_or(false),
                    None => tree
                        .properties
                        .values()
                        .any(|v| value_contains(v, &needle)),
                }
            }
            Constraint::PropertyExists { selector, property } => selector
                .resolved()
                .and_then(|id| ctx.current_tree(id))
                .map(|tree| tree.property(property).is_some())
                .unwrap_or(false),
            Constraint::PropertyNotExists { selector, property } => selector
                .resolved()
                .and_then(|id| ctx.current_tree(id))
                .map(|tree| tree.property(property).is_none())
                .unwrap_or(false),
            Constraint::SameNode { selector, path } => {
                current_path(selector, ctx).map(|p| p == *path).unwrap_or(false)
            }
            Constraint::ChildNode { selector, path } => current_path(selector, ctx)
                .and_then(|p| parent_path(&p).map(|parent| parent == path))
                .unwrap_or(false),
            Constraint::DescendantNode { selector, path } => current_path(selector, ctx)
                .map(|p| is_descendant(&p, path))
                .unwrap_or(false),
            Constraint::And(children) => children.iter().all(|c| c.evaluate(ctx)),
            Constraint::Or(children) => children.iter().any(|c| c.evaluate(ctx)),
            Constraint::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// True when no later row of the current scan can match: an AND stops as
    /// soon as any child stops, an OR only once every child stops. The only
    /// stopping leaf is an upper-bound comparison over the property the
    /// selector's index scans in ascending order, once the cursor has moved
    /// past the bound.
    pub fn evaluate_stop(&self, ctx: &dyn EvalContext) -> bool {
        match self {
            Constraint::And(children) => children.iter().any(|c| c.evaluate_stop(ctx)),
            Constraint::Or(children) => {
                !children.is_empty() && children.iter().all(|c| c.evaluate_stop(ctx))
            }
            Constraint::Comparison { left, op, right } => {
                if !matches!(op, CompareOp::Lt | CompareOp::Le) {
                    return false;
                }
                let Some((selector, property)) = left.as_property() else {
                    return false;
                };
                let Some(id) = selector.resolved() else {
                    return false;
                };
                if ctx.sorted_property(id) != Some(property) {
                    return false;
                }
                match (left.value(ctx), right.value(ctx)) {
                    (Some(l), Some(r)) => match op {
                        CompareOp::Lt => value_cmp(&l, &r) != Ordering::Less,
                        CompareOp::Le => value_cmp(&l, &r) == Ordering::Greater,
                        _ => false,
                    },
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// A set of constraints whose disjunction is logically equivalent to this
    /// constraint. ORs split recursively; everything else is a singleton.
    pub fn simplify_for_union(&self) -> Vec<Constraint> {
        match self {
            Constraint::Or(children) => {
                let mut disjuncts: Vec<Constraint> = Vec::with_capacity(children.len());
                for child in children {
                    for d in child.simplify_for_union() {
                        if !disjuncts.contains(&d) {
                            disjuncts.push(d);
                        }
                    }
                }
                disjuncts
            }
            other => vec![other.clone()],
        }
    }

    pub fn for_each_selector_ref_mut(&mut self, f: &mut dyn FnMut(&mut SelectorRef)) {
        match self {
            Constraint::Comparison { left, .. } => left.for_each_selector_ref_mut(f),
            Constraint::FullText { selector, .. }
            | Constraint::PropertyExists { selector, .. }
            | Constraint::PropertyNotExists { selector, .. }
            | Constraint::SameNode { selector, .. }
            | Constraint::ChildNode { selector, .. }
            | Constraint::DescendantNode { selector, .. } => f(selector),
            Constraint::And(children) | Constraint::Or(children) => {
                for child in children {
                    child.for_each_selector_ref_mut(f);
                }
            }
            Constraint::Not(inner) => inner.for_each_selector_ref_mut(f),
        }
    }

    /// Rewrites every node-constraint path through `f`, failing fast on the
    /// first path the mapping rejects.
    pub fn map_paths(
        &mut self,
        f: &mut dyn FnMut(&str) -> crate::errors::QueryResult<String>,
    ) -> crate::errors::QueryResult<()> {
        match self {
            Constraint::SameNode { path, .. }
            | Constraint::ChildNode { path, .. }
            | Constraint::DescendantNode { path, .. } => {
                *path = f(path)?;
                Ok(())
            }
            Constraint::And(children) | Constraint::Or(children) => {
                for child in children {
                    child.map_paths(f)?;
                }
                Ok(())
            }
            Constraint::Not(inner) => inner.map_paths(f),
            _ => Ok(()),
        }
    }

    pub fn for_each_bind_variable(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Constraint::Comparison { right, .. } => right.for_each_bind_variable(f),
            Constraint::And(children) | Constraint::Or(children) => {
                for child in children {
                    child.for_each_bind_variable(f);
                }
            }
            Constraint::Not(inner) => inner.for_each_bind_variable(f),
            _ => {}
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Constraint::And(_) | Constraint::Or(_))
    }
}

fn current_path(selector: &SelectorRef, ctx: &dyn EvalContext) -> Option<String> {
    selector
        .resolved()
        .and_then(|id| ctx.current_tree(id))
        .map(|tree| tree.path.clone())
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        _ => false,
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Comparison { left, op, right } => {
                write!(f, "{} {} {}", left, op, right)
            }
            Constraint::FullText {
                selector,
                property,
                term,
            } => {
                let target = property.as_deref().unwrap_or("*");
                write!(f, "contains({}.{}, '{}')", selector, target, term)
            }
            Constraint::PropertyExists { selector, property } => {
                write!(f, "{}.[{}] is not null", selector, property)
            }
            Constraint::PropertyNotExists { selector, property } => {
                write!(f, "{}.[{}] is null", selector, property)
            }
            Constraint::SameNode { selector, path } => {
                write!(f, "issamenode({}, '{}')", selector, path)
            }
            Constraint::ChildNode { selector, path } => {
                write!(f, "ischildnode({}, '{}')", selector, path)
            }
            Constraint::DescendantNode { selector, path } => {
                write!(f, "isdescendantnode({}, '{}')", selector, path)
            }
            Constraint::And(children) => write_joined(f, children, " and "),
            Constraint::Or(children) => write_joined(f, children, " or "),
            Constraint::Not(inner) => {
                if inner.is_composite() {
                    write!(f, "not ({})", inner)
                } else {
                    write!(f, "not {}", inner)
                }
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Constraint], sep: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        if child.is_composite() {
            write!(f, "({})", child)?;
        } else {
            write!(f, "{}", child)?;
        }
    }
    Ok(())
}
