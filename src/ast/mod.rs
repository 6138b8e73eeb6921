//! The query AST consumed from the parser layer.
//!
//! Nodes are tagged unions per category (operand, constraint, source, join
//! condition) rather than one type per node kind. Binding is a recursive
//! traversal that annotates selector references with dense [`SelectorId`]
//! handles; nodes never hold a back-reference to the owning query — the
//! evaluation context is passed explicitly wherever node values are needed.

mod column;
mod constraint;
mod operand;
mod source;

pub use column::{Column, Order, OrderSpec, SCORE_PROPERTY};
pub use constraint::{CompareOp, Constraint};
pub use operand::{
    value_cmp, DynamicOperand, EvalContext, SelectorId, SelectorRef, StaticOperand,
};
pub use source::{JoinCondition, JoinType, Source};
