//! Operand nodes: the value-producing leaves of constraints, projections and
//! orderings.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::store::NodeTree;

/// A selector's dense position in the query's selector list, assigned during
/// `init()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorId(pub usize);

/// A by-name selector reference, resolved to a [`SelectorId`] during binding.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorRef {
    pub name: String,
    pub id: Option<SelectorId>,
}

impl SelectorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    /// The resolved id; None before `init()` has bound this reference.
    pub fn resolved(&self) -> Option<SelectorId> {
        self.id
    }
}

impl fmt::Display for SelectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What evaluation needs from the running query: the current cursor position
/// of every selector, bound variable values, and the property (if any) the
/// selector's chosen index scans in ascending order.
pub trait EvalContext {
    fn current_tree(&self, selector: SelectorId) -> Option<&NodeTree>;
    fn bind_value(&self, name: &str) -> Option<&Value>;
    fn sorted_property(&self, selector: SelectorId) -> Option<&str>;
}

/// An operand whose value depends on the current cursor position.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicOperand {
    /// The value of a property on a selector.
    PropertyValue(SelectorRef, String),
    /// The full-text score pseudo-property (supplied by external indexes).
    Score(SelectorRef),
    /// Length of the nested operand's value.
    Length(Box<DynamicOperand>),
    LowerCase(Box<DynamicOperand>),
    UpperCase(Box<DynamicOperand>),
    /// The node name of the selector's current tree.
    NodeName(SelectorRef),
    /// The node name with any namespace prefix stripped.
    NodeLocalName(SelectorRef),
}

impl DynamicOperand {
    /// The current value, or None when the operand cannot be resolved at the
    /// current cursor position. A missing value never matches anything.
    pub fn value(&self, ctx: &dyn EvalContext) -> Option<Value> {
        match self {
            DynamicOperand::PropertyValue(selector, property) => {
                let tree = ctx.current_tree(selector.resolved()?)?;
                tree.property(property).cloned()
            }
            DynamicOperand::Score(_) => None,
            DynamicOperand::Length(inner) => {
                let length = match inner.value(ctx)? {
                    Value::String(s) => s.chars().count() as u64,
                    Value::Array(a) => a.len() as u64,
                    other => other.to_string().len() as u64,
                };
                Some(Value::from(length))
            }
            DynamicOperand::LowerCase(inner) => match inner.value(ctx)? {
                Value::String(s) => Some(Value::String(s.to_lowercase())),
                _ => None,
            },
            DynamicOperand::UpperCase(inner) => match inner.value(ctx)? {
                Value::String(s) => Some(Value::String(s.to_uppercase())),
                _ => None,
            },
            DynamicOperand::NodeName(selector) => {
                let tree = ctx.current_tree(selector.resolved()?)?;
                Some(Value::String(tree.name().to_string()))
            }
            DynamicOperand::NodeLocalName(selector) => {
                let tree = ctx.current_tree(selector.resolved()?)?;
                Some(Value::String(tree.local_name().to_string()))
            }
        }
    }

    /// Some((selector, property)) for a plain property-value operand. Only
    /// plain property values can be pushed down to indexes as sort order.
    pub fn as_property(&self) -> Option<(&SelectorRef, &str)> {
        match self {
            DynamicOperand::PropertyValue(selector, property) => Some((selector, property)),
            _ => None,
        }
    }

    /// The property name, when this is a plain property read on `selector`.
    /// Only such reads can be pushed down to an index.
    pub fn pushable_property(&self, selector: SelectorId) -> Option<&str> {
        match self.as_property() {
            Some((sel, property)) if sel.resolved() == Some(selector) => Some(property),
            _ => None,
        }
    }

    /// The selector the operand reads from, however deeply it is wrapped.
    pub fn selector(&self) -> &SelectorRef {
        match self {
            DynamicOperand::PropertyValue(selector, _)
            | DynamicOperand::Score(selector)
            | DynamicOperand::NodeName(selector)
            | DynamicOperand::NodeLocalName(selector) => selector,
            DynamicOperand::Length(inner)
            | DynamicOperand::LowerCase(inner)
            | DynamicOperand::UpperCase(inner) => inner.selector(),
        }
    }

    pub fn for_each_selector_ref_mut(&mut self, f: &mut dyn FnMut(&mut SelectorRef)) {
        match self {
            DynamicOperand::PropertyValue(selector, _)
            | DynamicOperand::Score(selector)
            | DynamicOperand::NodeName(selector)
            | DynamicOperand::NodeLocalName(selector) => f(selector),
            DynamicOperand::Length(inner)
            | DynamicOperand::LowerCase(inner)
            | DynamicOperand::UpperCase(inner) => inner.for_each_selector_ref_mut(f),
        }
    }
}

impl fmt::Display for DynamicOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicOperand::PropertyValue(selector, property) => {
                write!(f, "{}.[{}]", selector, property)
            }
            DynamicOperand::Score(selector) => write!(f, "score({})", selector),
            DynamicOperand::Length(inner) => write!(f, "length({})", inner),
            DynamicOperand::LowerCase(inner) => write!(f, "lower({})", inner),
            DynamicOperand::UpperCase(inner) => write!(f, "upper({})", inner),
            DynamicOperand::NodeName(selector) => write!(f, "name({})", selector),
            DynamicOperand::NodeLocalName(selector) => write!(f, "localname({})", selector),
        }
    }
}

/// An operand whose value is fixed for the whole execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticOperand {
    Literal(Value),
    BindVariable(String),
}

impl StaticOperand {
    pub fn value(&self, ctx: &dyn EvalContext) -> Option<Value> {
        match self {
            StaticOperand::Literal(value) => Some(value.clone()),
            StaticOperand::BindVariable(name) => ctx.bind_value(name).cloned(),
        }
    }

    pub fn for_each_bind_variable(&self, f: &mut dyn FnMut(&str)) {
        if let StaticOperand::BindVariable(name) = self {
            f(name);
        }
    }
}

impl fmt::Display for StaticOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticOperand::Literal(Value::String(s)) => {
                write!(f, "'{}'", s.replace('\'', "''"))
            }
            StaticOperand::Literal(value) => write!(f, "{}", value),
            StaticOperand::BindVariable(name) => write!(f, "${}", name),
        }
    }
}

/// Total order over JSON values used by comparisons and row sorting:
/// null < bool < number < string < array < object, natural order within a
/// type. Numbers compare as f64, so 1 and 1.0 are equal.
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    fn type_order(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    let (ta, tb) = (type_order(a), type_order(b));
    if ta != tb {
        return ta.cmp(&tb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let xf = x.as_f64().unwrap_or(0.0);
            let yf = y.as_f64().unwrap_or(0.0);
            xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
