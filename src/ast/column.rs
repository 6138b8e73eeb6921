//! Projection columns and ordering specifications.

use std::fmt;

use serde_json::Value;

use super::operand::{DynamicOperand, EvalContext, SelectorRef};

/// The reserved score pseudo-column property. Score columns never count
/// toward DISTINCT de-duplication.
pub const SCORE_PROPERTY: &str = "score";

/// One projected column: a property of a selector, exposed under a column
/// name.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub selector: SelectorRef,
    pub property_name: String,
    pub column_name: String,
}

impl Column {
    pub fn new(
        selector_name: impl Into<String>,
        property_name: impl Into<String>,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            selector: SelectorRef::new(selector_name),
            property_name: property_name.into(),
            column_name: column_name.into(),
        }
    }

    pub fn current_value(&self, ctx: &dyn EvalContext) -> Value {
        let Some(id) = self.selector.resolved() else {
            return Value::Null;
        };
        ctx.current_tree(id)
            .and_then(|tree| tree.property(&self.property_name).cloned())
            .unwrap_or(Value::Null)
    }

    /// All columns count toward DISTINCT except the score pseudo-column.
    pub fn counts_for_distinct(&self) -> bool {
        self.property_name != SCORE_PROPERTY
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.[{}] as [{}]",
            self.selector, self.property_name, self.column_name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub operand: DynamicOperand,
    pub order: Order,
}

impl OrderSpec {
    pub fn ascending(operand: DynamicOperand) -> Self {
        Self {
            operand,
            order: Order::Ascending,
        }
    }

    pub fn descending(operand: DynamicOperand) -> Self {
        Self {
            operand,
            order: Order::Descending,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.order == Order::Descending
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            Order::Ascending => write!(f, "{}", self.operand),
            Order::Descending => write!(f, "{} desc", self.operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::operand::SelectorId;
    use crate::store::NodeTree;
    use serde_json::json;

    struct OneTree(NodeTree);

    impl EvalContext for OneTree {
        fn current_tree(&self, _selector: SelectorId) -> Option<&NodeTree> {
            Some(&self.0)
        }
        fn bind_value(&self, _name: &str) -> Option<&Value> {
            None
        }
        fn sorted_property(&self, _selector: SelectorId) -> Option<&str> {
            None
        }
    }

    #[test]
    fn test_column_value_and_distinct() {
        let mut column = Column::new("a", "title", "title");
        column.selector.id = Some(SelectorId(0));
        let ctx = OneTree(NodeTree::new(
            "/a",
            json!({"title": "x"}).as_object().unwrap().clone(),
        ));
        assert_eq!(column.current_value(&ctx), json!("x"));
        assert!(column.counts_for_distinct());

        let score = Column::new("a", SCORE_PROPERTY, "score");
        assert!(!score.counts_for_distinct());
    }

    #[test]
    fn test_missing_property_is_null() {
        let mut column = Column::new("a", "nope", "nope");
        column.selector.id = Some(SelectorId(0));
        let ctx = OneTree(NodeTree::new("/a", serde_json::Map::new()));
        assert_eq!(column.current_value(&ctx), Value::Null);
    }

    #[test]
    fn test_order_spec_display() {
        let spec = OrderSpec::descending(DynamicOperand::PropertyValue(
            SelectorRef::new("a"),
            "x".into(),
        ));
        assert_eq!(spec.to_string(), "a.[x] desc");
    }
}
