//! Per-selector filter handed to index implementations.
//!
//! A filter carries only the conditions that are provably required for one
//! selector on every matching row: restrictions gathered from the top-level
//! AND spine of the query constraint. Conditions under OR or NOT are not
//! representable here and are re-checked row by row during execution.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::ast::{CompareOp, Constraint, SelectorId, StaticOperand};

/// Restriction on the paths a selector can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum PathRestriction {
    NoRestriction,
    /// Exactly this path.
    Exact(String),
    /// Direct children of this path.
    Direct(String),
    /// The path itself and everything below it.
    AllDescendants(String),
}

impl PathRestriction {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathRestriction::NoRestriction => true,
            PathRestriction::Exact(p) => path == p,
            PathRestriction::Direct(p) => crate::store::parent_path(path)
                .map(|parent| parent == p.as_str())
                .unwrap_or(false),
            PathRestriction::AllDescendants(p) => {
                path == p || crate::store::is_descendant(path, p)
            }
        }
    }
}

/// A single provable condition on one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyRestriction {
    /// The property must be present.
    Exists,
    /// The property value must compare against a resolved constant.
    Compare { op: CompareOp, value: Value },
}

/// Everything an index gets to see about the query, scoped to one selector.
#[derive(Debug, Clone)]
pub struct Filter {
    pub selector: SelectorId,
    pub selector_name: String,
    pub path_restriction: PathRestriction,
    /// Property name to the restrictions that must all hold.
    pub property_restrictions: BTreeMap<String, Vec<PropertyRestriction>>,
    /// Full-text search term, when the constraint demands one for this selector.
    pub fulltext_term: Option<String>,
    /// Properties the query projects; an index may use these to serve the
    /// query from its own data without loading the node.
    pub projected_properties: Vec<String>,
}

impl Filter {
    pub fn for_selector(selector: SelectorId, selector_name: impl Into<String>) -> Self {
        Self {
            selector,
            selector_name: selector_name.into(),
            path_restriction: PathRestriction::NoRestriction,
            property_restrictions: BTreeMap::new(),
            fulltext_term: None,
            projected_properties: Vec::new(),
        }
    }

    /// Collects restrictions from the AND spine of `constraint`. Conditions
    /// that mention other selectors, sit under OR/NOT, or use operands an
    /// index cannot reason about are skipped; they still apply at row level.
    pub fn restrict_by(
        &mut self,
        constraint: &Constraint,
        binds: &BTreeMap<String, Option<Value>>,
    ) {
        match constraint {
            Constraint::And(children) => {
                for child in children {
                    self.restrict_by(child, binds);
                }
            }
            Constraint::Comparison { left, op, right } => {
                if let Some(property) = left.pushable_property(self.selector) {
                    if let Some(value) = resolve_static(right, binds) {
                        self.property_restrictions
                            .entry(property.to_string())
                            .or_default()
                            .push(PropertyRestriction::Compare { op: *op, value });
                    }
                }
            }
            Constraint::PropertyExists { selector, property } => {
                if selector.resolved() == Some(self.selector) {
                    self.property_restrictions
                        .entry(property.clone())
                        .or_default()
                        .push(PropertyRestriction::Exists);
                }
            }
            Constraint::FullText { selector, term, .. } => {
                if selector.resolved() == Some(self.selector) {
                    self.fulltext_term = Some(term.clone());
                }
            }
            Constraint::SameNode { selector, path } => {
                if selector.resolved() == Some(self.selector) {
                    self.path_restriction = PathRestriction::Exact(path.clone());
                }
            }
            Constraint::ChildNode { selector, path } => {
                if selector.resolved() == Some(self.selector) {
                    self.path_restriction = PathRestriction::Direct(path.clone());
                }
            }
            Constraint::DescendantNode { selector, path } => {
                if selector.resolved() == Some(self.selector) {
                    self.path_restriction = PathRestriction::AllDescendants(path.clone());
                }
            }
            _ => {}
        }
    }

    /// True when the filter carries no condition at all; the index has to
    /// assume every row may match.
    pub fn is_unrestricted(&self) -> bool {
        self.path_restriction == PathRestriction::NoRestriction
            && self.property_restrictions.is_empty()
            && self.fulltext_term.is_none()
    }
}

fn resolve_static(
    operand: &StaticOperand,
    binds: &BTreeMap<String, Option<Value>>,
) -> Option<Value> {
    match operand {
        StaticOperand::Literal(value) => Some(value.clone()),
        StaticOperand::BindVariable(name) => binds.get(name).cloned().flatten(),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter(selector=[{}]", self.selector_name)?;
        match &self.path_restriction {
            PathRestriction::NoRestriction => {}
            PathRestriction::Exact(p) => write!(f, ", path={}", p)?,
            PathRestriction::Direct(p) => write!(f, ", path={}/*", p)?,
            PathRestriction::AllDescendants(p) => write!(f, ", path={}//*", p)?,
        }
        for (property, restrictions) in &self.property_restrictions {
            for restriction in restrictions {
                match restriction {
                    PropertyRestriction::Exists => {
                        write!(f, ", [{}] is not null", property)?
                    }
                    PropertyRestriction::Compare { op, value } => {
                        write!(f, ", [{}] {} {}", property, op.as_str(), value)?
                    }
                }
            }
        }
        if let Some(term) = &self.fulltext_term {
            write!(f, ", contains({:?})", term)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DynamicOperand, SelectorRef};
    use serde_json::json;

    fn bound_ref(name: &str, id: usize) -> SelectorRef {
        let mut r = SelectorRef::new(name);
        r.id = Some(SelectorId(id));
        r
    }

    #[test]
    fn test_and_spine_collected() {
        let constraint = Constraint::And(vec![
            Constraint::Comparison {
                left: DynamicOperand::PropertyValue(bound_ref("a", 0), "x".into()),
                op: CompareOp::Eq,
                right: StaticOperand::Literal(json!(5)),
            },
            Constraint::PropertyExists {
                selector: bound_ref("a", 0),
                property: "y".into(),
            },
        ]);
        let mut filter = Filter::for_selector(SelectorId(0), "a");
        filter.restrict_by(&constraint, &BTreeMap::new());
        assert_eq!(filter.property_restrictions.len(), 2);
        assert_eq!(
            filter.property_restrictions["x"],
            vec![PropertyRestriction::Compare {
                op: CompareOp::Eq,
                value: json!(5)
            }]
        );
    }

    #[test]
    fn test_or_not_provable() {
        let constraint = Constraint::Or(vec![
            Constraint::PropertyExists {
                selector: bound_ref("a", 0),
                property: "x".into(),
            },
            Constraint::PropertyExists {
                selector: bound_ref("a", 0),
                property: "y".into(),
            },
        ]);
        let mut filter = Filter::for_selector(SelectorId(0), "a");
        filter.restrict_by(&constraint, &BTreeMap::new());
        assert!(filter.is_unrestricted());
    }

    #[test]
    fn test_other_selector_skipped() {
        let constraint = Constraint::PropertyExists {
            selector: bound_ref("b", 1),
            property: "x".into(),
        };
        let mut filter = Filter::for_selector(SelectorId(0), "a");
        filter.restrict_by(&constraint, &BTreeMap::new());
        assert!(filter.is_unrestricted());
    }

    #[test]
    fn test_bind_variable_resolved() {
        let mut binds = BTreeMap::new();
        binds.insert("v".to_string(), Some(json!("hello")));
        let constraint = Constraint::Comparison {
            left: DynamicOperand::PropertyValue(bound_ref("a", 0), "x".into()),
            op: CompareOp::Eq,
            right: StaticOperand::BindVariable("v".into()),
        };
        let mut filter = Filter::for_selector(SelectorId(0), "a");
        filter.restrict_by(&constraint, &binds);
        assert_eq!(
            filter.property_restrictions["x"],
            vec![PropertyRestriction::Compare {
                op: CompareOp::Eq,
                value: json!("hello")
            }]
        );
    }

    #[test]
    fn test_path_restriction_matching() {
        assert!(PathRestriction::Exact("/a/b".into()).matches("/a/b"));
        assert!(!PathRestriction::Exact("/a/b".into()).matches("/a/b/c"));
        assert!(PathRestriction::Direct("/a".into()).matches("/a/b"));
        assert!(!PathRestriction::Direct("/a".into()).matches("/a/b/c"));
        assert!(PathRestriction::AllDescendants("/a".into()).matches("/a"));
        assert!(PathRestriction::AllDescendants("/a".into()).matches("/a/b/c"));
        assert!(!PathRestriction::AllDescendants("/a".into()).matches("/ab"));
    }

    #[test]
    fn test_display() {
        let mut filter = Filter::for_selector(SelectorId(0), "a");
        filter.path_restriction = PathRestriction::AllDescendants("/content".into());
        filter
            .property_restrictions
            .entry("x".into())
            .or_default()
            .push(PropertyRestriction::Compare {
                op: CompareOp::Gt,
                value: json!(3),
            });
        assert_eq!(
            filter.to_string(),
            "Filter(selector=[a], path=/content//*, [x] > 3)"
        );
    }
}
