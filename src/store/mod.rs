//! Snapshot store contracts.
//!
//! The engine never owns the content tree. It consumes an immutable snapshot
//! through the narrow `RootState` interface, and translates external path
//! syntax through a `NamePathMapper`. Concurrent changes to the live store are
//! never visible mid-iteration: a `RootState` is a frozen value for the
//! duration of one execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{QueryError, QueryResult};

/// An immutable snapshot of one node: its path and its properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTree {
    pub path: String,
    pub properties: Map<String, Value>,
}

impl NodeTree {
    pub fn new(path: impl Into<String>, properties: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            properties,
        }
    }

    /// Returns the property value, treating explicit null as absent.
    pub fn property(&self, name: &str) -> Option<&Value> {
        match self.properties.get(name) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// The node name: the last path segment ("" for the root).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// The node name with any namespace prefix stripped.
    pub fn local_name(&self) -> &str {
        let name = self.name();
        name.split_once(':').map(|(_, local)| local).unwrap_or(name)
    }
}

/// The parent path of a path, or None for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// True if `path` is a strict descendant of `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/" && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// True if any segment of the path is hidden (starts with ':').
///
/// Hidden subtrees carry internal bookkeeping and are never returned from a
/// query; the engine logs a one-time warning per query when one is touched.
pub fn is_hidden_path(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with(':'))
}

/// The current-root-state interface: the only view of the store the engine
/// and its indexes get.
pub trait RootState {
    /// Resolves a path to a node snapshot, or None if absent.
    fn tree(&self, path: &str) -> Option<NodeTree>;

    /// All node paths in the snapshot, in deterministic order. Consumed by
    /// the traversal fallback and by index cost estimation.
    fn all_paths(&self) -> Vec<String>;
}

/// A plain in-memory snapshot, used by tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryRootState {
    nodes: BTreeMap<String, Map<String, Value>>,
}

impl MemoryRootState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, path: impl Into<String>, properties: Map<String, Value>) {
        self.nodes.insert(path.into(), properties);
    }

    /// Convenience: adds a node from a JSON object value.
    pub fn add_json(&mut self, path: impl Into<String>, value: Value) {
        let properties = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.add_node(path, properties);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl RootState for MemoryRootState {
    fn tree(&self, path: &str) -> Option<NodeTree> {
        self.nodes
            .get(path)
            .map(|props| NodeTree::new(path, props.clone()))
    }

    fn all_paths(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }
}

/// Translates external path syntax to internal path syntax.
///
/// Segments may carry a namespace prefix (`prefix:name`). When the mapper has
/// prefix mappings, unknown prefixes are rejected; a mapper without mappings
/// passes prefixes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct NamePathMapper {
    prefix_mappings: BTreeMap<String, String>,
}

impl NamePathMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(
        mut self,
        external_prefix: impl Into<String>,
        internal_prefix: impl Into<String>,
    ) -> Self {
        self.prefix_mappings
            .insert(external_prefix.into(), internal_prefix.into());
        self
    }

    /// Validates the path syntactically and converts it to an internal path.
    pub fn internal_path(&self, path: &str) -> QueryResult<String> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(QueryError::InvalidPath(path.to_string()));
        }
        if path == "/" {
            return Ok(path.to_string());
        }
        if path.ends_with('/') {
            return Err(QueryError::InvalidPath(path.to_string()));
        }
        let mut internal = String::with_capacity(path.len());
        for segment in path[1..].split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(QueryError::InvalidPath(path.to_string()));
            }
            internal.push('/');
            match segment.split_once(':') {
                Some((prefix, local)) if !self.prefix_mappings.is_empty() => {
                    let mapped = self
                        .prefix_mappings
                        .get(prefix)
                        .ok_or_else(|| QueryError::UnmappablePath(path.to_string()))?;
                    internal.push_str(mapped);
                    internal.push(':');
                    internal.push_str(local);
                }
                _ => internal.push_str(segment),
            }
        }
        Ok(internal)
    }
}
