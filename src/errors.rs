//! Error taxonomy for the query engine.
//!
//! Every variant here is a configuration / usage error: fatal, surfaced
//! immediately, never retried. The other failure classes from the design
//! never reach this type:
//! - index providers reporting a negative cost are logged and tolerated,
//! - cost and row-count arithmetic saturates instead of overflowing,
//! - the stop-scan signal is a normal termination path.

use thiserror::Error;

/// Fatal usage errors raised by query construction, binding and planning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// A query declared the same selector name twice.
    #[error("two selectors with the same name: {0}")]
    DuplicateSelectorName(String),

    /// A constraint, column or join condition referenced a selector that the
    /// source tree does not declare.
    #[error("unknown selector: {0}")]
    UnknownSelector(String),

    /// A column lookup by name found no match.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// A value was supplied for a bind variable the query never references.
    #[error("unknown bind variable: {0}")]
    UnknownBindVariable(String),

    /// A referenced bind variable had no value at prepare time.
    #[error("bind variable value not set: {0}")]
    BindVariableNotSet(String),

    /// A path failed syntactic validation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A path used a namespace prefix the name mapper cannot translate.
    #[error("invalid path or namespace prefix: {0}")]
    UnmappablePath(String),

    /// Cloning is only valid before `init()`; an initialised query owns bound
    /// AST state that must not be aliased.
    #[error("query cannot be cloned once initialised")]
    AlreadyInitialised,

    /// An execution method ran before the required lifecycle step.
    #[error("query must be initialised before {0}")]
    NotInitialised(&'static str),

    /// The greedy join planner found a selector that no declared join
    /// condition connects to the rest of the join tree.
    #[error("no join condition connects selector '{0}' to the join tree")]
    DisconnectedJoin(String),

    /// No index proposed a plan for a selector and traversal is disabled.
    #[error("no index available for selector '{0}' and traversal is disabled")]
    NoIndexAvailable(String),
}

/// Result type for query engine operations.
pub type QueryResult<T> = Result<T, QueryError>;
