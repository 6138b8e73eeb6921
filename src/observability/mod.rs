//! Observability for the query engine.
//!
//! Structured JSON logging, one line per event, synchronous and deterministic.
//! Logging never affects planning or execution: every call site is read-only
//! with respect to engine state.
//!
//! Events emitted by this crate:
//! - `INDEX_COST` (debug/trace): per-candidate cost during index selection
//! - `INDEX_COST_NEGATIVE` (error): an index provider reported a cost below 0
//! - `HIDDEN_PATH` (warn): a scan touched a hidden subtree (once per query)
//! - `QUERY_EXECUTE` / `QUERY_PLAN` (debug/trace): execution tracing
//! - `UNION_REWRITE` (debug): an OR constraint was split into a union

mod logger;

pub use logger::{Logger, Severity};
