//! arborq - cost-based query planning and execution over hierarchical
//! content snapshots
//!
//! The crate takes an already-parsed query (source tree, constraint,
//! columns, orderings), picks the cheapest access path per selector from
//! pluggable indexes, orders joins greedily by cost, rewrites top-level ORs
//! into unions, and streams result rows through a distinct / sort / offset /
//! limit pipeline.

pub mod ast;
pub mod errors;
pub mod index;
pub mod observability;
pub mod query;
pub mod settings;
pub mod store;

pub use errors::{QueryError, QueryResult};
pub use query::{optimise, ExecutableQuery, Query, Rows, UnionQuery};
pub use settings::QueryEngineSettings;
