//! OR-to-union rewrite and union query execution.
//!
//! A top-level OR usually forces every index to cover all branches at once.
//! Splitting the disjunction into one query per branch and chaining them with
//! UNION lets each branch pick its own index. The rewrite happens before
//! `init()` so every branch binds its own copy of the AST.

use serde_json::Value;

use crate::ast::{Constraint, OrderSpec};
use crate::errors::{QueryError, QueryResult};
use crate::index::IndexProvider;
use crate::observability::Logger;
use crate::query::cost::saturated_add;
use crate::query::filtering::{combined_result, measure_result, ReadCounts, Rows};
use crate::query::Query;
use crate::store::RootState;

/// A query after optimisation: either the original or a union chain.
pub enum ExecutableQuery {
    Single(Query),
    Union(Box<UnionQuery>),
}

/// Two queries whose results are concatenated; without `union_all`, rows
/// appearing in both branches are delivered once. Distinct, ordering, offset
/// and limit are union-level concerns: the branches deliver candidate rows
/// and the union applies the composed pipeline exactly once.
pub struct UnionQuery {
    left: ExecutableQuery,
    right: ExecutableQuery,
    union_all: bool,
    explain: bool,
    measure: bool,
    distinct: bool,
    distinct_counts: Vec<bool>,
    orderings: Vec<OrderSpec>,
    offset: i64,
    limit: i64,
}

/// Rewrites a top-level OR into a chain of binary unions, one branch per
/// disjunct, each carrying the original query's columns and orderings. The
/// original distinct, ordering, offset and limit settings move to the
/// outermost union so they apply to the combined rows exactly once. Queries
/// whose constraint does not split are returned unchanged. Only valid before
/// `init()`.
pub fn optimise(query: Query) -> QueryResult<ExecutableQuery> {
    if query.initialised {
        return Err(QueryError::AlreadyInitialised);
    }
    let Some(constraint) = &query.constraint else {
        return Ok(ExecutableQuery::Single(query));
    };
    let simplified = constraint.clone().simplify();
    let parts = simplified.simplify_for_union();
    if parts.len() <= 1 {
        return Ok(ExecutableQuery::Single(query));
    }
    Logger::debug(
        "UNION_REWRITE",
        &[
            ("branches", &parts.len().to_string()),
            ("statement", &query.statement()),
        ],
    );
    let mut branches = parts.into_iter();
    // The first disjunct seeds the chain; each further disjunct becomes the
    // right side of a new binary union on top.
    let first = match branches.next() {
        Some(part) => part,
        None => return Ok(ExecutableQuery::Single(query)),
    };
    let mut result = ExecutableQuery::Single(branch_query(&query, first)?);
    for part in branches {
        let branch = ExecutableQuery::Single(branch_query(&query, part)?);
        result = ExecutableQuery::Union(Box::new(UnionQuery::new(result, branch, false)));
    }
    // Only the outermost union post-processes and reports; inner unions in
    // the chain are plain concatenations.
    if let ExecutableQuery::Union(union) = &mut result {
        union.explain = query.explain;
        union.measure = query.measure;
        union.distinct = query.distinct;
        union.distinct_counts = query.columns.iter().map(|c| c.counts_for_distinct()).collect();
        union.orderings = query.orderings.clone();
        union.offset = query.offset;
        union.limit = query.limit;
    }
    Ok(result)
}

fn branch_query(original: &Query, constraint: Constraint) -> QueryResult<Query> {
    let statement = recompose_statement(&original.statement, &constraint);
    let mut branch = original.clone_with(Some(constraint), statement)?;
    // A branch keeps its orderings so rows carry order values, but offset
    // and limit are applied at the union level: each branch delivers up to
    // offset + limit rows from position zero.
    branch.limit = saturated_add(original.limit, original.offset.max(0));
    branch.offset = 0;
    Ok(branch)
}

/// Splices a new constraint into the original statement text: everything
/// before WHERE and any trailing ORDER BY are preserved verbatim. The search
/// is case-insensitive; a statement without a WHERE clause is kept as is.
fn recompose_statement(original: &str, constraint: &Constraint) -> String {
    if original.is_empty() {
        return String::new();
    }
    let Some(where_at) = find_ignore_ascii_case(original, " where ") else {
        return original.to_string();
    };
    let head = &original[..where_at];
    let tail = match find_ignore_ascii_case(&original[where_at..], " order by ") {
        Some(i) => &original[where_at + i..],
        None => "",
    };
    format!("{} where {}{}", head, constraint, tail)
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`.
/// Indexes the haystack directly, so non-ASCII text whose lowercase form has
/// a different byte length cannot skew the offsets.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// The planning penalty of keeping a disjunction in one query. A top-level OR
/// mixing a full-text branch with a plain branch cannot be answered by any
/// single index, so its overhead is unbounded; otherwise the overheads of
/// nested constraints add up, saturating at infinity.
pub fn cost_overhead(constraint: &Constraint) -> f64 {
    match constraint {
        Constraint::Or(children) => {
            let fulltext = children.iter().filter(|c| contains_fulltext(c)).count();
            if fulltext > 0 && fulltext < children.len() {
                return f64::MAX;
            }
            children.iter().map(cost_overhead).sum()
        }
        Constraint::And(children) => children.iter().map(cost_overhead).sum(),
        Constraint::Not(inner) => cost_overhead(inner),
        _ => 0.0,
    }
}

fn contains_fulltext(constraint: &Constraint) -> bool {
    match constraint {
        Constraint::FullText { .. } => true,
        Constraint::And(children) | Constraint::Or(children) => {
            children.iter().any(contains_fulltext)
        }
        Constraint::Not(inner) => contains_fulltext(inner),
        _ => false,
    }
}

impl ExecutableQuery {
    pub fn init(&mut self) -> QueryResult<()> {
        match self {
            ExecutableQuery::Single(query) => query.init(),
            ExecutableQuery::Union(union) => {
                union.left.init()?;
                union.right.init()
            }
        }
    }

    /// Binds a value in every branch that references the variable.
    pub fn bind_value(&mut self, name: &str, value: Value) -> QueryResult<()> {
        match self {
            ExecutableQuery::Single(query) => query.bind_value(name, value),
            ExecutableQuery::Union(union) => {
                let left = union.left.bind_value(name, value.clone());
                let right = union.right.bind_value(name, value);
                match (left, right) {
                    (Ok(()), _) | (_, Ok(())) => Ok(()),
                    (Err(e), Err(_)) => Err(e),
                }
            }
        }
    }

    pub fn bind_variable_names(&self) -> Vec<&str> {
        match self {
            ExecutableQuery::Single(query) => query.bind_variable_names(),
            ExecutableQuery::Union(union) => {
                let mut names = union.left.bind_variable_names();
                for name in union.right.bind_variable_names() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            }
        }
    }

    pub fn prepare(&mut self, root: &dyn RootState, provider: &dyn IndexProvider) -> QueryResult<()> {
        match self {
            ExecutableQuery::Single(query) => query.prepare(root, provider),
            ExecutableQuery::Union(union) => {
                union.left.prepare(root, provider)?;
                union.right.prepare(root, provider)
            }
        }
    }

    /// Saturating sum of the branch costs.
    pub fn estimated_cost(&self) -> Option<f64> {
        match self {
            ExecutableQuery::Single(query) => query.estimated_cost(),
            ExecutableQuery::Union(union) => Some(
                union.left.estimated_cost()? + union.right.estimated_cost()?,
            ),
        }
    }

    pub fn statement(&self) -> String {
        match self {
            ExecutableQuery::Single(query) => query.statement(),
            ExecutableQuery::Union(union) => format!(
                "{} union {}",
                union.left.statement(),
                union.right.statement()
            ),
        }
    }

    pub fn plan_text(&self) -> String {
        match self {
            ExecutableQuery::Single(query) => query.plan_text(),
            ExecutableQuery::Union(union) => {
                format!("{} union {}", union.left.plan_text(), union.right.plan_text())
            }
        }
    }

    pub fn execute<'a>(&'a self, root: &'a dyn RootState) -> QueryResult<Rows<'a>> {
        match self {
            ExecutableQuery::Single(query) => query.execute(root),
            ExecutableQuery::Union(union) => union.execute(root),
        }
    }
}

impl UnionQuery {
    /// Composes two queries into a union. The result streams both branches
    /// as they are; callers wanting union-level distinct, ordering, offset or
    /// limit apply those on the branches or go through [`optimise`].
    pub fn new(left: ExecutableQuery, right: ExecutableQuery, union_all: bool) -> Self {
        Self {
            left,
            right,
            union_all,
            explain: false,
            measure: false,
            distinct: false,
            distinct_counts: Vec::new(),
            orderings: Vec::new(),
            offset: 0,
            limit: i64::MAX,
        }
    }

    pub fn union_all(&self) -> bool {
        self.union_all
    }

    pub fn execute<'a>(&'a self, root: &'a dyn RootState) -> QueryResult<Rows<'a>> {
        if self.explain {
            let row = crate::query::ResultRow::synthetic(vec![Value::String(self.plan_text())]);
            return Ok(Rows::prefetched(
                vec![row],
                vec!["plan".to_string()],
                Some(1),
                ReadCounts::default(),
            ));
        }
        let left = self.left.execute(root)?;
        let right = self.right.execute(root)?;
        let merged = Rows::union(left, right, self.union_all);
        let rows = combined_result(
            merged,
            self.distinct,
            &self.distinct_counts,
            &self.orderings,
            self.offset,
            self.limit,
        );
        if self.measure {
            let mut rows = rows;
            while rows.next().is_some() {}
            let counts = rows.counts();
            return Ok(measure_result(&counts));
        }
        Ok(rows)
    }

    fn plan_text(&self) -> String {
        format!("{} union {}", self.left.plan_text(), self.right.plan_text())
    }
}
