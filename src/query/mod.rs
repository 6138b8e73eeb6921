//! Query lifecycle: construction, binding, planning and execution.
//!
//! A [`Query`] moves through three phases. `init()` simplifies the constraint
//! and binds every selector reference to a dense index, exactly once.
//! `prepare()` resolves bind variables, picks the cheapest access path per
//! selector and orders joins by cost. `execute()` streams rows against one
//! snapshot; it can run any number of times against different snapshots once
//! the query is prepared.

mod cost;
mod filtering;
mod join;
mod result;
mod rows;
mod union;

pub use cost::saturated_add;
pub use filtering::{ReadCounts, Rows};
pub use result::ResultRow;
pub use union::{cost_overhead, optimise, ExecutableQuery, UnionQuery};

use std::cell::Cell;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::{
    Column, Constraint, OrderSpec, SelectorId, SelectorRef, Source,
};
use crate::errors::{QueryError, QueryResult};
use crate::index::{Filter, IndexProvider, OrderEntry, SelectorExecutionPlan};
use crate::observability::{Logger, Severity};
use crate::settings::QueryEngineSettings;
use crate::store::{NamePathMapper, RootState};

/// Planning output, fixed once `prepare()` succeeds.
struct Prepared {
    plans: Vec<SelectorExecutionPlan>,
    source: Source,
    cost: f64,
}

pub struct Query {
    statement: String,
    source: Source,
    constraint: Option<Constraint>,
    columns: Vec<Column>,
    orderings: Vec<OrderSpec>,
    binds: BTreeMap<String, Option<Value>>,
    limit: i64,
    offset: i64,
    distinct: bool,
    explain: bool,
    measure: bool,
    traversal_enabled: bool,
    internal: bool,
    settings: QueryEngineSettings,
    mapper: NamePathMapper,
    initialised: bool,
    selector_names: Vec<String>,
    distinct_counts: Vec<bool>,
    prepared: Option<Prepared>,
    warned_hidden: Cell<bool>,
}

impl Query {
    pub fn new(
        statement: impl Into<String>,
        source: Source,
        constraint: Option<Constraint>,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            statement: statement.into(),
            source,
            constraint,
            columns,
            orderings: Vec::new(),
            binds: BTreeMap::new(),
            limit: i64::MAX,
            offset: 0,
            distinct: false,
            explain: false,
            measure: false,
            traversal_enabled: true,
            internal: false,
            settings: QueryEngineSettings::default(),
            mapper: NamePathMapper::new(),
            initialised: false,
            selector_names: Vec::new(),
            distinct_counts: Vec::new(),
            prepared: None,
            warned_hidden: Cell::new(false),
        }
    }

    pub fn with_settings(mut self, settings: QueryEngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The mapper used to translate node-constraint paths during `init()`.
    pub fn with_mapper(mut self, mapper: NamePathMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Replaces the orderings. After `init()` the selector references in the
    /// new operands are bound immediately; references to undeclared selectors
    /// stay unresolved and evaluate to null.
    pub fn set_order_by(&mut self, mut orderings: Vec<OrderSpec>) {
        if self.initialised {
            let names = &self.selector_names;
            for ordering in &mut orderings {
                ordering.operand.for_each_selector_ref_mut(&mut |r| {
                    if let Some(i) = names.iter().position(|n| *n == r.name) {
                        r.id = Some(SelectorId(i));
                    }
                });
            }
        }
        self.orderings = orderings;
    }

    pub fn set_limit(&mut self, limit: i64) {
        self.limit = limit;
    }

    pub fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub fn set_explain(&mut self, explain: bool) {
        self.explain = explain;
    }

    pub fn set_measure(&mut self, measure: bool) {
        self.measure = measure;
    }

    /// Disables the traversal fallback; a selector with no usable index then
    /// fails to prepare. Mostly useful to assert index coverage in tests.
    pub fn set_traversal_enabled(&mut self, enabled: bool) {
        self.traversal_enabled = enabled;
    }

    /// Internal queries log cost decisions at trace instead of debug.
    pub fn set_internal(&mut self, internal: bool) {
        self.internal = internal;
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Resolves names: assigns each declared selector a dense id, binds every
    /// selector reference in the constraint, columns and orderings, translates
    /// node-constraint paths through the mapper and registers the constraint's
    /// bind variables. Runs once; later calls are a no-op.
    pub fn init(&mut self) -> QueryResult<()> {
        if self.initialised {
            return Ok(());
        }
        if let Some(constraint) = self.constraint.take() {
            self.constraint = Some(constraint.simplify());
        }
        let mut names: Vec<String> = Vec::new();
        for leaf in self.source.inner_join_selectors() {
            if names.contains(&leaf.name) {
                return Err(QueryError::DuplicateSelectorName(leaf.name.clone()));
            }
            names.push(leaf.name.clone());
        }
        let mut unknown: Option<String> = None;
        {
            let mut bind = |r: &mut SelectorRef| match names.iter().position(|n| *n == r.name) {
                Some(i) => r.id = Some(SelectorId(i)),
                None => {
                    if unknown.is_none() {
                        unknown = Some(r.name.clone());
                    }
                }
            };
            self.source.for_each_selector_ref_mut(&mut bind);
            if let Some(constraint) = &mut self.constraint {
                constraint.for_each_selector_ref_mut(&mut bind);
            }
            for column in &mut self.columns {
                bind(&mut column.selector);
            }
            for ordering in &mut self.orderings {
                ordering.operand.for_each_selector_ref_mut(&mut bind);
            }
        }
        if let Some(name) = unknown {
            return Err(QueryError::UnknownSelector(name));
        }
        if let Some(constraint) = &mut self.constraint {
            let mapper = &self.mapper;
            constraint.map_paths(&mut |path| mapper.internal_path(path))?;
        }
        let mut binds = std::mem::take(&mut self.binds);
        if let Some(constraint) = &self.constraint {
            constraint.for_each_bind_variable(&mut |name| {
                binds.entry(name.to_string()).or_insert(None);
            });
        }
        self.binds = binds;
        self.distinct_counts = self.columns.iter().map(|c| c.counts_for_distinct()).collect();
        self.selector_names = names;
        self.initialised = true;
        Ok(())
    }

    pub fn bind_value(&mut self, name: &str, value: Value) -> QueryResult<()> {
        if !self.initialised {
            return Err(QueryError::NotInitialised("bind_value"));
        }
        match self.binds.get_mut(name) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(QueryError::UnknownBindVariable(name.to_string())),
        }
    }

    pub fn bind_variable_names(&self) -> Vec<&str> {
        self.binds.keys().map(String::as_str).collect()
    }

    pub fn bind_variable_value(&self, name: &str) -> QueryResult<&Value> {
        match self.binds.get(name) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(QueryError::BindVariableNotSet(name.to_string())),
            None => Err(QueryError::UnknownBindVariable(name.to_string())),
        }
    }

    /// Cost-based planning: builds one filter per selector, asks every index
    /// for its cost, commits the cheapest access path and orders joins.
    /// Requires all bind variables to be set. Runs once.
    pub fn prepare(&mut self, root: &dyn RootState, provider: &dyn IndexProvider) -> QueryResult<()> {
        if !self.initialised {
            return Err(QueryError::NotInitialised("prepare"));
        }
        if self.prepared.is_some() {
            return Ok(());
        }
        for (name, value) in &self.binds {
            if value.is_none() {
                return Err(QueryError::BindVariableNotSet(name.clone()));
            }
        }
        if self.settings.normalise_constraints {
            if let Some(constraint) = self.constraint.take() {
                self.constraint = Some(constraint.normalise());
            }
        }
        let indexes = provider.query_indexes(root);
        let row_cap = cost::effective_row_cap(self.limit, self.offset);
        let mut plans = Vec::with_capacity(self.selector_names.len());
        for (i, name) in self.selector_names.iter().enumerate() {
            let selector = SelectorId(i);
            let mut filter = Filter::for_selector(selector, name.clone());
            if let Some(constraint) = &self.constraint {
                filter.restrict_by(constraint, &self.binds);
            }
            filter.projected_properties = self
                .columns
                .iter()
                .filter(|c| c.selector.resolved() == Some(selector))
                .map(|c| c.property_name.clone())
                .collect();
            let sort_order = self.requested_sort_order(selector);
            let plan = cost::best_selector_execution_plan(
                filter,
                sort_order.as_deref(),
                &indexes,
                root,
                self.traversal_enabled,
                row_cap,
                self.internal,
            )?;
            plans.push(plan);
        }
        let (source, cost) = join::order_joins(&self.source, &plans)?;
        self.prepared = Some(Prepared { plans, source, cost });
        let severity = if self.internal {
            Severity::Trace
        } else {
            Severity::Debug
        };
        Logger::log(severity, "QUERY_PLAN", &[("plan", &self.plan_text())]);
        Ok(())
    }

    /// ORDER BY as a push-down request for one selector. A function operand
    /// on this selector makes the whole order unservable by an index, so the
    /// push-down is abandoned; operands on other selectors are skipped.
    fn requested_sort_order(&self, selector: SelectorId) -> Option<Vec<OrderEntry>> {
        if self.orderings.is_empty() {
            return None;
        }
        let mut entries = Vec::new();
        for spec in &self.orderings {
            match spec.operand.as_property() {
                Some((r, property)) if r.resolved() == Some(selector) => {
                    entries.push(OrderEntry {
                        property_name: property.to_string(),
                        order: spec.order,
                    });
                }
                Some(_) => continue,
                None => {
                    if spec.operand.selector().resolved() == Some(selector) {
                        return None;
                    }
                }
            }
        }
        (!entries.is_empty()).then_some(entries)
    }

    /// True when the chosen index already delivers rows in the requested
    /// order: single selector, plain property operands, and a structurally
    /// equal sort order on the committed plan.
    pub fn is_sorted_by_index(&self) -> bool {
        let Some(prepared) = &self.prepared else {
            return false;
        };
        if self.selector_names.len() != 1 || self.orderings.is_empty() {
            return false;
        }
        let Some(plan) = &prepared.plans[0].index_plan else {
            return false;
        };
        let Some(sort_order) = &plan.sort_order else {
            return false;
        };
        if sort_order.len() != self.orderings.len() {
            return false;
        }
        self.orderings
            .iter()
            .zip(sort_order)
            .all(|(spec, entry)| match spec.operand.as_property() {
                Some((r, property)) => {
                    r.resolved() == Some(SelectorId(0))
                        && property == entry.property_name
                        && spec.order == entry.order
                }
                None => false,
            })
    }

    /// The estimated cost of the committed plan; None before `prepare()`.
    pub fn estimated_cost(&self) -> Option<f64> {
        self.prepared.as_ref().map(|p| p.cost)
    }

    pub fn selector_names(&self) -> &[String] {
        &self.selector_names
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column_name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> QueryResult<usize> {
        self.columns
            .iter()
            .position(|c| c.column_name == name)
            .ok_or_else(|| QueryError::UnknownColumn(name.to_string()))
    }

    /// The query statement. Recomposed from the parsed form when the query
    /// was built without its original text.
    pub fn statement(&self) -> String {
        if !self.statement.is_empty() {
            return self.statement.clone();
        }
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut out = format!("select {} from {}", columns, self.source);
        if let Some(constraint) = &self.constraint {
            out.push_str(&format!(" where {}", constraint));
        }
        if !self.orderings.is_empty() {
            let order = self
                .orderings
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(" order by {}", order));
        }
        out
    }

    /// Human-readable plan: the committed access path per selector, in join
    /// execution order. Empty before `prepare()`.
    pub fn plan_text(&self) -> String {
        let Some(prepared) = &self.prepared else {
            return String::new();
        };
        source_plan_text(&prepared.source, &prepared.plans)
    }

    /// Runs the prepared query against a snapshot.
    pub fn execute<'a>(&'a self, root: &'a dyn RootState) -> QueryResult<Rows<'a>> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or(QueryError::NotInitialised("execute"))?;
        let severity = if self.internal {
            Severity::Trace
        } else {
            Severity::Debug
        };
        Logger::log(severity, "QUERY_EXECUTE", &[("statement", &self.statement())]);
        if self.explain {
            let mut plan = self.plan_text();
            if self.measure {
                plan.push_str(&format!(" cost: {}", prepared.cost));
            }
            let row = ResultRow::synthetic(vec![Value::String(plan)]);
            return Ok(Rows::prefetched(
                vec![row],
                vec!["plan".to_string()],
                Some(1),
                ReadCounts::default(),
            ));
        }
        let iter = rows::RowIterator::new(rows::ExecutionContext {
            source: &prepared.source,
            plans: &prepared.plans,
            selector_names: &self.selector_names,
            constraint: self.constraint.as_ref(),
            columns: &self.columns,
            orderings: &self.orderings,
            binds: &self.binds,
            root,
            warned_hidden: &self.warned_hidden,
        });
        let rows = filtering::pipeline(
            iter,
            self.distinct,
            self.distinct_counts.clone(),
            &self.orderings,
            self.is_sorted_by_index(),
            self.offset,
            self.limit,
            self.column_names(),
        );
        if self.measure {
            let mut rows = rows;
            while rows.next().is_some() {}
            let counts = rows.counts();
            return Ok(filtering::measure_result(&counts));
        }
        Ok(rows)
    }

    /// A pre-init deep copy with the constraint and statement replaced, used
    /// by the OR-to-union rewrite. An initialised query cannot be cloned.
    pub(crate) fn clone_with(
        &self,
        constraint: Option<Constraint>,
        statement: String,
    ) -> QueryResult<Query> {
        if self.initialised {
            return Err(QueryError::AlreadyInitialised);
        }
        Ok(Query {
            statement,
            source: self.source.clone(),
            constraint,
            columns: self.columns.clone(),
            orderings: self.orderings.clone(),
            binds: self.binds.clone(),
            limit: self.limit,
            offset: self.offset,
            distinct: self.distinct,
            explain: false,
            measure: false,
            traversal_enabled: self.traversal_enabled,
            internal: self.internal,
            settings: self.settings.clone(),
            mapper: self.mapper.clone(),
            initialised: false,
            selector_names: Vec::new(),
            distinct_counts: Vec::new(),
            prepared: None,
            warned_hidden: Cell::new(false),
        })
    }
}

fn source_plan_text(source: &Source, plans: &[SelectorExecutionPlan]) -> String {
    match source {
        Source::Selector(leaf) => {
            let plan = leaf.resolved().map(|id| &plans[id.0]);
            match plan {
                Some(plan) => format!(
                    "[{}] /* {} cost={} {} */",
                    leaf.name, plan.plan_name, plan.estimated_cost, plan.filter
                ),
                None => format!("[{}]", leaf.name),
            }
        }
        Source::Join(join) => format!(
            "{} {} {} on {}",
            source_plan_text(&join.left, plans),
            join.join_type.as_str(),
            source_plan_text(&join.right, plans),
            join.condition
        ),
    }
}
