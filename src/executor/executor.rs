//! Query executor
//!
//! Runs a `QueryPlan` against a store and hands back a `ScanResultIterator`
//! owning every scan it opened. Execution flow:
//! 1. Empty plan: no scan, empty result
//! 2. Spatio-temporal plan: one scan with the full stage stack
//! 3. Attribute plan: two-phase lookup
//!
//! Store errors propagate unchanged after already-open scans are closed.
//! There are no retries at this layer.

use super::attribute::TwoPhaseAttributeLookup;
use super::errors::{QueryError, QueryResult};
use super::results::ScanResultIterator;
use super::spatiotemporal;
use crate::observability::{MetricsRegistry, ObservationScope};
use crate::planner::{Query, QueryPlan, QueryPlanner, QueryStrategy};
use crate::store::Store;

/// Executes plans against one store, counting into a caller-owned registry
pub struct QueryExecutor<'a, S: Store> {
    store: &'a S,
    metrics: &'a MetricsRegistry,
}

impl<'a, S: Store> QueryExecutor<'a, S> {
    pub fn new(store: &'a S, metrics: &'a MetricsRegistry) -> Self {
        Self { store, metrics }
    }

    /// Plans and executes a query
    pub fn query(
        &self,
        planner: &QueryPlanner,
        query: &Query,
    ) -> QueryResult<ScanResultIterator<'a, S::Handle>> {
        let plan = match planner.plan(query) {
            Ok(plan) => plan,
            Err(e) => {
                self.metrics.increment_queries_rejected();
                return Err(QueryError::Planner(e));
            }
        };
        self.metrics.increment_queries_planned();
        self.execute(&plan)
    }

    /// Executes an already-built plan
    pub fn execute(&self, plan: &QueryPlan) -> QueryResult<ScanResultIterator<'a, S::Handle>> {
        let strategy = plan.strategy.kind();
        let scope = ObservationScope::with_fields(
            "QUERY",
            &[("type_name", &plan.type_name), ("strategy", strategy.as_str())],
        );

        let result = match &plan.strategy {
            QueryStrategy::Empty => {
                self.metrics.increment_empty_queries();
                Ok(ScanResultIterator::empty())
            }
            QueryStrategy::SpatioTemporal(st) => {
                self.metrics.increment_spatio_temporal_queries();
                spatiotemporal::execute(self.store, st, self.metrics)
            }
            QueryStrategy::AttributeIndex(attr) => {
                self.metrics.increment_attribute_queries();
                TwoPhaseAttributeLookup::new(self.store, self.metrics).execute(attr)
            }
        };

        match &result {
            Ok(results) => scope.complete_with_fields(&[("state", results.state())]),
            Err(e) => scope.fail(&e.to_string()),
        }
        result
    }
}
