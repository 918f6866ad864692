//! Direct spatio-temporal scan
//!
//! One scan over the planned ranges and fetch set with the full stage stack
//! pushed down. The handle is owned by the returned iterator before any
//! stage is pushed, so a rejected stage still releases it.

use super::errors::QueryResult;
use super::results::ScanResultIterator;
use super::scan;
use crate::observability::MetricsRegistry;
use crate::planner::SpatioTemporalPlan;
use crate::store::Store;

pub(crate) fn execute<'m, S: Store>(
    store: &S,
    plan: &SpatioTemporalPlan,
    metrics: &'m MetricsRegistry,
) -> QueryResult<ScanResultIterator<'m, S::Handle>> {
    let handle = scan::open(store, &plan.table, &plan.keys.ranges, &plan.families, metrics)?;
    let mut results = ScanResultIterator::single(handle, Some(metrics));

    let pushed = match results.single_mut() {
        Some(handle) => scan::push_stages(store, handle, &plan.stages, metrics),
        None => Ok(()),
    };
    match pushed {
        Ok(()) => Ok(results),
        Err(e) => Err(results.unwind(e)),
    }
}
