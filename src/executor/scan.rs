//! Logged scan open and stage submission

use crate::keys::{ColumnFamilyPlan, KeyRanges};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::stages::{IteratorStackBuilder, IteratorStage};
use crate::store::{Store, StoreResult};

pub(crate) fn open<S: Store>(
    store: &S,
    table: &str,
    ranges: &KeyRanges,
    families: &ColumnFamilyPlan,
    metrics: &MetricsRegistry,
) -> StoreResult<S::Handle> {
    let handle = store.open_scan(table, ranges, families)?;
    metrics.increment_scans_opened();
    let range_count = ranges.len().to_string();
    Logger::event(
        Event::ScanOpened,
        &[("table", table), ("ranges", &range_count)],
    );
    Ok(handle)
}

/// Submits stages in ascending priority order
pub(crate) fn push_stages<S: Store>(
    store: &S,
    handle: &mut S::Handle,
    stages: &[IteratorStage],
    metrics: &MetricsRegistry,
) -> StoreResult<()> {
    IteratorStackBuilder::apply(store, handle, stages)?;
    for stage in stages {
        metrics.increment_stages_pushed();
        let priority = stage.priority.to_string();
        Logger::event(
            Event::StagePushed,
            &[("stage", &stage.name), ("priority", &priority)],
        );
    }
    Ok(())
}
