//! TwoPhaseAttributeLookup
//!
//! Phase 1 scans the attribute index over one exact or prefix range and
//! collects the distinct record pointers carried in each entry's column
//! family. Phase 1 runs to completion before anything is yielded.
//!
//! Phase 2 opens one scan over the record table restricted to exactly those
//! pointers. With no pointers phase 2 is never opened.
//!
//! Every handle is owned by the result iterator from the moment it opens,
//! so a failure at any step closes what is already open and returns the
//! original error.

use std::collections::BTreeSet;

use super::errors::QueryResult;
use super::results::ScanResultIterator;
use super::scan;
use crate::keys::{ColumnFamilyPlan, KeyRange, KeyRanges};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::planner::AttributePlan;
use crate::store::{ScanHandle, Store, StoreError, StoreResult};

pub struct TwoPhaseAttributeLookup<'a, 'm, S: Store> {
    store: &'a S,
    metrics: &'m MetricsRegistry,
}

impl<'a, 'm, S: Store> TwoPhaseAttributeLookup<'a, 'm, S> {
    pub fn new(store: &'a S, metrics: &'m MetricsRegistry) -> Self {
        Self { store, metrics }
    }

    pub fn execute(&self, plan: &AttributePlan) -> QueryResult<ScanResultIterator<'m, S::Handle>> {
        let index = scan::open(
            self.store,
            &plan.index_table,
            &KeyRanges::from_ranges([plan.range.clone()]),
            &ColumnFamilyPlan::Unconstrained,
            self.metrics,
        )?;
        let mut results = ScanResultIterator::phase1(index, Some(self.metrics));

        let pointers = match self.collect_pointers(&mut results, plan) {
            Ok(pointers) => pointers,
            Err(e) => return Err(results.unwind(e)),
        };

        let count = pointers.len().to_string();
        Logger::event(
            Event::PointersCollected,
            &[("table", &plan.index_table), ("pointers", &count)],
        );
        self.metrics.add_pointers_collected(pointers.len() as u64);

        if pointers.is_empty() {
            self.metrics.increment_phase2_skipped();
            Logger::event(Event::Phase2Skipped, &[("table", &plan.record_table)]);
            return Ok(results);
        }

        match self.open_phase2(&mut results, plan, pointers) {
            Ok(()) => Ok(results),
            Err(e) => Err(results.unwind(e)),
        }
    }

    fn collect_pointers(
        &self,
        results: &mut ScanResultIterator<'m, S::Handle>,
        plan: &AttributePlan,
    ) -> StoreResult<BTreeSet<Vec<u8>>> {
        let index = results
            .phase1_mut()
            .ok_or_else(|| StoreError::scan_failed("phase-1 scan not open"))?;
        scan::push_stages(self.store, index, &plan.index_stages, self.metrics)?;

        let mut pointers = BTreeSet::new();
        while let Some(entry) = index.next_entry()? {
            pointers.insert(entry.key.column_family);
        }
        Ok(pointers)
    }

    fn open_phase2(
        &self,
        results: &mut ScanResultIterator<'m, S::Handle>,
        plan: &AttributePlan,
        pointers: BTreeSet<Vec<u8>>,
    ) -> StoreResult<()> {
        let ranges = KeyRanges::from_ranges(pointers.into_iter().map(KeyRange::exact));
        let records = scan::open(
            self.store,
            &plan.record_table,
            &ranges,
            &ColumnFamilyPlan::Unconstrained,
            self.metrics,
        )?;
        results.attach_phase2(records)?;

        let records = results
            .phase2_mut()
            .ok_or_else(|| StoreError::scan_failed("phase-2 scan not attached"))?;
        scan::push_stages(self.store, records, &plan.record_stages, self.metrics)
    }
}
