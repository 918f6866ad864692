//! In-memory sorted store
//!
//! Tables are ordered maps of `Key -> value`. Every opened scan is recorded
//! in a scan log (table, ranges, families, stages in submission order, close
//! count) so callers can inspect exactly what the planner asked for. Open
//! failures can be injected per table.
//!
//! Stages are buffered on the handle and executed in one pass, in
//! ascending priority order, when the first entry is pulled.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{exec, Entry, Key, ScanHandle, Store, StoreError, StoreResult};
use crate::keys::{ColumnFamilyPlan, KeyRanges};
use crate::stages::IteratorStage;

/// What one scan was opened with and how it ended
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub table: String,
    pub ranges: KeyRanges,
    pub families: ColumnFamilyPlan,
    /// Stages in the order they were pushed
    pub stages: Vec<IteratorStage>,
    /// Number of successful `close` calls; exactly one when released
    pub close_count: usize,
}

impl ScanRecord {
    pub fn is_closed(&self) -> bool {
        self.close_count > 0
    }

    pub fn stage_priorities(&self) -> Vec<i32> {
        self.stages.iter().map(|s| s.priority).collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, BTreeMap<Key, Vec<u8>>>,
    scans: Vec<ScanRecord>,
    failing_tables: BTreeSet<String>,
}

/// Shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an empty table if it does not exist
    pub fn create_table(&self, table: &str) {
        self.write().tables.entry(table.to_string()).or_default();
    }

    pub fn put(&self, table: &str, key: Key, value: Vec<u8>) {
        self.write()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(key, value);
    }

    /// Number of entries in a table
    pub fn len(&self, table: &str) -> usize {
        self.read().tables.get(table).map_or(0, BTreeMap::len)
    }

    /// Makes every subsequent `open_scan` on `table` fail
    pub fn fail_opens_on(&self, table: &str) {
        self.write().failing_tables.insert(table.to_string());
    }

    /// Snapshot of the scan log
    pub fn scans(&self) -> Vec<ScanRecord> {
        self.read().scans.clone()
    }

    /// Scans opened against `table`
    pub fn scans_on(&self, table: &str) -> Vec<ScanRecord> {
        self.read()
            .scans
            .iter()
            .filter(|s| s.table == table)
            .cloned()
            .collect()
    }

    /// True if every opened scan has been closed exactly once
    pub fn all_scans_released(&self) -> bool {
        self.read().scans.iter().all(|s| s.close_count == 1)
    }

    fn collect(&self, table: &str, ranges: &KeyRanges, families: &ColumnFamilyPlan) -> Vec<Entry> {
        let inner = self.read();
        let Some(rows) = inner.tables.get(table) else {
            return Vec::new();
        };
        rows.iter()
            .filter(|(key, _)| ranges.contains(&key.row) && families.allows(&key.column_family))
            .map(|(key, value)| Entry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

/// Handle over one in-memory scan
#[derive(Debug)]
pub struct MemoryScan {
    store: MemoryStore,
    id: usize,
    table: String,
    ranges: KeyRanges,
    families: ColumnFamilyPlan,
    stages: Vec<IteratorStage>,
    results: Option<VecDeque<Entry>>,
    closed: bool,
}

impl MemoryScan {
    fn start(&mut self) -> StoreResult<()> {
        let entries = self.store.collect(&self.table, &self.ranges, &self.families);
        let mut ordered = self.stages.clone();
        ordered.sort_by_key(|s| s.priority);
        // A failed pass leaves nothing to pull.
        self.results = Some(VecDeque::new());
        let output = exec::run(&ordered, entries)?;
        self.results = Some(output.into());
        Ok(())
    }
}

impl ScanHandle for MemoryScan {
    fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        if self.closed {
            return Err(StoreError::scan_closed());
        }
        if self.results.is_none() {
            self.start()?;
        }
        Ok(self.results.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::scan_closed());
        }
        self.closed = true;
        self.results = None;
        if let Some(record) = self.store.write().scans.get_mut(self.id) {
            record.close_count += 1;
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    type Handle = MemoryScan;

    fn open_scan(
        &self,
        table: &str,
        ranges: &KeyRanges,
        families: &ColumnFamilyPlan,
    ) -> StoreResult<MemoryScan> {
        let mut inner = self.write();
        if inner.failing_tables.contains(table) {
            return Err(StoreError::open_failed(table, "injected failure"));
        }
        if !inner.tables.contains_key(table) {
            return Err(StoreError::unknown_table(table));
        }
        let id = inner.scans.len();
        inner.scans.push(ScanRecord {
            table: table.to_string(),
            ranges: ranges.clone(),
            families: families.clone(),
            stages: Vec::new(),
            close_count: 0,
        });
        drop(inner);

        Ok(MemoryScan {
            store: self.clone(),
            id,
            table: table.to_string(),
            ranges: ranges.clone(),
            families: families.clone(),
            stages: Vec::new(),
            results: None,
            closed: false,
        })
    }

    fn push_stage(&self, handle: &mut MemoryScan, stage: IteratorStage) -> StoreResult<()> {
        if handle.closed {
            return Err(StoreError::scan_closed());
        }
        if handle.results.is_some() {
            return Err(StoreError::stage_rejected(
                &stage.name,
                "scan already started",
            ));
        }
        if handle.stages.iter().any(|s| s.name == stage.name) {
            return Err(StoreError::stage_rejected(&stage.name, "duplicate stage name"));
        }
        if let Some(record) = self.write().scans.get_mut(handle.id) {
            record.stages.push(stage.clone());
        }
        handle.stages.push(stage);
        Ok(())
    }
}
