//! Sorted key-value store collaborator
//!
//! The planner talks to a store only through `Store` and `ScanHandle`:
//! open a scan over row ranges and a column-family fetch set, push stages,
//! then pull entries. Stores must execute pushed stages in ascending
//! priority order regardless of push order.
//!
//! `MemoryStore` is a complete in-process implementation that executes the
//! stage catalog; `IndexWriter` is the record-append interface ingestion
//! uses to populate it.

mod errors;
mod exec;
mod memory;
mod writer;

pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use memory::{MemoryScan, MemoryStore, ScanRecord};
pub use writer::{IndexWriter, IngestCounters};

use crate::keys::{ColumnFamilyPlan, KeyRanges};
use crate::stages::IteratorStage;

/// Full entry key; ordering is row, then family, then qualifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub row: Vec<u8>,
    pub column_family: Vec<u8>,
    pub column_qualifier: Vec<u8>,
}

impl Key {
    pub fn new(
        row: impl Into<Vec<u8>>,
        column_family: impl Into<Vec<u8>>,
        column_qualifier: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            row: row.into(),
            column_family: column_family.into(),
            column_qualifier: column_qualifier.into(),
        }
    }
}

/// One (key, value) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub value: Vec<u8>,
}

/// Forward-only cursor over one scan.
///
/// A handle must be closed exactly once; any use after close fails with
/// `AERO_SCAN_CLOSED`.
pub trait ScanHandle {
    /// Next entry, or `None` when exhausted
    fn next_entry(&mut self) -> StoreResult<Option<Entry>>;

    fn close(&mut self) -> StoreResult<()>;
}

/// Store able to open range scans with push-down stages
pub trait Store {
    type Handle: ScanHandle;

    fn open_scan(
        &self,
        table: &str,
        ranges: &KeyRanges,
        families: &ColumnFamilyPlan,
    ) -> StoreResult<Self::Handle>;

    /// Attaches a stage; execution order is by priority, not call order
    fn push_stage(&self, handle: &mut Self::Handle, stage: IteratorStage) -> StoreResult<()>;
}
