//! Record-append interface used by ingestion
//!
//! Each appended record produces:
//! - one record-table entry keyed by id (the phase-2 target)
//! - an index entry and a full-record entry in the spatio-temporal table
//! - one attribute-index entry per indexed attribute with a scalar value
//!
//! Records outside the index domain are skipped, not failed. Counts live in
//! caller-owned `IngestCounters`, never in process-wide state.

use geo::Intersects;

use super::{Key, MemoryStore, StoreError, StoreResult};
use crate::filter::IndexDomain;
use crate::keys::{attribute_row, encode_literal, index_qualifier, record_qualifier, KeyPlanner};
use crate::observability::{Event, Logger};
use crate::planner::{PlannerConfig, QueryPlanner};
use crate::record::{codec_for_name, Record, RecordCodec};

/// Per-batch ingestion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    pub written: u64,
    pub skipped: u64,
}

/// Writes records in the layout the planner scans
pub struct IndexWriter<'a> {
    store: &'a MemoryStore,
    config: &'a PlannerConfig,
    domain: &'a IndexDomain,
    keys: &'a dyn KeyPlanner,
    codec: &'static dyn RecordCodec,
}

impl<'a> IndexWriter<'a> {
    /// Creates a writer sharing the planner's configuration and key layout
    pub fn new(store: &'a MemoryStore, planner: &'a QueryPlanner) -> StoreResult<Self> {
        let config = planner.config();
        let codec = codec_for_name(&config.codec)
            .ok_or_else(|| StoreError::codec_failed(format!("unknown codec '{}'", config.codec)))?;
        Ok(Self {
            store,
            config,
            domain: planner.domain(),
            keys: planner.key_planner(),
            codec,
        })
    }

    /// Creates the three tables if they do not exist
    pub fn create_tables(&self) {
        let tables = &self.config.tables;
        self.store.create_table(&tables.records);
        self.store.create_table(&tables.spatio_temporal);
        self.store.create_table(&tables.attribute);
    }

    /// Appends one record.
    ///
    /// Out-of-domain records are counted as skipped and return `Ok`.
    pub fn append(&self, record: &Record, counters: &mut IngestCounters) -> StoreResult<()> {
        if let Some(reason) = self.out_of_domain(record) {
            counters.skipped += 1;
            Logger::event(
                Event::IngestRecordSkipped,
                &[("id", &record.id), ("reason", reason)],
            );
            return Ok(());
        }

        let full = self.codec.encode(record)?;
        let entry = self.codec.encode(&record.index_entry())?;
        let tables = &self.config.tables;

        self.store.put(
            &tables.records,
            Key::new(record.id.as_bytes(), Vec::new(), Vec::new()),
            full.clone(),
        );

        let (row, family) = self.keys.index_location(record);
        self.store.put(
            &tables.spatio_temporal,
            Key::new(row.clone(), family.clone(), index_qualifier(&record.id)),
            entry.clone(),
        );
        self.store.put(
            &tables.spatio_temporal,
            Key::new(row, family, record_qualifier(&record.id)),
            full,
        );

        for name in &self.config.schema.indexed_attributes {
            if let Some(literal) = record.attribute(name).and_then(encode_literal) {
                self.store.put(
                    &tables.attribute,
                    Key::new(attribute_row(name, &literal), record.id.as_bytes(), Vec::new()),
                    entry.clone(),
                );
            }
        }

        counters.written += 1;
        Ok(())
    }

    /// Appends every record, stopping at the first hard failure
    pub fn append_all<'r>(
        &self,
        records: impl IntoIterator<Item = &'r Record>,
        counters: &mut IngestCounters,
    ) -> StoreResult<()> {
        records
            .into_iter()
            .try_for_each(|record| self.append(record, counters))
    }

    fn out_of_domain(&self, record: &Record) -> Option<&'static str> {
        if !self.domain.bbox.intersects(&record.geometry) {
            return Some("geometry outside index domain");
        }
        match record.dtg {
            Some(dtg) if !self.domain.interval.contains(&dtg) => {
                Some("timestamp outside index domain")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{EntryKind, split_qualifier};
    use chrono::{TimeZone, Utc};
    use geo::point;
    use serde_json::json;

    fn planner() -> QueryPlanner {
        let mut config = PlannerConfig::default();
        config.schema.attributes = vec!["name".into(), "tags".into()];
        config.schema.indexed_attributes = vec!["name".into(), "tags".into()];
        QueryPlanner::new(config).unwrap()
    }

    #[test]
    fn test_append_writes_all_layouts() {
        let store = MemoryStore::new();
        let planner = planner();
        let writer = IndexWriter::new(&store, &planner).unwrap();
        writer.create_tables();

        let record = Record::new("r1", point!(x: 10.0, y: 20.0))
            .with_dtg(Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap())
            .with_attribute("name", json!("alice"))
            .with_attribute("tags", json!(["a", "b"]));
        let mut counters = IngestCounters::default();
        writer.append(&record, &mut counters).unwrap();

        assert_eq!(counters, IngestCounters { written: 1, skipped: 0 });
        assert_eq!(store.len("records"), 1);
        assert_eq!(store.len("spatio_temporal"), 2);
        // arrays are not indexable
        assert_eq!(store.len("attribute"), 1);

        let (row, family) = planner.key_planner().index_location(&record);
        assert_eq!(family.len(), 2);
        assert!(row.starts_with(b"0"));
        assert_eq!(
            split_qualifier(&index_qualifier("r1")),
            Some((&b"r1"[..], EntryKind::Index))
        );
    }

    #[test]
    fn test_out_of_domain_skipped() {
        let store = MemoryStore::new();
        let mut config = PlannerConfig::default();
        config.domain.min_lon = 0.0;
        config.domain.max_lon = 5.0;
        let planner = QueryPlanner::new(config).unwrap();
        let writer = IndexWriter::new(&store, &planner).unwrap();
        writer.create_tables();

        let inside = Record::new("in", point!(x: 1.0, y: 1.0));
        let outside = Record::new("out", point!(x: 50.0, y: 1.0));
        let late = Record::new("late", point!(x: 1.0, y: 1.0))
            .with_dtg(Utc.with_ymd_and_hms(2200, 1, 1, 0, 0, 0).unwrap());

        let mut counters = IngestCounters::default();
        writer
            .append_all([&inside, &outside, &late], &mut counters)
            .unwrap();

        assert_eq!(counters, IngestCounters { written: 1, skipped: 2 });
        assert_eq!(store.len("records"), 1);
    }

    #[test]
    fn test_counters_are_per_batch() {
        let store = MemoryStore::new();
        let planner = planner();
        let writer = IndexWriter::new(&store, &planner).unwrap();
        writer.create_tables();

        let mut first = IngestCounters::default();
        let mut second = IngestCounters::default();
        writer
            .append(&Record::new("a", point!(x: 0.0, y: 0.0)), &mut first)
            .unwrap();
        writer
            .append(&Record::new("b", point!(x: 0.0, y: 0.0)), &mut second)
            .unwrap();
        assert_eq!(first.written, 1);
        assert_eq!(second.written, 1);
    }
}
