//! Planner metrics
//!
//! Counters only, monotonic, relaxed atomics. A registry is owned by the
//! caller and passed by reference; there is no process-wide instance.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_planned: AtomicU64,
    queries_rejected: AtomicU64,
    attribute_queries: AtomicU64,
    spatio_temporal_queries: AtomicU64,
    empty_queries: AtomicU64,
    scans_opened: AtomicU64,
    scans_closed: AtomicU64,
    stages_pushed: AtomicU64,
    pointers_collected: AtomicU64,
    phase2_skipped: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_planned(&self) {
        bump(&self.queries_planned, 1);
    }

    pub fn increment_queries_rejected(&self) {
        bump(&self.queries_rejected, 1);
    }

    pub fn increment_attribute_queries(&self) {
        bump(&self.attribute_queries, 1);
    }

    pub fn increment_spatio_temporal_queries(&self) {
        bump(&self.spatio_temporal_queries, 1);
    }

    pub fn increment_empty_queries(&self) {
        bump(&self.empty_queries, 1);
    }

    pub fn increment_scans_opened(&self) {
        bump(&self.scans_opened, 1);
    }

    pub fn increment_scans_closed(&self) {
        bump(&self.scans_closed, 1);
    }

    pub fn increment_stages_pushed(&self) {
        bump(&self.stages_pushed, 1);
    }

    pub fn add_pointers_collected(&self, count: u64) {
        bump(&self.pointers_collected, count);
    }

    pub fn increment_phase2_skipped(&self) {
        bump(&self.phase2_skipped, 1);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            queries_planned: load(&self.queries_planned),
            queries_rejected: load(&self.queries_rejected),
            attribute_queries: load(&self.attribute_queries),
            spatio_temporal_queries: load(&self.spatio_temporal_queries),
            empty_queries: load(&self.empty_queries),
            scans_opened: load(&self.scans_opened),
            scans_closed: load(&self.scans_closed),
            stages_pushed: load(&self.stages_pushed),
            pointers_collected: load(&self.pointers_collected),
            phase2_skipped: load(&self.phase2_skipped),
        }
    }

    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_planned: u64,
    pub queries_rejected: u64,
    pub attribute_queries: u64,
    pub spatio_temporal_queries: u64,
    pub empty_queries: u64,
    pub scans_opened: u64,
    pub scans_closed: u64,
    pub stages_pushed: u64,
    pub pointers_collected: u64,
    pub phase2_skipped: u64,
}

impl MetricsSnapshot {
    /// Fixed key order JSON object
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"queries_planned":{},"queries_rejected":{},"attribute_queries":{},"spatio_temporal_queries":{},"empty_queries":{},"scans_opened":{},"scans_closed":{},"stages_pushed":{},"pointers_collected":{},"phase2_skipped":{}}}"#,
            self.queries_planned,
            self.queries_rejected,
            self.attribute_queries,
            self.spatio_temporal_queries,
            self.empty_queries,
            self.scans_opened,
            self.scans_closed,
            self.stages_pushed,
            self.pointers_collected,
            self.phase2_skipped,
        )
    }

    /// Scans opened but not yet closed
    pub fn open_scans(&self) -> u64 {
        self.scans_opened.saturating_sub(self.scans_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increments_and_open_scans() {
        let metrics = MetricsRegistry::new();
        metrics.increment_scans_opened();
        metrics.increment_scans_opened();
        metrics.increment_scans_closed();
        metrics.add_pointers_collected(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.open_scans(), 1);
        assert_eq!(snap.pointers_collected, 3);
    }

    #[test]
    fn test_json_parses() {
        let metrics = MetricsRegistry::new();
        metrics.increment_phase2_skipped();
        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["phase2_skipped"], 1);
        assert_eq!(parsed["scans_opened"], 0);
    }
}
