//! Observable planner and scan events
//!
//! Events are explicit and typed; each carries its own severity.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Query lifecycle
    /// Strategy chosen for an accepted query
    StrategySelected,
    QueryRejected,
    /// Query lies wholly outside the index domain; no scan opened
    QueryOutsideDomain,

    // Scans
    ScanOpened,
    StagePushed,
    ScanClosed,
    /// Close failed while unwinding another error
    ScanCloseFailed,

    // Two-phase attribute lookup
    PointersCollected,
    /// Phase 1 matched nothing; phase 2 never opened
    Phase2Skipped,

    // Ingestion
    IngestRecordSkipped,

    // Explain
    ExplainBegin,
    ExplainComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StrategySelected => "QUERY_STRATEGY_SELECTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryOutsideDomain => "QUERY_OUTSIDE_DOMAIN",
            Event::ScanOpened => "SCAN_OPENED",
            Event::StagePushed => "STAGE_PUSHED",
            Event::ScanClosed => "SCAN_CLOSED",
            Event::ScanCloseFailed => "SCAN_CLOSE_FAILED",
            Event::PointersCollected => "POINTERS_COLLECTED",
            Event::Phase2Skipped => "PHASE2_SKIPPED",
            Event::IngestRecordSkipped => "INGEST_RECORD_SKIPPED",
            Event::ExplainBegin => "EXPLAIN_BEGIN",
            Event::ExplainComplete => "EXPLAIN_COMPLETE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::ScanOpened | Event::StagePushed | Event::ScanClosed => Severity::Trace,
            Event::QueryRejected | Event::IngestRecordSkipped => Severity::Warn,
            Event::ScanCloseFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_upper_snake() {
        let events = [
            Event::ConfigLoaded,
            Event::StrategySelected,
            Event::QueryRejected,
            Event::QueryOutsideDomain,
            Event::ScanOpened,
            Event::StagePushed,
            Event::ScanClosed,
            Event::ScanCloseFailed,
            Event::PointersCollected,
            Event::Phase2Skipped,
            Event::IngestRecordSkipped,
            Event::ExplainBegin,
            Event::ExplainComplete,
        ];
        for event in events {
            let name = event.as_str();
            assert!(name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
        }
    }

    #[test]
    fn test_close_failure_is_error() {
        assert_eq!(Event::ScanCloseFailed.severity(), Severity::Error);
        assert_eq!(Event::ScanOpened.severity(), Severity::Trace);
        assert_eq!(format!("{}", Event::Phase2Skipped), "PHASE2_SKIPPED");
    }
}
