//! Observability: structured logging, typed events, counters
//!
//! Observability is read-only with respect to query execution: it never
//! changes results, never fails the caller, and runs synchronously.
//!
//! ```ignore
//! use aerogeo::observability::{Event, Logger, MetricsRegistry, ObservationScope};
//!
//! Logger::event(Event::ScanOpened, &[("table", "records")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_scans_opened();
//!
//! let scope = ObservationScope::new("QUERY");
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;
