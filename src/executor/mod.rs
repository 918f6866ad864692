//! Query executor subsystem
//!
//! Consumes plans and opens the scans they describe. Results are pulled by
//! the caller through a `ScanResultIterator`, which owns one handle (direct
//! spatio-temporal scan) or two (attribute lookup) and releases them on
//! close, on failure, or when dropped.
//!
//! # Invariants
//!
//! - Every opened handle is closed exactly once
//! - Phase 2 never opens when phase 1 matched nothing
//! - Store errors reach the caller unmodified

mod attribute;
mod errors;
mod executor;
mod results;
mod scan;
mod spatiotemporal;

pub use attribute::TwoPhaseAttributeLookup;
pub use errors::{QueryError, QueryResult};
pub use executor::QueryExecutor;
pub use results::ScanResultIterator;
