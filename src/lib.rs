//! aerogeo - spatio-temporal secondary-index query planner
//!
//! Plans queries over a sorted key-value store holding point records with
//! timestamps and scalar attributes: clips the query to the index domain,
//! picks an attribute-index or spatio-temporal strategy, computes key ranges
//! and column families, and composes the priority-ordered push-down stages
//! that return only matching records.

pub mod cli;
pub mod executor;
pub mod filter;
pub mod keys;
pub mod observability;
pub mod planner;
pub mod record;
pub mod stages;
pub mod store;
