//! Key range planning
//!
//! Turns a `KeyPlanningFilter` into concrete `[start, end)` row ranges, an
//! optional row regex, and a column-family fetch set. The physical key
//! layout belongs to a pluggable `KeyPlanner` selected by index-schema
//! version.
//!
//! # Contract
//!
//! - Any filter other than `AcceptEverything` yields at least one concrete
//!   range; coarse false-positive elimination is never skipped.
//! - A row regex is only ever a refinement layered on top of ranges.
//! - Column families are constrained only when the filter shape allows it.

mod geohash;
mod geohash_date;
mod layout;

pub use geohash::{cell_bounds, covering, encode as geohash_encode};
pub use geohash_date::GeoHashDateKeyPlanner;
pub use layout::{
    attribute_exact_range, attribute_prefix_range, attribute_row, encode_literal,
    index_qualifier, record_qualifier, split_qualifier, EntryKind,
};

use std::collections::BTreeSet;

use crate::filter::KeyPlanningFilter;
use crate::planner::{PlannerConfig, PlannerError, PlannerResult};
use crate::record::Record;

/// Half-open row range `[start, end)`; `end = None` is unbounded
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end,
        }
    }

    /// Range covering exactly one row
    pub fn exact(row: impl Into<Vec<u8>>) -> Self {
        let start = row.into();
        let mut end = start.clone();
        end.push(0);
        Self {
            start,
            end: Some(end),
        }
    }

    /// Range covering every row that starts with `prefix`
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        let start = prefix.into();
        let end = prefix_successor(&start);
        Self { start, end }
    }

    pub fn contains(&self, row: &[u8]) -> bool {
        row >= self.start.as_slice() && self.end.as_deref().map_or(true, |end| row < end)
    }
}

/// Smallest byte string greater than every string starting with `prefix`
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bytes = prefix.to_vec();
    while let Some(last) = bytes.pop() {
        if last < u8::MAX {
            bytes.push(last + 1);
            return Some(bytes);
        }
    }
    None
}

/// Row ranges to scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRanges {
    /// Scan the whole table
    Unconstrained,
    /// Ordered, de-duplicated ranges
    Ranges(Vec<KeyRange>),
}

impl KeyRanges {
    /// Builds an ordered range set
    pub fn from_ranges(ranges: impl IntoIterator<Item = KeyRange>) -> Self {
        let set: BTreeSet<KeyRange> = ranges.into_iter().collect();
        KeyRanges::Ranges(set.into_iter().collect())
    }

    pub fn contains(&self, row: &[u8]) -> bool {
        match self {
            KeyRanges::Unconstrained => true,
            KeyRanges::Ranges(ranges) => ranges.iter().any(|r| r.contains(row)),
        }
    }

    /// Number of concrete ranges (zero when unconstrained)
    pub fn len(&self) -> usize {
        match self {
            KeyRanges::Unconstrained => 0,
            KeyRanges::Ranges(ranges) => ranges.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of key planning for one filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPlan {
    pub ranges: KeyRanges,
    /// Best-effort row refinement; never relied on for correctness
    pub row_regex: Option<String>,
}

impl KeyPlan {
    pub fn unconstrained() -> Self {
        Self {
            ranges: KeyRanges::Unconstrained,
            row_regex: None,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.ranges == KeyRanges::Unconstrained
    }
}

/// Column families to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFamilyPlan {
    Unconstrained,
    Families(BTreeSet<Vec<u8>>),
}

impl ColumnFamilyPlan {
    pub fn allows(&self, family: &[u8]) -> bool {
        match self {
            ColumnFamilyPlan::Unconstrained => true,
            ColumnFamilyPlan::Families(families) => families.contains(family),
        }
    }
}

/// Pluggable physical key layout for the spatio-temporal index
pub trait KeyPlanner: Send + Sync {
    /// Index-schema version this planner serves
    fn schema_version(&self) -> u32;

    fn plan_keys(&self, filter: &KeyPlanningFilter) -> KeyPlan;

    fn plan_column_families(&self, filter: &KeyPlanningFilter) -> ColumnFamilyPlan;

    /// Row and column family under which `record` is indexed
    fn index_location(&self, record: &Record) -> (Vec<u8>, Vec<u8>);
}

/// Selects the key planner for the configured index-schema version
pub fn key_planner_for(config: &PlannerConfig) -> PlannerResult<Box<dyn KeyPlanner>> {
    match config.key_schema_version {
        1 => Ok(Box::new(GeoHashDateKeyPlanner::from_config(config))),
        version => Err(PlannerError::config_invalid(format!(
            "No key planner for index schema version {}",
            version
        ))),
    }
}
