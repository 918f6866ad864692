//! Index schema version 1: geohash + hour-bin row keys
//!
//! ```text
//! row    = SS~GGG~YYYYMMDDHH   (shard, geohash chars 1-3, hour bin)
//! family = GG                  (geohash chars 4-5)
//! qual   = id\0idx | id\0rec
//! ```
//!
//! The shard is the CRC32 of the record id modulo the shard count.

use chrono::{DateTime, Utc};
use geo::{BoundingRect, Polygon};

use super::geohash::{self, covering_within, estimate};
use super::{prefix_successor, ColumnFamilyPlan, KeyPlan, KeyPlanner, KeyRange, KeyRanges};
use crate::filter::KeyPlanningFilter;
use crate::planner::PlannerConfig;
use crate::record::{compute_checksum, Record};

const ROW_GEOHASH_LEN: usize = 3;
const INDEX_PRECISION: usize = 5;
const DATE_FORMAT: &str = "%Y%m%d%H";
const MISSING_DATE_BIN: &str = "0000000000";

/// Default key planner for index schema version 1
#[derive(Debug, Clone)]
pub struct GeoHashDateKeyPlanner {
    shards: u32,
    max_ranges: usize,
    max_column_families: usize,
}

impl GeoHashDateKeyPlanner {
    pub fn new(shards: u32, max_ranges: usize, max_column_families: usize) -> Self {
        Self {
            shards: shards.max(1),
            max_ranges: max_ranges.max(1),
            max_column_families,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.shards, config.max_ranges, config.max_column_families)
    }

    fn shard_of(&self, id: &str) -> u32 {
        compute_checksum(id.as_bytes()) % self.shards
    }

    fn shard_prefixes(&self) -> impl Iterator<Item = String> {
        (0..self.shards).map(|shard| format!("{:02}~", shard))
    }

    fn date_bin(at: &DateTime<Utc>) -> String {
        at.format(DATE_FORMAT).to_string()
    }

    /// Regex over the hour-bin segment shared by every bin in `[start, end]`
    fn date_regex(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
        let (s, e) = (Self::date_bin(start), Self::date_bin(end));
        let common: String = s
            .chars()
            .zip(e.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();
        format!(
            "^\\d{{2}}~[^~]{{{}}}~{}",
            ROW_GEOHASH_LEN,
            regex::escape(&common)
        )
    }

    fn date_only(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> KeyPlan {
        KeyPlan {
            ranges: KeyRanges::from_ranges(self.shard_prefixes().map(KeyRange::prefix)),
            row_regex: Some(Self::date_regex(start, end)),
        }
    }

    fn spatial(
        &self,
        polygon: &Polygon<f64>,
        time: Option<(&DateTime<Utc>, &DateTime<Utc>)>,
    ) -> KeyPlan {
        let per_shard = (self.max_ranges / self.shards as usize).max(1);
        let cells = covering_within(polygon, ROW_GEOHASH_LEN, per_shard);

        if cells.is_empty() {
            // Degenerate polygon: fall back to whole shards so ranges stay concrete
            return match time {
                Some((start, end)) => self.date_only(start, end),
                None => KeyPlan {
                    ranges: KeyRanges::from_ranges(self.shard_prefixes().map(KeyRange::prefix)),
                    row_regex: None,
                },
            };
        }

        let mut ranges = Vec::with_capacity(cells.len() * self.shards as usize);
        let mut coarse = false;
        for shard in self.shard_prefixes() {
            for cell in &cells {
                let full = cell.len() == ROW_GEOHASH_LEN;
                coarse |= !full;
                let range = match (full, time) {
                    (true, Some((start, end))) => {
                        let lower = format!("{}{}~{}", shard, cell, Self::date_bin(start));
                        let upper = format!("{}{}~{}", shard, cell, Self::date_bin(end));
                        KeyRange::new(lower, prefix_successor(upper.as_bytes()))
                    }
                    (true, None) => KeyRange::prefix(format!("{}{}~", shard, cell)),
                    (false, _) => KeyRange::prefix(format!("{}{}", shard, cell)),
                };
                ranges.push(range);
            }
        }

        let row_regex = match time {
            Some((start, end)) if coarse => Some(Self::date_regex(start, end)),
            _ => None,
        };
        KeyPlan {
            ranges: KeyRanges::from_ranges(ranges),
            row_regex,
        }
    }
}

impl KeyPlanner for GeoHashDateKeyPlanner {
    fn schema_version(&self) -> u32 {
        1
    }

    fn plan_keys(&self, filter: &KeyPlanningFilter) -> KeyPlan {
        match filter {
            KeyPlanningFilter::AcceptEverything => KeyPlan::unconstrained(),
            KeyPlanningFilter::DateFilter(at) => self.date_only(at, at),
            KeyPlanningFilter::DateRangeFilter(start, end) => self.date_only(start, end),
            KeyPlanningFilter::SpatialFilter(polygon) => self.spatial(polygon, None),
            KeyPlanningFilter::SpatialDateFilter(polygon, at) => self.spatial(polygon, Some((at, at))),
            KeyPlanningFilter::SpatialDateRangeFilter(polygon, start, end) => {
                self.spatial(polygon, Some((start, end)))
            }
        }
    }

    fn plan_column_families(&self, filter: &KeyPlanningFilter) -> ColumnFamilyPlan {
        let Some(polygon) = filter.polygon() else {
            return ColumnFamilyPlan::Unconstrained;
        };
        let Some(bbox) = polygon.bounding_rect() else {
            return ColumnFamilyPlan::Unconstrained;
        };
        if estimate(&bbox, INDEX_PRECISION) > self.max_column_families {
            return ColumnFamilyPlan::Unconstrained;
        }
        let families: std::collections::BTreeSet<Vec<u8>> = geohash::covering(polygon, INDEX_PRECISION)
            .iter()
            .map(|cell| cell.as_bytes()[ROW_GEOHASH_LEN..].to_vec())
            .collect();
        if families.is_empty() {
            ColumnFamilyPlan::Unconstrained
        } else {
            ColumnFamilyPlan::Families(families)
        }
    }

    fn index_location(&self, record: &Record) -> (Vec<u8>, Vec<u8>) {
        let hash = geohash::encode(&record.geometry, INDEX_PRECISION);
        let bin = record
            .dtg
            .as_ref()
            .map(Self::date_bin)
            .unwrap_or_else(|| MISSING_DATE_BIN.to_string());
        let row = format!(
            "{:02}~{}~{}",
            self.shard_of(&record.id),
            &hash[..ROW_GEOHASH_LEN],
            bin
        );
        (row.into_bytes(), hash.as_bytes()[ROW_GEOHASH_LEN..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::{coord, point, Rect};
    use regex::Regex;

    fn planner() -> GeoHashDateKeyPlanner {
        GeoHashDateKeyPlanner::new(4, 256, 32)
    }

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    fn small_box() -> Polygon<f64> {
        Rect::new(coord! { x: -74.0, y: 40.7 }, coord! { x: -73.9, y: 40.8 }).to_polygon()
    }

    fn record() -> Record {
        Record::new("rec-1", point!(x: -73.95, y: 40.75)).with_dtg(t(2, 13))
    }

    #[test]
    fn test_accept_everything_unconstrained() {
        let plan = planner().plan_keys(&KeyPlanningFilter::AcceptEverything);
        assert!(plan.is_unconstrained());
        assert!(plan.row_regex.is_none());
    }

    #[test]
    fn test_spatial_date_range_covers_record_row() {
        let planner = planner();
        let (row, _) = planner.index_location(&record());
        let filter = KeyPlanningFilter::SpatialDateRangeFilter(small_box(), t(1, 0), t(3, 0));
        let plan = planner.plan_keys(&filter);
        assert!(plan.ranges.len() >= 1);
        assert!(plan.ranges.contains(&row));
        assert!(plan.row_regex.is_none());
    }

    #[test]
    fn test_spatial_date_excludes_other_hours() {
        let planner = planner();
        let (row, _) = planner.index_location(&record());
        let filter = KeyPlanningFilter::SpatialDateFilter(small_box(), t(2, 14));
        assert!(!planner.plan_keys(&filter).ranges.contains(&row));
    }

    #[test]
    fn test_date_only_uses_regex_refinement() {
        let planner = planner();
        let (row, _) = planner.index_location(&record());
        let plan = planner.plan_keys(&KeyPlanningFilter::DateRangeFilter(t(2, 0), t(2, 23)));
        assert_eq!(plan.ranges.len(), 4);
        assert!(plan.ranges.contains(&row));

        let regex = Regex::new(plan.row_regex.as_deref().unwrap()).unwrap();
        assert!(regex.is_match(std::str::from_utf8(&row).unwrap()));
        assert!(!regex.is_match("00~dr5~2023010100"));
    }

    #[test]
    fn test_column_families_constrained_for_small_polygon() {
        let planner = planner();
        let (_, family) = planner.index_location(&record());
        let cf_plan = planner.plan_column_families(&KeyPlanningFilter::SpatialFilter(small_box()));
        assert!(matches!(cf_plan, ColumnFamilyPlan::Families(_)));
        assert!(cf_plan.allows(&family));

        let date_only = planner.plan_column_families(&KeyPlanningFilter::DateFilter(t(1, 1)));
        assert_eq!(date_only, ColumnFamilyPlan::Unconstrained);
    }

    #[test]
    fn test_world_polygon_coarsens_with_regex() {
        let world = Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 });
        let filter = KeyPlanningFilter::SpatialDateFilter(world.to_polygon(), t(2, 13));
        let plan = planner().plan_keys(&filter);
        assert!(!plan.is_unconstrained());
        assert!(plan.row_regex.is_some());
    }
}
