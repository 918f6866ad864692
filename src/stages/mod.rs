//! Push-down stage catalog
//!
//! Stages execute store-side in ascending priority order:
//!
//! | Priority | Stage |
//! |---|---|
//! | 0 | row-regex |
//! | 10 | attribute-index-filter |
//! | 100 | column-family-regex |
//! | 200 | index-only XOR intersecting |
//! | 300 | feature-filter |
//!
//! Stage configuration is a flat string map so that any store can carry it.
//! The codec name always travels with stages that decode values.

mod builder;

pub use builder::{FeatureStage, IteratorStackBuilder, SpatioTemporalStages, DENSITY_STAGE_NAME};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo::{Polygon, Rect};
use serde::de::DeserializeOwned;

use crate::filter::Transform;
use crate::planner::{DensityHint, Interval, PlannerError, PlannerResult, Predicate};
use crate::record::{codec_for_name, RecordCodec};
use crate::store::{StoreError, StoreResult};

/// Option keys
pub mod options {
    pub const CODEC: &str = "codec";
    pub const REGEX: &str = "regex";
    pub const POLYGON: &str = "polygon";
    pub const INTERVAL_START: &str = "interval.start";
    pub const INTERVAL_END: &str = "interval.end";
    pub const MODE: &str = "mode";
    pub const FILTER: &str = "filter";
    pub const DENSITY_BBOX: &str = "density.bbox";
    pub const DENSITY_WIDTH: &str = "density.width";
    pub const DENSITY_HEIGHT: &str = "density.height";
    pub const TRANSFORM: &str = "transform";
    pub const TRANSFORM_SCHEMA: &str = "transform.schema";
    pub const GEOMETRY_ATTRIBUTE: &str = "schema.geometry";
    pub const DTG_ATTRIBUTE: &str = "schema.dtg";

    pub const MODE_FILTER: &str = "filter";
    pub const MODE_DENSITY: &str = "density";
}

/// Kinds of push-down stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    RowRegex,
    AttributeIndexFilter,
    ColumnFamilyRegex,
    /// Rebuilds output from the index entry alone
    IndexOnly,
    /// Index entry as coarse filter, full record read from the adjacent entry
    Intersecting,
    FeatureFilter,
}

impl StageKind {
    pub fn priority(&self) -> i32 {
        match self {
            StageKind::RowRegex => 0,
            StageKind::AttributeIndexFilter => 10,
            StageKind::ColumnFamilyRegex => 100,
            StageKind::IndexOnly | StageKind::Intersecting => 200,
            StageKind::FeatureFilter => 300,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::RowRegex => "row-regex",
            StageKind::AttributeIndexFilter => "attribute-index-filter",
            StageKind::ColumnFamilyRegex => "column-family-regex",
            StageKind::IndexOnly => "index-only",
            StageKind::Intersecting => "intersecting",
            StageKind::FeatureFilter => "feature-filter",
        }
    }
}

/// Active mode of a feature-filter stage; exactly one per stage
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureFilterMode {
    Filter(Predicate),
    Density(DensityHint),
}

/// One push-down stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorStage {
    pub priority: i32,
    /// Unique per scan
    pub name: String,
    pub kind: StageKind,
    pub options: BTreeMap<String, String>,
}

fn to_option<T: serde::Serialize>(key: &str, value: &T) -> PlannerResult<String> {
    serde_json::to_string(value)
        .map_err(|e| PlannerError::query_invalid(format!("Cannot encode stage option '{}': {}", key, e)))
}

impl IteratorStage {
    /// Stage at the catalog priority with the default name
    pub fn new(kind: StageKind) -> Self {
        Self {
            priority: kind.priority(),
            name: kind.as_str().to_string(),
            kind,
            options: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn row_regex(regex: impl Into<String>) -> Self {
        Self::new(StageKind::RowRegex).with_option(options::REGEX, regex)
    }

    pub fn column_family_regex(regex: impl Into<String>) -> Self {
        Self::new(StageKind::ColumnFamilyRegex).with_option(options::REGEX, regex)
    }

    /// Index-entry stage (priority 10 or 200) refining on geometry and time
    pub fn index_filter(
        kind: StageKind,
        codec: &str,
        polygon: Option<&Polygon<f64>>,
        interval: Option<&Interval>,
    ) -> PlannerResult<Self> {
        let mut stage = Self::new(kind).with_option(options::CODEC, codec);
        if let Some(polygon) = polygon {
            stage = stage.with_option(options::POLYGON, to_option(options::POLYGON, polygon)?);
        }
        if let Some(interval) = interval {
            stage = stage
                .with_option(options::INTERVAL_START, interval.start.to_rfc3339())
                .with_option(options::INTERVAL_END, interval.end.to_rfc3339());
        }
        Ok(stage)
    }

    /// Generic feature filter (priority 300)
    pub fn feature_filter(
        codec: &str,
        geometry_attribute: &str,
        dtg_attribute: &str,
        mode: &FeatureFilterMode,
        transform: Option<&Transform>,
    ) -> PlannerResult<Self> {
        let mut stage = Self::new(StageKind::FeatureFilter)
            .with_option(options::CODEC, codec)
            .with_option(options::GEOMETRY_ATTRIBUTE, geometry_attribute)
            .with_option(options::DTG_ATTRIBUTE, dtg_attribute);
        stage = match mode {
            FeatureFilterMode::Filter(predicate) => stage
                .with_option(options::MODE, options::MODE_FILTER)
                .with_option(options::FILTER, to_option(options::FILTER, predicate)?),
            FeatureFilterMode::Density(hint) => stage
                .with_option(options::MODE, options::MODE_DENSITY)
                .with_option(options::DENSITY_BBOX, to_option(options::DENSITY_BBOX, &hint.bbox)?)
                .with_option(options::DENSITY_WIDTH, hint.width.to_string())
                .with_option(options::DENSITY_HEIGHT, hint.height.to_string()),
        };
        if let Some(transform) = transform {
            stage = stage
                .with_option(options::TRANSFORM, transform.expression())
                .with_option(options::TRANSFORM_SCHEMA, transform.schema());
        }
        Ok(stage)
    }

    // Store-side decoding. Malformed options reject the stage.

    fn reject(&self, reason: impl Into<String>) -> StoreError {
        StoreError::stage_rejected(&self.name, reason)
    }

    pub fn required(&self, key: &str) -> StoreResult<&str> {
        self.option(key)
            .ok_or_else(|| self.reject(format!("missing option '{}'", key)))
    }

    fn parse_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.option(key)
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| self.reject(format!("option '{}': {}", key, e)))
            })
            .transpose()
    }

    fn parse_instant(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        self.option(key)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| self.reject(format!("option '{}': {}", key, e)))
            })
            .transpose()
    }

    /// Codec named by the stage
    pub fn codec(&self) -> StoreResult<&'static dyn RecordCodec> {
        let name = self.required(options::CODEC)?;
        codec_for_name(name).ok_or_else(|| self.reject(format!("unknown codec '{}'", name)))
    }

    pub fn polygon(&self) -> StoreResult<Option<Polygon<f64>>> {
        self.parse_json(options::POLYGON)
    }

    pub fn interval(&self) -> StoreResult<Option<Interval>> {
        match (
            self.parse_instant(options::INTERVAL_START)?,
            self.parse_instant(options::INTERVAL_END)?,
        ) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Interval::new(start, end)
                .map(Some)
                .map_err(|e| self.reject(e.message().to_string())),
            _ => Err(self.reject("interval bounds must be supplied together")),
        }
    }

    pub fn feature_mode(&self) -> StoreResult<FeatureFilterMode> {
        match self.required(options::MODE)? {
            options::MODE_FILTER => {
                let predicate = self
                    .parse_json::<Predicate>(options::FILTER)?
                    .ok_or_else(|| self.reject("filter mode without a filter"))?;
                Ok(FeatureFilterMode::Filter(predicate))
            }
            options::MODE_DENSITY => {
                let bbox = self
                    .parse_json::<Rect<f64>>(options::DENSITY_BBOX)?
                    .ok_or_else(|| self.reject("density mode without a bbox"))?;
                let dimension = |key: &str| -> StoreResult<u32> {
                    match self.required(key)?.parse::<u32>() {
                        Ok(0) => Err(self.reject(format!("option '{}' must be > 0", key))),
                        Ok(value) => Ok(value),
                        Err(e) => Err(self.reject(format!("option '{}': {}", key, e))),
                    }
                };
                Ok(FeatureFilterMode::Density(DensityHint {
                    bbox,
                    width: dimension(options::DENSITY_WIDTH)?,
                    height: dimension(options::DENSITY_HEIGHT)?,
                }))
            }
            other => Err(self.reject(format!("unknown mode '{}'", other))),
        }
    }

    pub fn transform(&self) -> StoreResult<Option<Transform>> {
        match (self.option(options::TRANSFORM), self.option(options::TRANSFORM_SCHEMA)) {
            (None, None) => Ok(None),
            (Some(expression), Some(schema)) => Transform::parse(expression, schema)
                .map(Some)
                .map_err(|e| self.reject(e.message().to_string())),
            _ => Err(self.reject("transform requires expression and schema")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::coord;
    use serde_json::json;

    #[test]
    fn test_catalog_priorities() {
        assert_eq!(StageKind::RowRegex.priority(), 0);
        assert_eq!(StageKind::AttributeIndexFilter.priority(), 10);
        assert_eq!(StageKind::ColumnFamilyRegex.priority(), 100);
        assert_eq!(StageKind::IndexOnly.priority(), 200);
        assert_eq!(StageKind::Intersecting.priority(), 200);
        assert_eq!(StageKind::FeatureFilter.priority(), 300);
    }

    #[test]
    fn test_index_filter_options_decode() {
        let polygon = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon();
        let interval = Interval::instant(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let stage =
            IteratorStage::index_filter(StageKind::Intersecting, "json", Some(&polygon), Some(&interval))
                .unwrap();

        assert_eq!(stage.priority, 200);
        assert_eq!(stage.polygon().unwrap(), Some(polygon));
        assert_eq!(stage.interval().unwrap(), Some(interval));
        assert_eq!(stage.codec().unwrap().name(), "json");
    }

    #[test]
    fn test_feature_filter_single_mode() {
        let predicate = Predicate::eq("name", json!("a"));
        let stage = IteratorStage::feature_filter(
            "json",
            "geom",
            "dtg",
            &FeatureFilterMode::Filter(predicate.clone()),
            None,
        )
        .unwrap();
        assert_eq!(stage.option(options::MODE), Some("filter"));
        assert!(stage.option(options::DENSITY_BBOX).is_none());
        assert_eq!(stage.feature_mode().unwrap(), FeatureFilterMode::Filter(predicate));
        assert!(stage.transform().unwrap().is_none());
    }

    #[test]
    fn test_malformed_options_rejected() {
        let stage = IteratorStage::new(StageKind::FeatureFilter)
            .with_option(options::CODEC, "xml")
            .with_option(options::MODE, "both");
        assert_eq!(stage.codec().unwrap_err().code().code(), "AERO_STAGE_REJECTED");
        assert!(stage.feature_mode().is_err());

        let partial = IteratorStage::new(StageKind::FeatureFilter)
            .with_option(options::TRANSFORM, "name");
        assert!(partial.transform().is_err());
    }
}
