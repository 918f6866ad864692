//! Planner configuration
//!
//! Loaded from a JSON document. Every field has a default, so `{}` is a
//! valid configuration describing a whole-world index with no indexed
//! attributes.

use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use geo::{coord, Rect};
use serde::{Deserialize, Serialize};

use super::errors::{PlannerError, PlannerResult};
use crate::filter::IndexDomain;
use crate::observability::{Event, Logger};
use crate::record::{codec_for_name, JSON_CODEC};

/// Attribute layout of the indexed type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_geometry_attribute")]
    pub geometry_attribute: String,

    #[serde(default = "default_dtg_attribute")]
    pub dtg_attribute: String,

    /// Non-spatial attribute names
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Attributes with a secondary index; subset of `attributes`
    #[serde(default)]
    pub indexed_attributes: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            geometry_attribute: default_geometry_attribute(),
            dtg_attribute: default_dtg_attribute(),
            attributes: Vec::new(),
            indexed_attributes: Vec::new(),
        }
    }
}

impl SchemaConfig {
    /// Returns true if `name` is the geometry, the timestamp, or a declared attribute
    pub fn knows(&self, name: &str) -> bool {
        name == self.geometry_attribute
            || name == self.dtg_attribute
            || self.attributes.iter().any(|a| a == name)
    }
}

/// Spatial and temporal bounds the index covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lon")]
    pub max_lon: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_domain_start")]
    pub start: DateTime<Utc>,
    #[serde(default = "default_domain_end")]
    pub end: DateTime<Utc>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            min_lon: default_min_lon(),
            min_lat: default_min_lat(),
            max_lon: default_max_lon(),
            max_lat: default_max_lat(),
            start: default_domain_start(),
            end: default_domain_end(),
        }
    }
}

impl DomainConfig {
    pub fn index_domain(&self) -> IndexDomain {
        IndexDomain::new(
            Rect::new(
                coord! { x: self.min_lon, y: self.min_lat },
                coord! { x: self.max_lon, y: self.max_lat },
            ),
            self.start,
            self.end,
        )
    }
}

/// Store table names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_records_table")]
    pub records: String,
    #[serde(default = "default_spatio_temporal_table")]
    pub spatio_temporal: String,
    #[serde(default = "default_attribute_table")]
    pub attribute: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            records: default_records_table(),
            spatio_temporal: default_spatio_temporal_table(),
            attribute: default_attribute_table(),
        }
    }
}

/// Complete planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_type_name")]
    pub type_name: String,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub domain: DomainConfig,

    #[serde(default)]
    pub tables: TableConfig,

    /// Record codec name carried in stage options
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Selects the key planner
    #[serde(default = "default_key_schema_version")]
    pub key_schema_version: u32,

    #[serde(default = "default_shards")]
    pub shards: u32,

    /// Geohash cells per shard before the covering is coarsened
    #[serde(default = "default_max_ranges")]
    pub max_ranges: usize,

    /// Column families planned before falling back to unconstrained
    #[serde(default = "default_max_column_families")]
    pub max_column_families: usize,

    /// Families fetched directly; larger sets become a regex stage
    #[serde(default = "default_max_fetch_families")]
    pub max_fetch_families: usize,

    /// Best-effort row regex refinement
    #[serde(default = "default_row_regex_enabled")]
    pub row_regex_enabled: bool,
}

fn default_type_name() -> String {
    "feature".to_string()
}
fn default_geometry_attribute() -> String {
    "geom".to_string()
}
fn default_dtg_attribute() -> String {
    "dtg".to_string()
}
fn default_min_lon() -> f64 {
    -180.0
}
fn default_min_lat() -> f64 {
    -90.0
}
fn default_max_lon() -> f64 {
    180.0
}
fn default_max_lat() -> f64 {
    90.0
}
fn default_domain_start() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}
fn default_domain_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}
fn default_records_table() -> String {
    "records".to_string()
}
fn default_spatio_temporal_table() -> String {
    "spatio_temporal".to_string()
}
fn default_attribute_table() -> String {
    "attribute".to_string()
}
fn default_codec() -> String {
    JSON_CODEC.to_string()
}
fn default_key_schema_version() -> u32 {
    1
}
fn default_shards() -> u32 {
    4
}
fn default_max_ranges() -> usize {
    256
}
fn default_max_column_families() -> usize {
    32
}
fn default_max_fetch_families() -> usize {
    16
}
fn default_row_regex_enabled() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            type_name: default_type_name(),
            schema: SchemaConfig::default(),
            domain: DomainConfig::default(),
            tables: TableConfig::default(),
            codec: default_codec(),
            key_schema_version: default_key_schema_version(),
            shards: default_shards(),
            max_ranges: default_max_ranges(),
            max_column_families: default_max_column_families(),
            max_fetch_families: default_max_fetch_families(),
            row_regex_enabled: default_row_regex_enabled(),
        }
    }
}

impl PlannerConfig {
    /// Loads and validates configuration from a JSON file
    pub fn load(path: &Path) -> PlannerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlannerError::config_invalid(format!("Failed to read config: {}", e))
        })?;
        let config = Self::from_json(&content)?;
        let path_str = path.display().to_string();
        Logger::event(
            Event::ConfigLoaded,
            &[("path", &path_str), ("type_name", &config.type_name)],
        );
        Ok(config)
    }

    /// Parses and validates configuration from JSON text
    pub fn from_json(content: &str) -> PlannerResult<Self> {
        let config: PlannerConfig = serde_json::from_str(content)
            .map_err(|e| PlannerError::config_invalid(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.type_name.is_empty() {
            return Err(PlannerError::config_invalid("type_name must not be empty"));
        }

        let schema = &self.schema;
        if schema.geometry_attribute == schema.dtg_attribute {
            return Err(PlannerError::config_invalid(
                "geometry_attribute and dtg_attribute must differ",
            ));
        }
        for name in &schema.attributes {
            if *name == schema.geometry_attribute || *name == schema.dtg_attribute {
                return Err(PlannerError::config_invalid(format!(
                    "Attribute '{}' shadows a built-in attribute",
                    name
                )));
            }
        }
        if let Some(name) = schema
            .indexed_attributes
            .iter()
            .find(|name| !schema.attributes.contains(name))
        {
            return Err(PlannerError::config_invalid(format!(
                "Indexed attribute '{}' is not a declared attribute",
                name
            )));
        }

        let domain = &self.domain;
        if !(domain.min_lon < domain.max_lon && domain.min_lat < domain.max_lat) {
            return Err(PlannerError::config_invalid("Domain bounding box is degenerate"));
        }
        if domain.min_lon < -180.0 || domain.max_lon > 180.0 {
            return Err(PlannerError::config_invalid("Domain longitude outside [-180, 180]"));
        }
        if domain.min_lat < -90.0 || domain.max_lat > 90.0 {
            return Err(PlannerError::config_invalid("Domain latitude outside [-90, 90]"));
        }
        if domain.start >= domain.end {
            return Err(PlannerError::config_invalid("Domain start must precede end"));
        }

        let tables = &self.tables;
        if tables.records.is_empty() || tables.spatio_temporal.is_empty() || tables.attribute.is_empty()
        {
            return Err(PlannerError::config_invalid("Table names must not be empty"));
        }
        if tables.records == tables.spatio_temporal
            || tables.records == tables.attribute
            || tables.spatio_temporal == tables.attribute
        {
            return Err(PlannerError::config_invalid("Table names must be distinct"));
        }

        if codec_for_name(&self.codec).is_none() {
            return Err(PlannerError::config_invalid(format!(
                "Unknown codec '{}'",
                self.codec
            )));
        }
        if self.shards == 0 || self.shards > 100 {
            return Err(PlannerError::config_invalid("shards must be in 1..=100"));
        }
        if self.max_ranges == 0 {
            return Err(PlannerError::config_invalid("max_ranges must be > 0"));
        }
        if self.max_fetch_families == 0 {
            return Err(PlannerError::config_invalid("max_fetch_families must be > 0"));
        }
        Ok(())
    }

    pub fn index_domain(&self) -> IndexDomain {
        self.domain.index_domain()
    }
}
