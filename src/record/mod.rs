//! Records and the record codec
//!
//! A record is a point geometry, an optional timestamp, and a map of scalar
//! attributes. Values in the store are records encoded by a named codec; the
//! codec name travels in stage options so store-side decoding matches the
//! client.

mod checksum;
mod codec;

pub use checksum::compute_checksum;
pub use codec::{codec_for_name, JsonCodec, RecordCodec, JSON_CODEC};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier
    pub id: String,
    /// Point geometry
    pub geometry: Point<f64>,
    /// Record timestamp
    #[serde(default)]
    pub dtg: Option<DateTime<Utc>>,
    /// Non-spatial attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, geometry: Point<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
            dtg: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_dtg(mut self, dtg: DateTime<Utc>) -> Self {
        self.dtg = Some(dtg);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Returns an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Projection stored in index entries: id, geometry and timestamp only
    pub fn index_entry(&self) -> Record {
        Record {
            id: self.id.clone(),
            geometry: self.geometry,
            dtg: self.dtg,
            attributes: BTreeMap::new(),
        }
    }
}
