//! Record codecs
//!
//! Encoded layout for the JSON codec:
//!
//! ```text
//! +------------------+
//! | JSON payload     | (serde_json bytes)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of payload)
//! +------------------+
//! ```

use super::checksum::{compute_checksum, verify_checksum};
use super::Record;
use crate::store::{StoreError, StoreResult};

/// Name of the checksummed JSON codec
pub const JSON_CODEC: &str = "json";

/// Encodes and decodes records to and from value bytes
pub trait RecordCodec: Send + Sync {
    /// Name carried in stage options
    fn name(&self) -> &'static str;

    fn encode(&self, record: &Record) -> StoreResult<Vec<u8>>;

    /// Decodes a value; any failure is data corruption
    fn decode(&self, bytes: &[u8]) -> StoreResult<Record>;
}

impl std::fmt::Debug for dyn RecordCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCodec").field("name", &self.name()).finish()
    }
}

/// JSON codec with a CRC32 trailer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn name(&self) -> &'static str {
        JSON_CODEC
    }

    fn encode(&self, record: &Record) -> StoreResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec(record)
            .map_err(|e| StoreError::codec_failed(format!("encode '{}': {}", record.id, e)))?;
        let checksum = compute_checksum(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> StoreResult<Record> {
        if bytes.len() < 4 {
            return Err(StoreError::data_corruption("value shorter than checksum"));
        }
        let (payload, trailer) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if !verify_checksum(payload, expected) {
            return Err(StoreError::data_corruption("checksum mismatch"));
        }
        serde_json::from_slice(payload)
            .map_err(|e| StoreError::data_corruption(format!("undecodable record: {}", e)))
    }
}

/// Looks up a codec by the name carried in stage options
pub fn codec_for_name(name: &str) -> Option<&'static dyn RecordCodec> {
    match name {
        JSON_CODEC => Some(&JsonCodec),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use geo::point;
    use serde_json::json;

    fn sample() -> Record {
        Record::new("r1", point!(x: -73.9, y: 40.7))
            .with_dtg(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
            .with_attribute("name", json!("alpha"))
    }

    #[test]
    fn test_decode_restores_record() {
        let bytes = JsonCodec.encode(&sample()).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_corruption_is_fatal() {
        let mut bytes = JsonCodec.encode(&sample()).unwrap();
        bytes[2] ^= 0x20;
        let err = JsonCodec.decode(&bytes).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code().code(), "AERO_DATA_CORRUPTION");
    }

    #[test]
    fn test_truncated_value_rejected() {
        assert!(JsonCodec.decode(&[1, 2]).unwrap_err().is_fatal());
    }

    #[test]
    fn test_codec_registry() {
        assert_eq!(codec_for_name("json").map(|c| c.name()), Some("json"));
        assert!(codec_for_name("avro").is_none());
    }
}
