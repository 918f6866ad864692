//! Entry layouts shared by the writer and store-side stages
//!
//! Spatio-temporal table: each record has two adjacent entries under the
//! same row and column family, `id\0idx` (index entry) sorting before
//! `id\0rec` (full record).
//!
//! Attribute table: row `property\0literal`, column family = pointer (the
//! record's row in the record table), value = encoded index entry.

use serde_json::{Number, Value};

use super::KeyRange;

const INDEX_SUFFIX: &[u8] = b"\0idx";
const RECORD_SUFFIX: &[u8] = b"\0rec";

/// Kind of a spatio-temporal table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Index,
    Record,
}

pub fn index_qualifier(id: &str) -> Vec<u8> {
    [id.as_bytes(), INDEX_SUFFIX].concat()
}

pub fn record_qualifier(id: &str) -> Vec<u8> {
    [id.as_bytes(), RECORD_SUFFIX].concat()
}

/// Splits a spatio-temporal qualifier into record id and entry kind
pub fn split_qualifier(qualifier: &[u8]) -> Option<(&[u8], EntryKind)> {
    if let Some(id) = qualifier.strip_suffix(INDEX_SUFFIX) {
        return Some((id, EntryKind::Index));
    }
    qualifier
        .strip_suffix(RECORD_SUFFIX)
        .map(|id| (id, EntryKind::Record))
}

/// Lexicographic attribute-index row: `property ++ NUL ++ literal`
pub fn attribute_row(property: &str, literal: &str) -> Vec<u8> {
    let mut row = Vec::with_capacity(property.len() + literal.len() + 1);
    row.extend_from_slice(property.as_bytes());
    row.push(0);
    row.extend_from_slice(literal.as_bytes());
    row
}

/// Single-row range over the exact encoding
pub fn attribute_exact_range(property: &str, literal: &str) -> KeyRange {
    KeyRange::exact(attribute_row(property, literal))
}

/// Byte-prefix range over `property ++ NUL ++ prefix`
pub fn attribute_prefix_range(property: &str, prefix: &str) -> KeyRange {
    KeyRange::prefix(attribute_row(property, prefix))
}

/// Numbers at or beyond this magnitude are not indexed: integers and
/// floats there stop comparing equal exactly when their text does.
const MAX_INDEXED_MAGNITUDE: f64 = 9_007_199_254_740_992.0; // 2^53

/// String form of a literal as written into attribute rows.
///
/// Only scalars are indexable. Numbers that compare equal share one
/// encoding, so `30` and `30.0` land on the same row.
pub fn encode_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => encode_number(n),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn encode_number(n: &Number) -> Option<String> {
    if let Some(i) = n.as_i64() {
        return ((i.unsigned_abs() as f64) < MAX_INDEXED_MAGNITUDE).then(|| i.to_string());
    }
    let f = n.as_f64()?;
    if !f.is_finite() || f.abs() >= MAX_INDEXED_MAGNITUDE {
        return None;
    }
    if f.fract() == 0.0 {
        Some((f as i64).to_string())
    } else {
        Some(f.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_qualifier_order_index_first() {
        assert!(index_qualifier("a") < record_qualifier("a"));
        assert_eq!(
            split_qualifier(&index_qualifier("r7")),
            Some((&b"r7"[..], EntryKind::Index))
        );
        assert_eq!(split_qualifier(b"r7"), None);
    }

    #[test]
    fn test_attribute_ranges() {
        let exact = attribute_exact_range("name", "abc");
        assert!(exact.contains(&attribute_row("name", "abc")));
        assert!(!exact.contains(&attribute_row("name", "abcd")));

        let prefix = attribute_prefix_range("name", "ab");
        assert!(prefix.contains(&attribute_row("name", "abcd")));
        assert!(!prefix.contains(&attribute_row("namex", "ab")));
        assert!(!prefix.contains(&attribute_row("name", "b")));
    }

    #[test]
    fn test_encode_literal_scalars_only() {
        assert_eq!(encode_literal(&json!("x")), Some("x".to_string()));
        assert_eq!(encode_literal(&json!(42)), Some("42".to_string()));
        assert_eq!(encode_literal(&json!(true)), Some("true".to_string()));
        assert_eq!(encode_literal(&json!(null)), None);
        assert_eq!(encode_literal(&json!([1])), None);
    }

    #[test]
    fn test_equal_numbers_share_encoding() {
        assert_eq!(encode_literal(&json!(30)), encode_literal(&json!(30.0)));
        assert_eq!(encode_literal(&json!(30.0)), Some("30".to_string()));
        assert_eq!(encode_literal(&json!(-0.0)), Some("0".to_string()));
        assert_eq!(encode_literal(&json!(-7)), Some("-7".to_string()));
        assert_eq!(encode_literal(&json!(30.5)), Some("30.5".to_string()));
        assert_ne!(encode_literal(&json!(30.5)), encode_literal(&json!(30)));
    }

    #[test]
    fn test_huge_numbers_not_indexed() {
        assert_eq!(encode_literal(&json!(9_007_199_254_740_993_i64)), None);
        assert_eq!(encode_literal(&json!(u64::MAX)), None);
        assert_eq!(encode_literal(&json!(1e300)), None);
    }
}
