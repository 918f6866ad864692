//! Store-side stage execution
//!
//! Each stage maps the entry sequence produced by the previous one. Input is
//! in key order; index entries (`id\0idx`) sort directly before their
//! record entries (`id\0rec`).

use std::collections::BTreeMap;

use geo::{Intersects, Point, Polygon, Rect};
use regex::Regex;
use serde_json::json;

use super::{Entry, Key, StoreError, StoreResult};
use crate::filter::{Evaluator, Transform};
use crate::keys::{split_qualifier, EntryKind};
use crate::planner::{DensityHint, Interval};
use crate::record::{Record, RecordCodec};
use crate::stages::{options, FeatureFilterMode, IteratorStage, StageKind};

/// Runs `stages` (already in priority order) over `entries`
pub(crate) fn run(stages: &[IteratorStage], entries: Vec<Entry>) -> StoreResult<Vec<Entry>> {
    stages
        .iter()
        .try_fold(entries, |entries, stage| run_stage(stage, entries))
}

fn run_stage(stage: &IteratorStage, entries: Vec<Entry>) -> StoreResult<Vec<Entry>> {
    match stage.kind {
        StageKind::RowRegex => {
            let regex = compile(stage)?;
            Ok(retain(entries, |e| regex.is_match(&String::from_utf8_lossy(&e.key.row))))
        }
        StageKind::ColumnFamilyRegex => {
            let regex = compile(stage)?;
            Ok(retain(entries, |e| {
                regex.is_match(&String::from_utf8_lossy(&e.key.column_family))
            }))
        }
        StageKind::AttributeIndexFilter => {
            let coarse = CoarseFilter::from_stage(stage)?;
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                if coarse.accepts(&coarse.codec.decode(&entry.value)?) {
                    out.push(entry);
                }
            }
            Ok(out)
        }
        StageKind::IndexOnly => {
            let coarse = CoarseFilter::from_stage(stage)?;
            let mut out = Vec::new();
            for entry in entries {
                if !matches!(split_qualifier(&entry.key.column_qualifier), Some((_, EntryKind::Index))) {
                    continue;
                }
                if coarse.accepts(&coarse.codec.decode(&entry.value)?) {
                    out.push(entry);
                }
            }
            Ok(out)
        }
        StageKind::Intersecting => intersecting(stage, entries),
        StageKind::FeatureFilter => feature_filter(stage, entries),
    }
}

fn compile(stage: &IteratorStage) -> StoreResult<Regex> {
    let pattern = stage.required(options::REGEX)?;
    Regex::new(pattern).map_err(|e| StoreError::stage_rejected(&stage.name, e.to_string()))
}

fn retain(mut entries: Vec<Entry>, keep: impl Fn(&Entry) -> bool) -> Vec<Entry> {
    entries.retain(|e| keep(e));
    entries
}

/// Geometry/time refinement applied to index entries
struct CoarseFilter {
    codec: &'static dyn RecordCodec,
    polygon: Option<Polygon<f64>>,
    interval: Option<Interval>,
}

impl CoarseFilter {
    fn from_stage(stage: &IteratorStage) -> StoreResult<Self> {
        Ok(Self {
            codec: stage.codec()?,
            polygon: stage.polygon()?,
            interval: stage.interval()?,
        })
    }

    fn accepts(&self, record: &Record) -> bool {
        let spatial = self
            .polygon
            .as_ref()
            .map_or(true, |p| record.geometry.intersects(p));
        let temporal = self
            .interval
            .as_ref()
            .map_or(true, |i| record.dtg.map_or(false, |dtg| i.contains(&dtg)));
        spatial && temporal
    }
}

/// Emits the record entry following each accepted index entry
fn intersecting(stage: &IteratorStage, entries: Vec<Entry>) -> StoreResult<Vec<Entry>> {
    let coarse = CoarseFilter::from_stage(stage)?;
    let mut accepted: Option<Key> = None;
    let mut out = Vec::new();

    for entry in entries {
        match split_qualifier(&entry.key.column_qualifier) {
            Some((id, EntryKind::Index)) => {
                let id = id.to_vec();
                accepted = if coarse.accepts(&coarse.codec.decode(&entry.value)?) {
                    Some(Key::new(entry.key.row, entry.key.column_family, id))
                } else {
                    None
                };
            }
            Some((id, EntryKind::Record)) => {
                let paired = accepted.as_ref().map_or(false, |key| {
                    key.row == entry.key.row
                        && key.column_family == entry.key.column_family
                        && key.column_qualifier == id
                });
                if paired {
                    out.push(entry);
                }
                accepted = None;
            }
            None => accepted = None,
        }
    }
    Ok(out)
}

fn feature_filter(stage: &IteratorStage, entries: Vec<Entry>) -> StoreResult<Vec<Entry>> {
    let codec = stage.codec()?;
    let transform = stage.transform()?;

    match stage.feature_mode()? {
        FeatureFilterMode::Filter(predicate) => {
            let geometry = stage.required(options::GEOMETRY_ATTRIBUTE)?;
            let dtg = stage.required(options::DTG_ATTRIBUTE)?;
            let evaluator = Evaluator::new(predicate, geometry, dtg)
                .map_err(|e| StoreError::stage_rejected(&stage.name, e.to_string()))?;

            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                let record = codec.decode(&entry.value)?;
                if !evaluator.matches(&record) {
                    continue;
                }
                out.push(match &transform {
                    Some(t) => project(codec, t, entry.key, &record)?,
                    None => entry,
                });
            }
            Ok(out)
        }
        FeatureFilterMode::Density(hint) => density(codec, transform.as_ref(), &hint, entries),
    }
}

fn project(
    codec: &dyn RecordCodec,
    transform: &Transform,
    key: Key,
    record: &Record,
) -> StoreResult<Entry> {
    Ok(Entry {
        key,
        value: codec.encode(&transform.apply(record))?,
    })
}

/// Aggregates records into a width x height grid over the hint bbox
fn density(
    codec: &dyn RecordCodec,
    transform: Option<&Transform>,
    hint: &DensityHint,
    entries: Vec<Entry>,
) -> StoreResult<Vec<Entry>> {
    let (width, height) = (hint.width as usize, hint.height as usize);
    let cell_w = hint.bbox.width() / width as f64;
    let cell_h = hint.bbox.height() / height as f64;
    let mut counts: BTreeMap<(usize, usize), u64> = BTreeMap::new();

    for entry in entries {
        let record = codec.decode(&entry.value)?;
        if let Some(cell) = grid_cell(&hint.bbox, width, height, &record.geometry) {
            *counts.entry(cell).or_insert(0) += 1;
        }
    }

    let mut out = Vec::with_capacity(counts.len());
    for ((row, col), weight) in counts {
        let min = hint.bbox.min();
        let center = Point::new(
            min.x + (col as f64 + 0.5) * cell_w,
            min.y + (row as f64 + 0.5) * cell_h,
        );
        let id = format!("{:06}~{:06}", row, col);
        let record = Record::new(id.clone(), center).with_attribute("weight", json!(weight));
        let key = Key::new(id.into_bytes(), Vec::new(), Vec::new());
        out.push(match transform {
            Some(t) => project(codec, t, key, &record)?,
            None => Entry {
                key,
                value: codec.encode(&record)?,
            },
        });
    }
    Ok(out)
}

/// (row, column) of the cell holding `point`; max edges fold into the last cell
fn grid_cell(bbox: &Rect<f64>, width: usize, height: usize, point: &Point<f64>) -> Option<(usize, usize)> {
    if !bbox.intersects(point) {
        return None;
    }
    let min = bbox.min();
    let index = |value: f64, lo: f64, span: f64, count: usize| -> usize {
        if span <= 0.0 {
            return 0;
        }
        (((value - lo) / span * count as f64).floor() as usize).min(count - 1)
    };
    Some((
        index(point.y(), min.y, bbox.height(), height),
        index(point.x(), min.x, bbox.width(), width),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{index_qualifier, record_qualifier};
    use crate::planner::Predicate;
    use crate::record::JsonCodec;
    use geo::{coord, point};

    fn encode(record: &Record) -> Vec<u8> {
        JsonCodec.encode(record).unwrap()
    }

    fn pair(row: &str, record: &Record) -> Vec<Entry> {
        vec![
            Entry {
                key: Key::new(row.as_bytes(), b"cf".to_vec(), index_qualifier(&record.id)),
                value: encode(&record.index_entry()),
            },
            Entry {
                key: Key::new(row.as_bytes(), b"cf".to_vec(), record_qualifier(&record.id)),
                value: encode(record),
            },
        ]
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("a", point!(x: 1.0, y: 1.0)).with_attribute("name", json!("alpha")),
            Record::new("b", point!(x: 9.0, y: 9.0)).with_attribute("name", json!("beta")),
        ]
    }

    fn entries() -> Vec<Entry> {
        records().iter().flat_map(|r| pair("00~s00~0000000000", r)).collect()
    }

    fn near_origin() -> Polygon<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 5.0, y: 5.0 }).to_polygon()
    }

    #[test]
    fn test_intersecting_emits_record_entries() {
        let stage =
            IteratorStage::index_filter(StageKind::Intersecting, "json", Some(&near_origin()), None)
                .unwrap();
        let out = run(&[stage], entries()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.column_qualifier, record_qualifier("a"));
        let record = JsonCodec.decode(&out[0].value).unwrap();
        assert_eq!(record.attribute("name"), Some(&json!("alpha")));
    }

    #[test]
    fn test_index_only_emits_index_entries() {
        let stage =
            IteratorStage::index_filter(StageKind::IndexOnly, "json", Some(&near_origin()), None)
                .unwrap();
        let out = run(&[stage], entries()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.column_qualifier, index_qualifier("a"));
        assert!(JsonCodec.decode(&out[0].value).unwrap().attributes.is_empty());
    }

    #[test]
    fn test_feature_filter_after_intersecting() {
        let stages = vec![
            IteratorStage::index_filter(StageKind::Intersecting, "json", None, None).unwrap(),
            IteratorStage::feature_filter(
                "json",
                "geom",
                "dtg",
                &FeatureFilterMode::Filter(Predicate::eq("name", json!("beta"))),
                None,
            )
            .unwrap(),
        ];
        let out = run(&stages, entries()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(JsonCodec.decode(&out[0].value).unwrap().id, "b");
    }

    #[test]
    fn test_density_grid_counts() {
        let hint = DensityHint {
            bbox: Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }),
            width: 2,
            height: 2,
        };
        let stages = vec![
            IteratorStage::index_filter(StageKind::IndexOnly, "json", None, None).unwrap(),
            IteratorStage::feature_filter("json", "geom", "dtg", &FeatureFilterMode::Density(hint), None)
                .unwrap(),
        ];
        let out = run(&stages, entries()).unwrap();
        assert_eq!(out.len(), 2);
        let first = JsonCodec.decode(&out[0].value).unwrap();
        assert_eq!(first.geometry, point!(x: 2.5, y: 2.5));
        assert_eq!(first.attribute("weight"), Some(&json!(1)));
    }

    #[test]
    fn test_corrupt_value_is_fatal() {
        let mut broken = entries();
        broken[0].value = b"garbage!".to_vec();
        let stage = IteratorStage::index_filter(StageKind::Intersecting, "json", None, None).unwrap();
        let err = run(&[stage], broken).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_row_regex_filters_rows() {
        let mut all = entries();
        all.extend(pair("01~s00~0000000000", &Record::new("c", point!(x: 1.0, y: 1.0))));
        let out = run(&[IteratorStage::row_regex("^01~")], all).unwrap();
        assert_eq!(out.len(), 2);
    }
}
