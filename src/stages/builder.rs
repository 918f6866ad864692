//! IteratorStackBuilder
//!
//! Collects stages in any order and yields them sorted by priority. The
//! builder rejects duplicate names and a second occupant of the exclusive
//! priority-200 slot. Stages sharing a priority keep their push order.

use geo::Polygon;

use super::{FeatureFilterMode, IteratorStage, StageKind};
use crate::filter::Transform;
use crate::planner::{DensityHint, Interval, PlannerError, PlannerResult, Predicate};
use crate::store::{Store, StoreResult};

/// Name of the density-mode feature filter instance
pub const DENSITY_STAGE_NAME: &str = "feature-filter-density";

/// Work left for priority-300 feature filters.
///
/// Residual evaluation and density aggregation run as separate stage
/// instances, residual first. The transform rides on the last instance and
/// applies to that instance's output records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureStage {
    pub filter: Option<Predicate>,
    pub density: Option<DensityHint>,
    pub transform: Option<Transform>,
}

impl FeatureStage {
    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.density.is_none() && self.transform.is_none()
    }

    fn push_into(
        &self,
        builder: &mut IteratorStackBuilder,
        codec: &str,
        geometry_attribute: &str,
        dtg_attribute: &str,
    ) -> PlannerResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let filter = match (&self.filter, &self.density) {
            (Some(predicate), _) => Some(predicate.clone()),
            (None, None) => Some(Predicate::Include),
            (None, Some(_)) => None,
        };
        if let Some(predicate) = filter {
            let transform = match self.density {
                Some(_) => None,
                None => self.transform.as_ref(),
            };
            builder.push(IteratorStage::feature_filter(
                codec,
                geometry_attribute,
                dtg_attribute,
                &FeatureFilterMode::Filter(predicate),
                transform,
            )?)?;
        }
        if let Some(hint) = self.density {
            builder.push(
                IteratorStage::feature_filter(
                    codec,
                    geometry_attribute,
                    dtg_attribute,
                    &FeatureFilterMode::Density(hint),
                    self.transform.as_ref(),
                )?
                .with_name(DENSITY_STAGE_NAME),
            )?;
        }
        Ok(())
    }
}

/// Inputs for the direct spatio-temporal scan stack
#[derive(Debug, Clone)]
pub struct SpatioTemporalStages<'a> {
    pub codec: &'a str,
    pub geometry_attribute: &'a str,
    pub dtg_attribute: &'a str,
    pub row_regex: Option<&'a str>,
    pub family_regex: Option<String>,
    /// Index-only when true, intersecting otherwise
    pub index_only: bool,
    pub polygon: Option<&'a Polygon<f64>>,
    pub interval: Option<&'a Interval>,
    pub feature: FeatureStage,
}

#[derive(Debug, Default)]
pub struct IteratorStackBuilder {
    stages: Vec<IteratorStage>,
}

impl IteratorStackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage
    pub fn push(&mut self, stage: IteratorStage) -> PlannerResult<&mut Self> {
        if self.stages.iter().any(|s| s.name == stage.name) {
            return Err(PlannerError::stage_conflict(format!(
                "Duplicate stage name '{}'",
                stage.name
            )));
        }
        let exclusive = StageKind::IndexOnly.priority();
        if stage.priority == exclusive && self.stages.iter().any(|s| s.priority == exclusive) {
            return Err(PlannerError::stage_conflict(format!(
                "Priority {} already occupied; '{}' rejected",
                exclusive, stage.name
            )));
        }
        self.stages.push(stage);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages in ascending priority order
    pub fn build(mut self) -> Vec<IteratorStage> {
        self.stages.sort_by_key(|s| s.priority);
        self.stages
    }

    /// Submits `stages` to the store in ascending priority order
    pub fn apply<S: Store>(
        store: &S,
        handle: &mut S::Handle,
        stages: &[IteratorStage],
    ) -> StoreResult<()> {
        let mut ordered: Vec<&IteratorStage> = stages.iter().collect();
        ordered.sort_by_key(|s| s.priority);
        for stage in ordered {
            store.push_stage(handle, stage.clone())?;
        }
        Ok(())
    }

    /// Stack for a direct spatio-temporal scan.
    ///
    /// Exactly one priority-200 stage is always present.
    pub fn spatio_temporal(inputs: SpatioTemporalStages<'_>) -> PlannerResult<Vec<IteratorStage>> {
        let mut builder = Self::new();
        if let Some(regex) = inputs.row_regex {
            builder.push(IteratorStage::row_regex(regex))?;
        }
        if let Some(regex) = inputs.family_regex {
            builder.push(IteratorStage::column_family_regex(regex))?;
        }
        let kind = if inputs.index_only {
            StageKind::IndexOnly
        } else {
            StageKind::Intersecting
        };
        builder.push(IteratorStage::index_filter(
            kind,
            inputs.codec,
            inputs.polygon,
            inputs.interval,
        )?)?;
        inputs.feature.push_into(
            &mut builder,
            inputs.codec,
            inputs.geometry_attribute,
            inputs.dtg_attribute,
        )?;
        Ok(builder.build())
    }

    /// Phase-1 stack for an attribute-index scan: a coarse refinement
    /// when the query also constrains geometry or time
    pub fn attribute_index(
        codec: &str,
        polygon: Option<&Polygon<f64>>,
        interval: Option<&Interval>,
    ) -> PlannerResult<Vec<IteratorStage>> {
        let mut builder = Self::new();
        if polygon.is_some() || interval.is_some() {
            builder.push(IteratorStage::index_filter(
                StageKind::AttributeIndexFilter,
                codec,
                polygon,
                interval,
            )?)?;
        }
        Ok(builder.build())
    }

    /// Phase-2 stack over the record table: always one feature filter
    pub fn record_lookup(
        codec: &str,
        geometry_attribute: &str,
        dtg_attribute: &str,
        filter: Predicate,
        transform: Option<&Transform>,
    ) -> PlannerResult<Vec<IteratorStage>> {
        let mut builder = Self::new();
        builder.push(IteratorStage::feature_filter(
            codec,
            geometry_attribute,
            dtg_attribute,
            &FeatureFilterMode::Filter(filter),
            transform,
        )?)?;
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, Rect};
    use serde_json::json;

    fn inputs<'a>() -> SpatioTemporalStages<'a> {
        SpatioTemporalStages {
            codec: "json",
            geometry_attribute: "geom",
            dtg_attribute: "dtg",
            row_regex: Some("^00"),
            family_regex: Some("^(ab|cd)$".to_string()),
            index_only: false,
            polygon: None,
            interval: None,
            feature: FeatureStage {
                filter: Some(Predicate::eq("name", json!("a"))),
                ..FeatureStage::default()
            },
        }
    }

    #[test]
    fn test_build_sorts_by_priority() {
        let mut builder = IteratorStackBuilder::new();
        builder
            .push(IteratorStage::new(StageKind::FeatureFilter))
            .unwrap()
            .push(IteratorStage::new(StageKind::Intersecting))
            .unwrap()
            .push(IteratorStage::row_regex("^x"))
            .unwrap()
            .push(IteratorStage::column_family_regex("^y"))
            .unwrap();
        let priorities: Vec<i32> = builder.build().iter().map(|s| s.priority).collect();
        assert_eq!(priorities, vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_exclusive_slot_conflict() {
        let mut builder = IteratorStackBuilder::new();
        builder.push(IteratorStage::new(StageKind::IndexOnly)).unwrap();
        let err = builder
            .push(IteratorStage::new(StageKind::Intersecting))
            .unwrap_err();
        assert_eq!(err.code().code(), "AERO_STAGE_CONFLICT");
    }

    #[test]
    fn test_duplicate_name_conflict() {
        let mut builder = IteratorStackBuilder::new();
        builder.push(IteratorStage::row_regex("a")).unwrap();
        assert!(builder.push(IteratorStage::row_regex("b")).is_err());
        assert!(builder
            .push(IteratorStage::row_regex("b").with_name("row-regex-2"))
            .is_ok());
    }

    #[test]
    fn test_spatio_temporal_single_exclusive_stage() {
        let stages = IteratorStackBuilder::spatio_temporal(inputs()).unwrap();
        let kinds: Vec<StageKind> = stages.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::RowRegex,
                StageKind::ColumnFamilyRegex,
                StageKind::Intersecting,
                StageKind::FeatureFilter
            ]
        );
    }

    #[test]
    fn test_index_only_without_feature_stage() {
        let mut minimal = inputs();
        minimal.index_only = true;
        minimal.feature = FeatureStage::default();
        minimal.row_regex = None;
        minimal.family_regex = None;
        let stages = IteratorStackBuilder::spatio_temporal(minimal).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].kind, StageKind::IndexOnly);
    }

    #[test]
    fn test_density_and_residual_split_into_two_instances() {
        let mut dense = inputs();
        dense.feature.density = Some(DensityHint {
            bbox: Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }),
            width: 2,
            height: 2,
        });
        let stages = IteratorStackBuilder::spatio_temporal(dense).unwrap();
        let features: Vec<(&str, Option<&str>)> = stages
            .iter()
            .filter(|s| s.kind == StageKind::FeatureFilter)
            .map(|s| (s.name.as_str(), s.option(crate::stages::options::MODE)))
            .collect();
        assert_eq!(
            features,
            vec![
                ("feature-filter", Some("filter")),
                (DENSITY_STAGE_NAME, Some("density"))
            ]
        );
    }

    #[test]
    fn test_transform_alone_adds_pass_through_filter() {
        let mut projected = inputs();
        projected.feature = FeatureStage {
            transform: Some(Transform::parse("name", "name:String").unwrap()),
            ..FeatureStage::default()
        };
        let stages = IteratorStackBuilder::spatio_temporal(projected).unwrap();
        let last = stages.last().unwrap();
        assert_eq!(last.kind, StageKind::FeatureFilter);
        assert_eq!(last.feature_mode().unwrap(), FeatureFilterMode::Filter(Predicate::Include));
        assert!(last.transform().unwrap().is_some());
    }

    #[test]
    fn test_attribute_index_stage_only_with_hints() {
        assert!(IteratorStackBuilder::attribute_index("json", None, None)
            .unwrap()
            .is_empty());
    }
}
