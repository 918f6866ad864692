//! Query planner
//!
//! Produces deterministic plans. Planning order:
//! 1. Validate type, properties, operands and hints
//! 2. Clip geometry and interval to the index domain
//! 3. Choose the attribute-index or spatio-temporal strategy
//! 4. Plan key ranges, column families and the stage stack
//!
//! Every planning error is raised here, before any scan opens.

use std::collections::BTreeSet;
use std::fmt;

use geo::Polygon;

use super::ast::{DensityHint, Predicate, Query};
use super::config::PlannerConfig;
use super::errors::{PlannerError, PlannerResult};
use crate::filter::{
    classify, classify_attribute_filter, is_empty_polygon, is_outside_interval, net_interval,
    net_polygon,
    AttributeShape, IndexDomain, KeyPlanningFilter, Transform,
};
use crate::keys::{
    attribute_exact_range, attribute_prefix_range, key_planner_for, ColumnFamilyPlan, KeyPlan,
    KeyPlanner, KeyRange,
};
use crate::observability::{Event, Logger};
use crate::stages::{FeatureStage, IteratorStackBuilder, IteratorStage, SpatioTemporalStages};

/// Strategy label used in logs and explain output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    SpatioTemporal,
    AttributeEquality,
    AttributePrefix,
    Empty,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SpatioTemporal => "SPATIO_TEMPORAL",
            StrategyKind::AttributeEquality => "ATTRIBUTE_EQ",
            StrategyKind::AttributePrefix => "ATTRIBUTE_PREFIX",
            StrategyKind::Empty => "EMPTY",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direct scan of the spatio-temporal table
#[derive(Debug, Clone, PartialEq)]
pub struct SpatioTemporalPlan {
    pub table: String,
    pub filter: KeyPlanningFilter,
    /// Ranges always concrete unless the filter accepts everything
    pub keys: KeyPlan,
    /// Fetch set passed to the store
    pub families: ColumnFamilyPlan,
    /// Sorted by priority
    pub stages: Vec<IteratorStage>,
    pub index_only: bool,
}

/// Two-phase lookup through the attribute index
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePlan {
    pub index_table: String,
    pub record_table: String,
    pub shape: AttributeShape,
    /// Phase-1 row range over the attribute index
    pub range: KeyRange,
    pub index_stages: Vec<IteratorStage>,
    /// Phase-2 stages; the pointer ranges are only known after phase 1
    pub record_stages: Vec<IteratorStage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryStrategy {
    SpatioTemporal(SpatioTemporalPlan),
    AttributeIndex(AttributePlan),
    /// Query lies outside the index domain; nothing is scanned
    Empty,
}

impl QueryStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            QueryStrategy::SpatioTemporal(_) => StrategyKind::SpatioTemporal,
            QueryStrategy::AttributeIndex(plan) => match plan.shape {
                AttributeShape::Prefix { .. } => StrategyKind::AttributePrefix,
                _ => StrategyKind::AttributeEquality,
            },
            QueryStrategy::Empty => StrategyKind::Empty,
        }
    }
}

/// Immutable query plan (no runtime state)
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub type_name: String,
    pub strategy: QueryStrategy,
}

/// Query planner bound to one indexed type
pub struct QueryPlanner {
    config: PlannerConfig,
    domain: IndexDomain,
    keys: Box<dyn KeyPlanner>,
}

impl fmt::Debug for QueryPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlanner")
            .field("type_name", &self.config.type_name)
            .field("key_schema_version", &self.keys.schema_version())
            .finish()
    }
}

impl QueryPlanner {
    /// Creates a planner, validating the configuration
    pub fn new(config: PlannerConfig) -> PlannerResult<Self> {
        config.validate()?;
        let keys = key_planner_for(&config)?;
        Ok(Self {
            domain: config.index_domain(),
            config,
            keys,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn domain(&self) -> &IndexDomain {
        &self.domain
    }

    pub fn key_planner(&self) -> &dyn KeyPlanner {
        self.keys.as_ref()
    }

    /// Plans a query, returning an immutable plan or error.
    ///
    /// Same inputs always give the same plan.
    pub fn plan(&self, query: &Query) -> PlannerResult<QueryPlan> {
        match self.plan_query(query) {
            Ok(plan) => {
                Logger::event(
                    Event::StrategySelected,
                    &[
                        ("type_name", &plan.type_name),
                        ("strategy", plan.strategy.kind().as_str()),
                    ],
                );
                Ok(plan)
            }
            Err(err) => {
                Logger::event(
                    Event::QueryRejected,
                    &[("code", err.code().code()), ("reason", err.message())],
                );
                Err(err)
            }
        }
    }

    fn plan_query(&self, query: &Query) -> PlannerResult<QueryPlan> {
        // 1. Validation
        if query.type_name != self.config.type_name {
            return Err(PlannerError::unknown_type(&query.type_name));
        }
        if let Some(filter) = &query.filter {
            filter.validate()?;
            self.check_properties(filter)?;
        }
        if let Some(interval) = &query.interval {
            interval.validate()?;
        }
        let density = query.hints.density_hint()?;
        let transform = query.hints.transform_hint()?;
        if let Some(transform) = &transform {
            self.check_transform(transform)?;
        }

        // 2. Normalization. A density hint replaces the geometry used for
        // range planning; the caller's geometry becomes a residual.
        let planning_geometry = match &density {
            Some(hint) => Some(hint.bbox.to_polygon()),
            None => query.geometry.clone(),
        };
        let net_geometry = net_polygon(planning_geometry.as_ref(), &self.domain);
        if net_geometry.as_ref().is_some_and(is_empty_polygon)
            || is_outside_interval(query.interval.as_ref(), &self.domain)
        {
            Logger::event(Event::QueryOutsideDomain, &[("type_name", &query.type_name)]);
            return Ok(QueryPlan {
                type_name: query.type_name.clone(),
                strategy: QueryStrategy::Empty,
            });
        }
        let net_time = net_interval(query.interval.as_ref(), &self.domain);

        // 3. Strategy selection
        if density.is_none() {
            let shape = classify_attribute_filter(
                query.filter.as_ref(),
                &self.config.schema.indexed_attributes,
            );
            if shape != AttributeShape::Generic {
                let plan = self.plan_attribute(query, shape, transform.as_ref())?;
                return Ok(QueryPlan {
                    type_name: query.type_name.clone(),
                    strategy: QueryStrategy::AttributeIndex(plan),
                });
            }
        }

        // 4. Spatio-temporal scan
        let plan = self.plan_spatio_temporal(
            query,
            classify(net_geometry, net_time),
            planning_geometry.as_ref(),
            density,
            transform,
        )?;
        Ok(QueryPlan {
            type_name: query.type_name.clone(),
            strategy: QueryStrategy::SpatioTemporal(plan),
        })
    }

    fn check_properties(&self, filter: &Predicate) -> PlannerResult<()> {
        let schema = &self.config.schema;
        if let Some(unknown) = filter.properties().into_iter().find(|p| !schema.knows(p)) {
            return Err(PlannerError::unknown_property(unknown));
        }
        check_typed_operands(filter, &schema.geometry_attribute, &schema.dtg_attribute)
    }

    fn check_transform(&self, transform: &Transform) -> PlannerResult<()> {
        let schema = &self.config.schema;
        match transform.sources().into_iter().find(|s| !schema.knows(s)) {
            Some(unknown) => Err(PlannerError::unknown_property(unknown)),
            None => Ok(()),
        }
    }

    fn plan_attribute(
        &self,
        query: &Query,
        shape: AttributeShape,
        transform: Option<&Transform>,
    ) -> PlannerResult<AttributePlan> {
        let range = match &shape {
            AttributeShape::Equality { property, literal } => {
                attribute_exact_range(property, literal)
            }
            AttributeShape::Prefix { property, prefix } => attribute_prefix_range(property, prefix),
            AttributeShape::Generic => {
                return Err(PlannerError::query_invalid(
                    "Generic predicate cannot drive an attribute scan",
                ))
            }
        };

        let schema = &self.config.schema;
        let index_stages = IteratorStackBuilder::attribute_index(
            &self.config.codec,
            query.geometry.as_ref(),
            query.interval.as_ref(),
        )?;

        let mut residual: Vec<Predicate> = query.filter.iter().cloned().collect();
        if let Some(polygon) = &query.geometry {
            residual.push(Predicate::intersects(
                schema.geometry_attribute.clone(),
                polygon.clone(),
            ));
        }
        if let Some(interval) = query.interval {
            residual.push(Predicate::during(schema.dtg_attribute.clone(), interval));
        }
        let record_stages = IteratorStackBuilder::record_lookup(
            &self.config.codec,
            &schema.geometry_attribute,
            &schema.dtg_attribute,
            Predicate::all(residual),
            transform,
        )?;

        Ok(AttributePlan {
            index_table: self.config.tables.attribute.clone(),
            record_table: self.config.tables.records.clone(),
            shape,
            range,
            index_stages,
            record_stages,
        })
    }

    fn plan_spatio_temporal(
        &self,
        query: &Query,
        filter: KeyPlanningFilter,
        planning_geometry: Option<&Polygon<f64>>,
        density: Option<DensityHint>,
        transform: Option<Transform>,
    ) -> PlannerResult<SpatioTemporalPlan> {
        let schema = &self.config.schema;

        let mut keys = self.keys.plan_keys(&filter);
        if !self.config.row_regex_enabled {
            keys.row_regex = None;
        }
        let (families, family_regex) =
            split_families(self.keys.plan_column_families(&filter), self.config.max_fetch_families);

        let mut residual: Vec<Predicate> = query.filter.iter().cloned().collect();
        if density.is_some() {
            if let Some(polygon) = &query.geometry {
                residual.push(Predicate::intersects(
                    schema.geometry_attribute.clone(),
                    polygon.clone(),
                ));
            }
        }
        let residual = match Predicate::all(residual) {
            Predicate::Include => None,
            predicate => Some(predicate),
        };

        let index_only = self.is_index_only(residual.as_ref(), density.is_some(), transform.as_ref());

        let stages = IteratorStackBuilder::spatio_temporal(SpatioTemporalStages {
            codec: &self.config.codec,
            geometry_attribute: &schema.geometry_attribute,
            dtg_attribute: &schema.dtg_attribute,
            row_regex: keys.row_regex.as_deref(),
            family_regex,
            index_only,
            polygon: planning_geometry,
            interval: query.interval.as_ref(),
            feature: FeatureStage {
                filter: residual,
                density,
                transform,
            },
        })?;

        Ok(SpatioTemporalPlan {
            table: self.config.tables.spatio_temporal.clone(),
            filter,
            keys,
            families,
            stages,
            index_only,
        })
    }

    /// Index entries carry only id, geometry and timestamp
    fn is_index_only(
        &self,
        residual: Option<&Predicate>,
        density: bool,
        transform: Option<&Transform>,
    ) -> bool {
        let schema = &self.config.schema;
        let embedded: BTreeSet<&str> = [
            schema.geometry_attribute.as_str(),
            schema.dtg_attribute.as_str(),
        ]
        .into_iter()
        .collect();

        let residual_ok = residual.map_or(true, |p| p.properties().is_subset(&embedded));
        if density {
            return residual_ok;
        }
        let output_ok = match transform {
            Some(transform) => transform.sources().is_subset(&embedded),
            None => schema.attributes.is_empty(),
        };
        residual_ok && output_ok
    }
}

/// Geometry and time predicates must name the typed attributes
fn check_typed_operands(predicate: &Predicate, geometry: &str, dtg: &str) -> PlannerResult<()> {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => children
            .iter()
            .try_for_each(|child| check_typed_operands(child, geometry, dtg)),
        Predicate::Not(inner) => check_typed_operands(inner, geometry, dtg),
        Predicate::Intersects { property, .. } if property != geometry => {
            Err(PlannerError::unsupported_operands(format!(
                "INTERSECTS requires the geometry attribute, got '{}'",
                property
            )))
        }
        Predicate::During { property, .. } if property != dtg => {
            Err(PlannerError::unsupported_operands(format!(
                "DURING requires the timestamp attribute, got '{}'",
                property
            )))
        }
        _ => Ok(()),
    }
}

/// Keeps small family sets as a fetch set; larger ones become a regex stage
fn split_families(plan: ColumnFamilyPlan, max_fetch: usize) -> (ColumnFamilyPlan, Option<String>) {
    match plan {
        ColumnFamilyPlan::Families(families) if families.len() > max_fetch => {
            let alternatives: Vec<String> = families
                .iter()
                .map(|f| regex::escape(&String::from_utf8_lossy(f)))
                .collect();
            (
                ColumnFamilyPlan::Unconstrained,
                Some(format!("^(?:{})$", alternatives.join("|"))),
            )
        }
        plan => (plan, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Interval;
    use crate::stages::{StageKind, DENSITY_STAGE_NAME};
    use chrono::{DateTime, TimeZone, Utc};
    use geo::{coord, Rect};
    use serde_json::json;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn config() -> PlannerConfig {
        let mut config = PlannerConfig::default();
        config.schema.attributes = vec!["name".into(), "age".into()];
        config.schema.indexed_attributes = vec!["name".into()];
        config
    }

    fn planner() -> QueryPlanner {
        QueryPlanner::new(config()).unwrap()
    }

    fn small_box() -> Polygon<f64> {
        Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 10.5, y: 10.5 }).to_polygon()
    }

    fn spatio_temporal(plan: QueryPlan) -> SpatioTemporalPlan {
        match plan.strategy {
            QueryStrategy::SpatioTemporal(plan) => plan,
            other => panic!("expected spatio-temporal plan, got {:?}", other.kind()),
        }
    }

    fn attribute(plan: QueryPlan) -> AttributePlan {
        match plan.strategy {
            QueryStrategy::AttributeIndex(plan) => plan,
            other => panic!("expected attribute plan, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = planner().plan(&Query::new("other")).unwrap_err();
        assert_eq!(err.code().code(), "AERO_QUERY_UNKNOWN_TYPE");
    }

    #[test]
    fn test_unknown_property_rejected() {
        let query = Query::new("feature").filter_eq("color", json!("red"));
        let err = planner().plan(&query).unwrap_err();
        assert_eq!(err.code().code(), "AERO_QUERY_UNKNOWN_PROPERTY");
        assert_eq!(err.property(), Some("color"));
    }

    #[test]
    fn test_intersects_on_non_geometry_rejected() {
        let query = Query::new("feature").with_filter(Predicate::intersects("name", small_box()));
        let err = planner().plan(&query).unwrap_err();
        assert_eq!(err.code().code(), "AERO_QUERY_UNSUPPORTED_OPERANDS");
    }

    #[test]
    fn test_partial_transform_rejected() {
        let mut query = Query::new("feature");
        query.hints.transform = Some("name".into());
        let err = planner().plan(&query).unwrap_err();
        assert_eq!(err.code().code(), "AERO_TRANSFORM_INCOMPLETE");
    }

    #[test]
    fn test_partial_density_rejected() {
        let mut query = Query::new("feature");
        query.hints.density = Some(true);
        let err = planner().plan(&query).unwrap_err();
        assert_eq!(err.code().code(), "AERO_HINTS_INCOMPLETE");
    }

    #[test]
    fn test_accept_everything_is_unconstrained() {
        let plan = spatio_temporal(planner().plan(&Query::new("feature")).unwrap());
        assert_eq!(plan.filter, KeyPlanningFilter::AcceptEverything);
        assert!(plan.keys.is_unconstrained());
        assert_eq!(plan.families, ColumnFamilyPlan::Unconstrained);
        // attributes exist and no transform narrows output
        assert!(!plan.index_only);
    }

    #[test]
    fn test_spatial_date_plan() {
        let query = Query::new("feature")
            .with_geometry(small_box())
            .with_interval(Interval::instant(t(3)));
        let plan = spatio_temporal(planner().plan(&query).unwrap());

        assert!(matches!(plan.filter, KeyPlanningFilter::SpatialDateFilter(_, at) if at == t(3)));
        assert!(!plan.keys.is_unconstrained());
        assert!(!plan.keys.ranges.is_empty());
        let exclusive: Vec<_> = plan.stages.iter().filter(|s| s.priority == 200).collect();
        assert_eq!(exclusive.len(), 1);
    }

    #[test]
    fn test_equality_selects_attribute_path() {
        let query = Query::new("feature").filter_eq("name", json!("alice"));
        let plan = attribute(planner().plan(&query).unwrap());
        assert_eq!(
            plan.shape,
            AttributeShape::Equality {
                property: "name".into(),
                literal: "alice".into()
            }
        );
        assert!(plan.range.contains(b"name\0alice"));
        assert!(!plan.range.contains(b"name\0alice2"));
        assert!(plan.index_stages.is_empty());
        assert_eq!(plan.record_stages.len(), 1);
        assert_eq!(plan.record_stages[0].kind, StageKind::FeatureFilter);
    }

    #[test]
    fn test_reversed_operands_select_attribute_path() {
        use crate::planner::Expr;
        let query = Query::new("feature").with_filter(Predicate::Equals(
            Expr::literal(json!("alice")),
            Expr::property("name"),
        ));
        let plan = attribute(planner().plan(&query).unwrap());
        assert_eq!(plan.shape.property(), Some("name"));
    }

    #[test]
    fn test_prefix_and_ineligible_like() {
        let query = Query::new("feature").filter_like("name", "al%");
        let plan = planner().plan(&query).unwrap();
        assert_eq!(plan.strategy.kind(), StrategyKind::AttributePrefix);

        let query = Query::new("feature").filter_like("name", "a%ce");
        let plan = planner().plan(&query).unwrap();
        assert_eq!(plan.strategy.kind(), StrategyKind::SpatioTemporal);
    }

    #[test]
    fn test_attribute_with_geometry_adds_coarse_stage() {
        let query = Query::new("feature")
            .with_geometry(small_box())
            .filter_eq("name", json!("alice"));
        let plan = attribute(planner().plan(&query).unwrap());
        assert_eq!(plan.index_stages.len(), 1);
        assert_eq!(plan.index_stages[0].priority, 10);
    }

    #[test]
    fn test_unindexed_equality_is_generic() {
        let query = Query::new("feature").filter_eq("age", json!(30));
        let plan = spatio_temporal(planner().plan(&query).unwrap());
        assert!(!plan.index_only);
        assert_eq!(plan.stages.last().map(|s| s.priority), Some(300));
    }

    #[test]
    fn test_density_forces_spatio_temporal() {
        let bbox = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 20.0, y: 20.0 });
        let query = Query::new("feature")
            .with_geometry(small_box())
            .filter_eq("name", json!("alice"))
            .with_density(bbox, 4, 4);
        let plan = spatio_temporal(planner().plan(&query).unwrap());

        assert_eq!(plan.filter.polygon(), Some(&bbox.to_polygon()));
        let names: Vec<&str> = plan
            .stages
            .iter()
            .filter(|s| s.priority == 300)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names[1], DENSITY_STAGE_NAME);
    }

    #[test]
    fn test_outside_domain_is_empty() {
        let mut config = config();
        config.domain.min_lon = 0.0;
        config.domain.max_lon = 5.0;
        config.domain.min_lat = 0.0;
        config.domain.max_lat = 5.0;
        let planner = QueryPlanner::new(config).unwrap();

        let query = Query::new("feature").with_geometry(small_box());
        let plan = planner.plan(&query).unwrap();
        assert_eq!(plan.strategy, QueryStrategy::Empty);
    }

    #[test]
    fn test_interval_outside_domain_is_empty() {
        let mut config = config();
        config.domain.start = t(0);
        config.domain.end = t(12);
        let planner = QueryPlanner::new(config).unwrap();

        let late = Interval::new(t(13), t(20)).unwrap();
        let plan = planner
            .plan(&Query::new("feature").with_interval(late))
            .unwrap();
        assert_eq!(plan.strategy, QueryStrategy::Empty);

        let attr = planner
            .plan(
                &Query::new("feature")
                    .with_interval(Interval::instant(t(23)))
                    .filter_eq("name", json!("alice")),
            )
            .unwrap();
        assert_eq!(attr.strategy, QueryStrategy::Empty);

        let boundary = planner
            .plan(&Query::new("feature").with_interval(Interval::instant(t(12))))
            .unwrap();
        assert_eq!(boundary.strategy.kind(), StrategyKind::SpatioTemporal);
    }

    #[test]
    fn test_transform_on_embedded_fields_is_index_only() {
        let query = Query::new("feature")
            .with_geometry(small_box())
            .with_transform("geom;dtg", "*geom:Point,dtg:Date");
        let plan = spatio_temporal(planner().plan(&query).unwrap());
        assert!(plan.index_only);
        assert_eq!(
            plan.stages.iter().find(|s| s.priority == 200).map(|s| s.kind),
            Some(StageKind::IndexOnly)
        );
    }

    #[test]
    fn test_row_regex_disabled() {
        let mut config = config();
        config.row_regex_enabled = false;
        let planner = QueryPlanner::new(config).unwrap();
        let query = Query::new("feature").with_interval(Interval::new(t(1), t(5)).unwrap());
        let plan = spatio_temporal(planner.plan(&query).unwrap());
        assert!(plan.keys.row_regex.is_none());
        assert!(plan.stages.iter().all(|s| s.kind != StageKind::RowRegex));
    }

    #[test]
    fn test_large_family_set_becomes_regex_stage() {
        let (plan, regex) = split_families(
            ColumnFamilyPlan::Families([b"ab".to_vec(), b"cd".to_vec()].into_iter().collect()),
            1,
        );
        assert_eq!(plan, ColumnFamilyPlan::Unconstrained);
        assert_eq!(regex.as_deref(), Some("^(?:ab|cd)$"));

        let small = ColumnFamilyPlan::Families([b"ab".to_vec()].into_iter().collect());
        assert_eq!(split_families(small.clone(), 1), (small, None));
    }

    #[test]
    fn test_planning_is_deterministic() {
        let query = Query::new("feature")
            .with_geometry(small_box())
            .with_interval(Interval::new(t(1), t(5)).unwrap());
        let planner = planner();
        assert_eq!(planner.plan(&query).unwrap(), planner.plan(&query).unwrap());
    }
}
