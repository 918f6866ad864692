//! Query AST structures
//!
//! A query carries an optional geometry predicate, an optional closed
//! temporal interval, an optional residual predicate expressed in a
//! vendor-neutral AST, and optional density/transform hints.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use geo::{Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{PlannerError, PlannerResult};
use crate::filter::transform::Transform;

/// Closed temporal interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Creates an interval, rejecting `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> PlannerResult<Self> {
        let interval = Self { start, end };
        interval.validate()?;
        Ok(interval)
    }

    /// Creates a single-instant interval
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    /// Returns true if start equals end
    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if `at` falls within the closed interval
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start <= *at && *at <= self.end
    }

    pub(crate) fn validate(&self) -> PlannerResult<()> {
        if self.start > self.end {
            return Err(PlannerError::query_invalid(format!(
                "Interval start {} is after end {}",
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// Operand of a comparison: a property reference or a literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Property(String),
    Literal(Value),
}

impl Expr {
    pub fn property(name: impl Into<String>) -> Self {
        Expr::Property(name.into())
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    /// Returns the property name if this is a property reference
    pub fn as_property(&self) -> Option<&str> {
        match self {
            Expr::Property(name) => Some(name),
            Expr::Literal(_) => None,
        }
    }
}

/// Ordering comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
        }
    }
}

/// Vendor-neutral boolean predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Matches everything
    Include,
    /// Matches nothing
    Exclude,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Equality; operands may appear in either order
    Equals(Expr, Expr),
    /// SQL-style LIKE: `%` any run, `_` any single char, `\` escapes
    Like { expr: Expr, pattern: String },
    Compare { op: CompareOp, left: Expr, right: Expr },
    /// Record geometry intersects the polygon
    Intersects { property: String, polygon: Polygon<f64> },
    /// Record timestamp lies within the closed interval
    During { property: String, interval: Interval },
}

impl Predicate {
    /// Equality between a property and a literal
    pub fn eq(property: impl Into<String>, value: Value) -> Self {
        Predicate::Equals(Expr::property(property), Expr::literal(value))
    }

    /// LIKE test on a property
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            expr: Expr::property(property),
            pattern: pattern.into(),
        }
    }

    pub fn compare(op: CompareOp, property: impl Into<String>, value: Value) -> Self {
        Predicate::Compare {
            op,
            left: Expr::property(property),
            right: Expr::literal(value),
        }
    }

    pub fn intersects(property: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Predicate::Intersects {
            property: property.into(),
            polygon,
        }
    }

    pub fn during(property: impl Into<String>, interval: Interval) -> Self {
        Predicate::During {
            property: property.into(),
            interval,
        }
    }

    /// Conjunction that collapses trivial cases
    pub fn all(mut predicates: Vec<Predicate>) -> Self {
        predicates.retain(|p| *p != Predicate::Include);
        match predicates.len() {
            0 => Predicate::Include,
            1 => predicates.remove(0),
            _ => Predicate::And(predicates),
        }
    }

    /// Collects every property name referenced by this predicate
    pub fn properties(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Include | Predicate::Exclude => {}
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_properties(out);
                }
            }
            Predicate::Not(inner) => inner.collect_properties(out),
            Predicate::Equals(left, right) | Predicate::Compare { left, right, .. } => {
                out.extend(left.as_property());
                out.extend(right.as_property());
            }
            Predicate::Like { expr, .. } => out.extend(expr.as_property()),
            Predicate::Intersects { property, .. } | Predicate::During { property, .. } => {
                out.insert(property);
            }
        }
    }

    /// Structural validation; fails fast on shapes no stage can evaluate
    pub fn validate(&self) -> PlannerResult<()> {
        match self {
            Predicate::Include | Predicate::Exclude => Ok(()),
            Predicate::And(children) | Predicate::Or(children) => {
                if children.is_empty() {
                    return Err(PlannerError::query_invalid(
                        "AND/OR requires at least one operand",
                    ));
                }
                children.iter().try_for_each(Predicate::validate)
            }
            Predicate::Not(inner) => inner.validate(),
            Predicate::Equals(left, right) | Predicate::Compare { left, right, .. } => {
                if left.as_property().is_none() && right.as_property().is_none() {
                    return Err(PlannerError::unsupported_operands(
                        "comparison between two literals",
                    ));
                }
                Ok(())
            }
            Predicate::Like { expr, .. } => match expr {
                Expr::Property(_) => Ok(()),
                Expr::Literal(_) => Err(PlannerError::unsupported_operands(
                    "LIKE subject must be a property",
                )),
            },
            Predicate::Intersects { .. } => Ok(()),
            Predicate::During { interval, .. } => interval.validate(),
        }
    }
}

/// Density aggregation request: a width x height grid over `bbox`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityHint {
    pub bbox: Rect<f64>,
    pub width: u32,
    pub height: u32,
}

/// Raw query hints as supplied by the caller.
///
/// Density fields are all-or-none; transform fields are both-or-neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryHints {
    #[serde(default)]
    pub density: Option<bool>,
    #[serde(default)]
    pub bbox: Option<Rect<f64>>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub transform_schema: Option<String>,
}

impl QueryHints {
    /// Resolves the density hint group
    pub fn density_hint(&self) -> PlannerResult<Option<DensityHint>> {
        match (self.density, self.bbox, self.width, self.height) {
            (None, None, None, None) => Ok(None),
            (Some(enabled), Some(bbox), Some(width), Some(height)) => {
                if width == 0 || height == 0 {
                    return Err(PlannerError::query_invalid(
                        "Density grid width and height must be > 0",
                    ));
                }
                Ok(enabled.then_some(DensityHint {
                    bbox,
                    width,
                    height,
                }))
            }
            _ => Err(PlannerError::hints_incomplete(
                "density, bbox, width and height must be supplied together",
            )),
        }
    }

    /// Resolves and parses the transform hint pair
    pub fn transform_hint(&self) -> PlannerResult<Option<Transform>> {
        match (&self.transform, &self.transform_schema) {
            (None, None) => Ok(None),
            (Some(expression), Some(schema)) => Transform::parse(expression, schema).map(Some),
            _ => Err(PlannerError::transform_incomplete()),
        }
    }
}

/// Parsed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Output type name
    pub type_name: String,
    /// Geometry predicate
    #[serde(default)]
    pub geometry: Option<Polygon<f64>>,
    /// Temporal interval predicate
    #[serde(default)]
    pub interval: Option<Interval>,
    /// Residual predicate
    #[serde(default)]
    pub filter: Option<Predicate>,
    #[serde(default)]
    pub hints: QueryHints,
}

impl Query {
    /// Creates a query that matches everything of the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            geometry: None,
            interval: None,
            filter: None,
            hints: QueryHints::default(),
        }
    }

    pub fn with_geometry(mut self, polygon: Polygon<f64>) -> Self {
        self.geometry = Some(polygon);
        self
    }

    pub fn with_bbox(self, bbox: Rect<f64>) -> Self {
        self.with_geometry(bbox.to_polygon())
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds an attribute equality test as the residual predicate
    pub fn filter_eq(self, property: impl Into<String>, value: Value) -> Self {
        self.with_filter(Predicate::eq(property, value))
    }

    /// Adds an attribute LIKE test as the residual predicate
    pub fn filter_like(self, property: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with_filter(Predicate::like(property, pattern))
    }

    /// Requests density aggregation over `bbox`
    pub fn with_density(mut self, bbox: Rect<f64>, width: u32, height: u32) -> Self {
        self.hints.density = Some(true);
        self.hints.bbox = Some(bbox);
        self.hints.width = Some(width);
        self.hints.height = Some(height);
        self
    }

    /// Requests a projection/transform of the output records
    pub fn with_transform(
        mut self,
        expression: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        self.hints.transform = Some(expression.into());
        self.hints.transform_schema = Some(schema.into());
        self
    }
}
