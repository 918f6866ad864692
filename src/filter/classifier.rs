//! FilterClassifier
//!
//! Two independent decisions:
//! - `classify` maps a (polygon, interval) pair to one of six key-planning
//!   filter shapes
//! - `classify_attribute_filter` decides whether the residual predicate is an
//!   attribute equality, an attribute prefix, or generic
//!
//! Ineligible LIKE literals never raise an error; they classify as generic.

use chrono::{DateTime, Utc};
use geo::Polygon;

use crate::keys::encode_literal;
use crate::planner::{Expr, Interval, Predicate};

/// Shape of the geometry/time constraint handed to the key planner
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPlanningFilter {
    AcceptEverything,
    DateFilter(DateTime<Utc>),
    DateRangeFilter(DateTime<Utc>, DateTime<Utc>),
    SpatialFilter(Polygon<f64>),
    SpatialDateFilter(Polygon<f64>, DateTime<Utc>),
    SpatialDateRangeFilter(Polygon<f64>, DateTime<Utc>, DateTime<Utc>),
}

impl KeyPlanningFilter {
    pub fn name(&self) -> &'static str {
        match self {
            KeyPlanningFilter::AcceptEverything => "AcceptEverything",
            KeyPlanningFilter::DateFilter(_) => "DateFilter",
            KeyPlanningFilter::DateRangeFilter(..) => "DateRangeFilter",
            KeyPlanningFilter::SpatialFilter(_) => "SpatialFilter",
            KeyPlanningFilter::SpatialDateFilter(..) => "SpatialDateFilter",
            KeyPlanningFilter::SpatialDateRangeFilter(..) => "SpatialDateRangeFilter",
        }
    }

    pub fn polygon(&self) -> Option<&Polygon<f64>> {
        match self {
            KeyPlanningFilter::SpatialFilter(p)
            | KeyPlanningFilter::SpatialDateFilter(p, _)
            | KeyPlanningFilter::SpatialDateRangeFilter(p, _, _) => Some(p),
            _ => None,
        }
    }

    /// Temporal bounds as `(start, end)`; equal for instants
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            KeyPlanningFilter::DateFilter(t) | KeyPlanningFilter::SpatialDateFilter(_, t) => {
                Some((*t, *t))
            }
            KeyPlanningFilter::DateRangeFilter(s, e)
            | KeyPlanningFilter::SpatialDateRangeFilter(_, s, e) => Some((*s, *e)),
            _ => None,
        }
    }
}

/// Chooses the filter shape from presence of each constraint
pub fn classify(polygon: Option<Polygon<f64>>, interval: Option<Interval>) -> KeyPlanningFilter {
    match (polygon, interval) {
        (None, None) => KeyPlanningFilter::AcceptEverything,
        (Some(p), None) => KeyPlanningFilter::SpatialFilter(p),
        (None, Some(i)) if i.is_instant() => KeyPlanningFilter::DateFilter(i.start),
        (None, Some(i)) => KeyPlanningFilter::DateRangeFilter(i.start, i.end),
        (Some(p), Some(i)) if i.is_instant() => KeyPlanningFilter::SpatialDateFilter(p, i.start),
        (Some(p), Some(i)) => KeyPlanningFilter::SpatialDateRangeFilter(p, i.start, i.end),
    }
}

/// LIKE literal after wildcard analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikePattern {
    /// No wildcard; matches exactly this (unescaped) string
    Exact(String),
    /// Single trailing `%`; matches strings starting with this prefix
    Prefix(String),
    /// Any other wildcard placement
    Ineligible,
}

/// Analyses a LIKE literal for prefix-scan eligibility.
///
/// `_` outside an escape is ineligible. `%` may appear at most once and only
/// as the final character. `\` escapes the next character; a trailing `\`
/// is a literal backslash, matching `like_regex`.
pub fn like_prefix(pattern: &str) -> LikePattern {
    let mut literal = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            // A trailing `\` has nothing to escape and stands for itself.
            '\\' => literal.push(chars.next().unwrap_or('\\')),
            '_' => return LikePattern::Ineligible,
            '%' if chars.peek().is_none() => return LikePattern::Prefix(literal),
            '%' => return LikePattern::Ineligible,
            other => literal.push(other),
        }
    }
    LikePattern::Exact(literal)
}

/// How the residual predicate can use the attribute index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeShape {
    Equality { property: String, literal: String },
    Prefix { property: String, prefix: String },
    Generic,
}

impl AttributeShape {
    pub fn property(&self) -> Option<&str> {
        match self {
            AttributeShape::Equality { property, .. } | AttributeShape::Prefix { property, .. } => {
                Some(property)
            }
            AttributeShape::Generic => None,
        }
    }
}

/// Classifies the residual predicate against the indexed attributes.
///
/// Only a single top-level equality or LIKE test qualifies. Equality
/// operands are resolved by kind, not position.
pub fn classify_attribute_filter(filter: Option<&Predicate>, indexed: &[String]) -> AttributeShape {
    let is_indexed = |property: &str| indexed.iter().any(|name| name == property);

    match filter {
        Some(Predicate::Equals(left, right)) => {
            let (property, value) = match (left, right) {
                (Expr::Property(p), Expr::Literal(v)) | (Expr::Literal(v), Expr::Property(p)) => {
                    (p, v)
                }
                _ => return AttributeShape::Generic,
            };
            match encode_literal(value) {
                Some(literal) if is_indexed(property) => AttributeShape::Equality {
                    property: property.clone(),
                    literal,
                },
                _ => AttributeShape::Generic,
            }
        }
        Some(Predicate::Like {
            expr: Expr::Property(property),
            pattern,
        }) if is_indexed(property) => match like_prefix(pattern) {
            LikePattern::Exact(literal) => AttributeShape::Equality {
                property: property.clone(),
                literal,
            },
            LikePattern::Prefix(prefix) => AttributeShape::Prefix {
                property: property.clone(),
                prefix,
            },
            LikePattern::Ineligible => AttributeShape::Generic,
        },
        _ => AttributeShape::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::{coord, Rect};
    use serde_json::json;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn square() -> Polygon<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon()
    }

    fn indexed() -> Vec<String> {
        vec!["name".to_string()]
    }

    #[test]
    fn test_classify_six_shapes() {
        assert_eq!(classify(None, None), KeyPlanningFilter::AcceptEverything);
        assert_eq!(
            classify(Some(square()), None),
            KeyPlanningFilter::SpatialFilter(square())
        );
        assert_eq!(
            classify(None, Some(Interval::instant(t(1)))),
            KeyPlanningFilter::DateFilter(t(1))
        );
        assert_eq!(
            classify(None, Some(Interval::new(t(1), t(2)).unwrap())),
            KeyPlanningFilter::DateRangeFilter(t(1), t(2))
        );
        assert_eq!(
            classify(Some(square()), Some(Interval::instant(t(3)))),
            KeyPlanningFilter::SpatialDateFilter(square(), t(3))
        );
        assert_eq!(
            classify(Some(square()), Some(Interval::new(t(1), t(4)).unwrap())),
            KeyPlanningFilter::SpatialDateRangeFilter(square(), t(1), t(4))
        );
    }

    #[test]
    fn test_like_prefix_eligibility() {
        assert_eq!(like_prefix("abc%"), LikePattern::Prefix("abc".into()));
        assert_eq!(like_prefix("a%bc"), LikePattern::Ineligible);
        assert_eq!(like_prefix("a_bc"), LikePattern::Ineligible);
        assert_eq!(like_prefix("abc"), LikePattern::Exact("abc".into()));
    }

    #[test]
    fn test_like_prefix_escapes() {
        assert_eq!(like_prefix(r"a\_b%"), LikePattern::Prefix("a_b".into()));
        assert_eq!(like_prefix(r"50\%"), LikePattern::Exact("50%".into()));
        assert_eq!(like_prefix("ab%%"), LikePattern::Ineligible);
        assert_eq!(like_prefix("ab\\"), LikePattern::Exact("ab\\".into()));
    }

    #[test]
    fn test_equality_either_operand_order() {
        let forward = Predicate::eq("name", json!("alpha"));
        let reversed = Predicate::Equals(Expr::literal(json!("alpha")), Expr::property("name"));
        let expected = AttributeShape::Equality {
            property: "name".into(),
            literal: "alpha".into(),
        };
        assert_eq!(classify_attribute_filter(Some(&forward), &indexed()), expected);
        assert_eq!(classify_attribute_filter(Some(&reversed), &indexed()), expected);
    }

    #[test]
    fn test_generic_fallbacks() {
        let not_indexed = Predicate::eq("other", json!("x"));
        let null_literal = Predicate::eq("name", json!(null));
        let ineligible = Predicate::like("name", "a%b");
        let compound = Predicate::And(vec![
            Predicate::eq("name", json!("a")),
            Predicate::eq("name", json!("b")),
        ]);
        for pred in [not_indexed, null_literal, ineligible, compound] {
            assert_eq!(
                classify_attribute_filter(Some(&pred), &indexed()),
                AttributeShape::Generic
            );
        }
        assert_eq!(classify_attribute_filter(None, &indexed()), AttributeShape::Generic);
    }

    #[test]
    fn test_like_classifies_prefix() {
        let pred = Predicate::like("name", "al%");
        assert_eq!(
            classify_attribute_filter(Some(&pred), &indexed()),
            AttributeShape::Prefix {
                property: "name".into(),
                prefix: "al".into()
            }
        );
    }
}
