//! Residual predicate evaluation
//!
//! Runs store-side against decoded records. Comparison rules are strict:
//! no type coercion, missing or null attributes never match, ordering only
//! between numbers or between strings. The timestamp property compares as
//! an instant when the literal is an RFC 3339 string.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geo::Intersects;
use regex::Regex;
use serde_json::Value;

use crate::planner::{CompareOp, Expr, Predicate};
use crate::record::Record;

/// Translates a LIKE pattern into an anchored regex.
///
/// A trailing `\` is a literal backslash.
pub fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                let escaped = chars.next().unwrap_or('\\');
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Compiled residual predicate
#[derive(Debug, Clone)]
pub struct Evaluator {
    predicate: Predicate,
    geometry_attribute: String,
    dtg_attribute: String,
    patterns: HashMap<String, Regex>,
}

/// Resolved operand value
enum Operand<'a> {
    Value(&'a Value),
    Instant(DateTime<Utc>),
    Missing,
}

impl Evaluator {
    pub fn new(
        predicate: Predicate,
        geometry_attribute: impl Into<String>,
        dtg_attribute: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let mut patterns = HashMap::new();
        collect_patterns(&predicate, &mut patterns)?;
        Ok(Self {
            predicate,
            geometry_attribute: geometry_attribute.into(),
            dtg_attribute: dtg_attribute.into(),
            patterns,
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Returns true if the record satisfies the predicate
    pub fn matches(&self, record: &Record) -> bool {
        self.eval(&self.predicate, record)
    }

    fn eval(&self, predicate: &Predicate, record: &Record) -> bool {
        match predicate {
            Predicate::Include => true,
            Predicate::Exclude => false,
            Predicate::And(children) => children.iter().all(|c| self.eval(c, record)),
            Predicate::Or(children) => children.iter().any(|c| self.eval(c, record)),
            Predicate::Not(inner) => !self.eval(inner, record),
            Predicate::Equals(left, right) => {
                self.ordering(left, right, record) == Some(Ordering::Equal)
            }
            Predicate::Compare { op, left, right } => match self.ordering(left, right, record) {
                Some(ord) => match op {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                },
                None => false,
            },
            Predicate::Like { expr, pattern } => {
                let text = match self.resolve(expr, record) {
                    Operand::Value(Value::String(s)) => s.as_str(),
                    _ => return false,
                };
                self.patterns
                    .get(pattern)
                    .map_or(false, |regex| regex.is_match(text))
            }
            Predicate::Intersects { polygon, .. } => record.geometry.intersects(polygon),
            Predicate::During { interval, .. } => {
                record.dtg.map_or(false, |dtg| interval.contains(&dtg))
            }
        }
    }

    fn resolve<'a>(&self, expr: &'a Expr, record: &'a Record) -> Operand<'a> {
        match expr {
            Expr::Literal(Value::Null) => Operand::Missing,
            Expr::Literal(value) => Operand::Value(value),
            Expr::Property(name) if *name == self.dtg_attribute => {
                record.dtg.map_or(Operand::Missing, Operand::Instant)
            }
            Expr::Property(name) if *name == self.geometry_attribute => Operand::Missing,
            Expr::Property(name) => match record.attribute(name) {
                Some(Value::Null) | None => Operand::Missing,
                Some(value) => Operand::Value(value),
            },
        }
    }

    /// Orders left against right; `None` when incomparable
    fn ordering(&self, left: &Expr, right: &Expr, record: &Record) -> Option<Ordering> {
        match (self.resolve(left, record), self.resolve(right, record)) {
            (Operand::Value(a), Operand::Value(b)) => compare_values(a, b),
            (Operand::Instant(a), Operand::Value(b)) => parse_instant(b).map(|b| a.cmp(&b)),
            (Operand::Value(a), Operand::Instant(b)) => parse_instant(a).map(|a| a.cmp(&b)),
            (Operand::Instant(a), Operand::Instant(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

fn collect_patterns(
    predicate: &Predicate,
    out: &mut HashMap<String, Regex>,
) -> Result<(), regex::Error> {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => {
            for child in children {
                collect_patterns(child, out)?;
            }
        }
        Predicate::Not(inner) => collect_patterns(inner, out)?,
        Predicate::Like { pattern, .. } if !out.contains_key(pattern) => {
            out.insert(pattern.clone(), like_regex(pattern)?);
        }
        _ => {}
    }
    Ok(())
}

fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Exact equality for everything; ordering for numbers and strings only
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                return Some(xi.cmp(&yi));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Interval;
    use chrono::TimeZone;
    use geo::{coord, point, Rect};
    use serde_json::json;

    fn record() -> Record {
        Record::new("r1", point!(x: 5.0, y: 5.0))
            .with_dtg(Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap())
            .with_attribute("name", json!("Alice"))
            .with_attribute("age", json!(30))
            .with_attribute("note", json!(null))
    }

    fn matches(predicate: Predicate) -> bool {
        Evaluator::new(predicate, "geom", "dtg")
            .unwrap()
            .matches(&record())
    }

    #[test]
    fn test_equality_no_coercion() {
        assert!(matches(Predicate::eq("name", json!("Alice"))));
        assert!(!matches(Predicate::eq("name", json!("Bob"))));
        assert!(!matches(Predicate::eq("age", json!("30"))));
        assert!(matches(Predicate::Equals(
            Expr::literal(json!(30)),
            Expr::property("age")
        )));
    }

    #[test]
    fn test_missing_and_null_never_match() {
        assert!(!matches(Predicate::eq("missing", json!(1))));
        assert!(!matches(Predicate::eq("note", json!(null))));
        assert!(matches(Predicate::Not(Box::new(Predicate::eq(
            "missing",
            json!(1)
        )))));
    }

    #[test]
    fn test_range_comparisons() {
        assert!(matches(Predicate::compare(CompareOp::Gte, "age", json!(18))));
        assert!(matches(Predicate::compare(CompareOp::Lt, "age", json!(30.5))));
        assert!(!matches(Predicate::compare(CompareOp::Gt, "age", json!(30))));
        assert!(!matches(Predicate::compare(CompareOp::Gt, "name", json!(5))));
    }

    #[test]
    fn test_like_patterns() {
        assert!(matches(Predicate::like("name", "Al%")));
        assert!(matches(Predicate::like("name", "A_ice")));
        assert!(!matches(Predicate::like("name", "al%")));
        assert!(!matches(Predicate::like("age", "3%")));
        assert!(like_regex(r"100\%").unwrap().is_match("100%"));
        assert!(!like_regex(r"100\%").unwrap().is_match("1000"));
        assert!(like_regex("ab\\").unwrap().is_match("ab\\"));
        assert!(!like_regex("ab\\").unwrap().is_match("ab"));
    }

    #[test]
    fn test_spatial_and_temporal() {
        let inside = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }).to_polygon();
        let outside = Rect::new(coord! { x: 20.0, y: 20.0 }, coord! { x: 30.0, y: 30.0 }).to_polygon();
        assert!(matches(Predicate::intersects("geom", inside)));
        assert!(!matches(Predicate::intersects("geom", outside)));

        let day = Interval::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 23, 0, 0).unwrap(),
        )
        .unwrap();
        assert!(matches(Predicate::during("dtg", day)));
        assert!(matches(Predicate::compare(
            CompareOp::Gt,
            "dtg",
            json!("2024-01-01T00:00:00Z")
        )));
    }
}
