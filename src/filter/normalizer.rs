//! FilterNormalizer
//!
//! Clips geometry and interval predicates to the index domain. Both
//! functions are idempotent: a clipped value lies inside the domain, so
//! clipping it again returns it unchanged.

use chrono::{DateTime, Utc};
use geo::{BooleanOps, Contains, ConvexHull, LineString, Polygon, Rect};

use crate::planner::Interval;

/// Spatial and temporal bounds the index covers
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDomain {
    pub bbox: Rect<f64>,
    pub interval: Interval,
}

impl IndexDomain {
    pub fn new(bbox: Rect<f64>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            bbox,
            interval: Interval { start, end },
        }
    }

    pub fn polygon(&self) -> Polygon<f64> {
        self.bbox.to_polygon()
    }
}

/// Polygon with no exterior ring
pub fn empty_polygon() -> Polygon<f64> {
    Polygon::new(LineString::new(Vec::new()), Vec::new())
}

/// True if the polygon has no area to plan over
pub fn is_empty_polygon(polygon: &Polygon<f64>) -> bool {
    polygon.exterior().0.len() < 4
}

/// Clips `geometry` to the domain.
///
/// An empty result means the query lies entirely outside the domain.
/// Multi-part intersections collapse to their convex hull; downstream
/// stages still evaluate the unclipped polygon.
pub fn net_polygon(geometry: Option<&Polygon<f64>>, domain: &IndexDomain) -> Option<Polygon<f64>> {
    let geometry = geometry?;
    if is_empty_polygon(geometry) {
        return Some(geometry.clone());
    }

    let bounds = domain.polygon();
    if geometry.contains(&bounds) {
        return Some(bounds);
    }
    if bounds.contains(geometry) {
        return Some(geometry.clone());
    }

    let clipped = geometry.intersection(&bounds);
    let net = match clipped.0.len() {
        0 => empty_polygon(),
        1 => clipped.0.into_iter().next().unwrap_or_else(empty_polygon),
        _ => clipped.convex_hull(),
    };
    Some(net)
}

/// True if `interval` shares no instant with the domain interval
pub fn is_outside_interval(interval: Option<&Interval>, domain: &IndexDomain) -> bool {
    interval.is_some_and(|i| i.end < domain.interval.start || i.start > domain.interval.end)
}

/// Clamps `interval` into the domain interval.
///
/// A disjoint interval collapses onto the nearest domain bound; callers
/// check `is_outside_interval` first.
pub fn net_interval(interval: Option<&Interval>, domain: &IndexDomain) -> Option<Interval> {
    let interval = interval?;
    let bounds = &domain.interval;
    let clamp = |at: DateTime<Utc>| at.max(bounds.start).min(bounds.end);
    Some(Interval {
        start: clamp(interval.start),
        end: clamp(interval.end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::{coord, polygon, Area};

    fn domain() -> IndexDomain {
        IndexDomain::new(
            Rect::new(coord! { x: -10.0, y: -10.0 }, coord! { x: 10.0, y: 10.0 }),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_none_passes_through() {
        assert!(net_polygon(None, &domain()).is_none());
        assert!(net_interval(None, &domain()).is_none());
    }

    #[test]
    fn test_inner_polygon_unchanged() {
        let inner = Rect::new(coord! { x: 1.0, y: 1.0 }, coord! { x: 2.0, y: 2.0 }).to_polygon();
        assert_eq!(net_polygon(Some(&inner), &domain()), Some(inner));
    }

    #[test]
    fn test_covering_polygon_becomes_domain() {
        let outer = Rect::new(coord! { x: -50.0, y: -50.0 }, coord! { x: 50.0, y: 50.0 }).to_polygon();
        assert_eq!(net_polygon(Some(&outer), &domain()), Some(domain().polygon()));
    }

    #[test]
    fn test_partial_overlap_clipped_and_idempotent() {
        let overlap = polygon![
            (x: 5.0, y: 5.0),
            (x: 20.0, y: 5.0),
            (x: 20.0, y: 20.0),
            (x: 5.0, y: 20.0),
            (x: 5.0, y: 5.0),
        ];
        let once = net_polygon(Some(&overlap), &domain()).unwrap();
        assert!((once.unsigned_area() - 25.0).abs() < 1e-9);

        let twice = net_polygon(Some(&once), &domain()).unwrap();
        assert!((twice.unsigned_area() - once.unsigned_area()).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_polygon_is_empty() {
        let far = Rect::new(coord! { x: 50.0, y: 50.0 }, coord! { x: 60.0, y: 60.0 }).to_polygon();
        let net = net_polygon(Some(&far), &domain()).unwrap();
        assert!(is_empty_polygon(&net));
    }

    #[test]
    fn test_interval_clamped_and_idempotent() {
        let wide = Interval::new(
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let once = net_interval(Some(&wide), &domain()).unwrap();
        assert_eq!(once.start, domain().interval.start);
        assert_eq!(once.end, wide.end);
        assert_eq!(net_interval(Some(&once), &domain()), Some(once));
    }

    #[test]
    fn test_disjoint_interval_detected() {
        let before = Interval::new(
            Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2011, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let after = Interval::instant(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap());
        let touching = Interval::instant(domain().interval.end);

        assert!(is_outside_interval(Some(&before), &domain()));
        assert!(is_outside_interval(Some(&after), &domain()));
        assert!(!is_outside_interval(Some(&touching), &domain()));
        assert!(!is_outside_interval(None, &domain()));
    }
}
