//! Geohash encoding and polygon covering
//!
//! Bits interleave longitude first; five bits per base-32 character.

use geo::{coord, BoundingRect, Intersects, Point, Polygon, Rect};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Encodes a point at the given character precision
pub fn encode(point: &Point<f64>, precision: usize) -> String {
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0usize;
    let mut bit_count = 0;
    let mut even = true;

    while hash.len() < precision {
        if even {
            let mid = (lon_lo + lon_hi) / 2.0;
            if point.x() >= mid {
                bits = (bits << 1) | 1;
                lon_lo = mid;
            } else {
                bits <<= 1;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if point.y() >= mid {
                bits = (bits << 1) | 1;
                lat_lo = mid;
            } else {
                bits <<= 1;
                lat_hi = mid;
            }
        }
        even = !even;
        bit_count += 1;
        if bit_count == 5 {
            hash.push(BASE32[bits] as char);
            bits = 0;
            bit_count = 0;
        }
    }
    hash
}

/// Bounds of a geohash cell; `None` for characters outside the alphabet
pub fn cell_bounds(hash: &str) -> Option<Rect<f64>> {
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let mut even = true;

    for c in hash.bytes() {
        let idx = BASE32.iter().position(|b| *b == c)?;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1 == 1;
            if even {
                let mid = (lon_lo + lon_hi) / 2.0;
                if bit {
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
    }
    Some(Rect::new(
        coord! { x: lon_lo, y: lat_lo },
        coord! { x: lon_hi, y: lat_hi },
    ))
}

/// Cell grid dimensions at a precision: (columns, rows, width, height)
fn grid(precision: usize) -> (usize, usize, f64, f64) {
    let bits = 5 * precision;
    let lon_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    let cols = 1usize << lon_bits;
    let rows = 1usize << lat_bits;
    (cols, rows, 360.0 / cols as f64, 180.0 / rows as f64)
}

/// Column/row index span of `bbox` at a precision
fn span(bbox: &Rect<f64>, precision: usize) -> ((usize, usize), (usize, usize)) {
    let (cols, rows, width, height) = grid(precision);
    let index = |value: f64, origin: f64, size: f64, count: usize| -> usize {
        let raw = ((value - origin) / size).floor();
        raw.clamp(0.0, (count - 1) as f64) as usize
    };
    (
        (
            index(bbox.min().x, -180.0, width, cols),
            index(bbox.max().x, -180.0, width, cols),
        ),
        (
            index(bbox.min().y, -90.0, height, rows),
            index(bbox.max().y, -90.0, height, rows),
        ),
    )
}

/// Upper bound on the number of cells `covering` can return
pub fn estimate(bbox: &Rect<f64>, precision: usize) -> usize {
    let ((i0, i1), (j0, j1)) = span(bbox, precision);
    (i1 - i0 + 1) * (j1 - j0 + 1)
}

/// Sorted geohash cells of the given precision intersecting `polygon`
pub fn covering(polygon: &Polygon<f64>, precision: usize) -> Vec<String> {
    let Some(bbox) = polygon.bounding_rect() else {
        return Vec::new();
    };
    let (_, _, width, height) = grid(precision);
    let ((i0, i1), (j0, j1)) = span(&bbox, precision);

    let mut cells = Vec::new();
    for i in i0..=i1 {
        for j in j0..=j1 {
            let min_x = -180.0 + i as f64 * width;
            let min_y = -90.0 + j as f64 * height;
            let cell = Rect::new(
                coord! { x: min_x, y: min_y },
                coord! { x: min_x + width, y: min_y + height },
            );
            if polygon.intersects(&cell) {
                let center = Point::new(min_x + width / 2.0, min_y + height / 2.0);
                cells.push(encode(&center, precision));
            }
        }
    }
    cells.sort();
    cells.dedup();
    cells
}

/// Covers `polygon` at the finest precision up to `max_precision` whose
/// cell count stays within `max_cells`
pub fn covering_within(polygon: &Polygon<f64>, max_precision: usize, max_cells: usize) -> Vec<String> {
    let Some(bbox) = polygon.bounding_rect() else {
        return Vec::new();
    };
    for precision in (1..=max_precision).rev() {
        if estimate(&bbox, precision) <= max_cells {
            return covering(polygon, precision);
        }
    }
    covering(polygon, 1)
}
