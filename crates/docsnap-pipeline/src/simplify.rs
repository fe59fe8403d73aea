//! Closed-contour polygon approximation (Ramer-Douglas-Peucker).
//!
//! A traced document outline has hundreds of boundary points; reducing
//! it to its corners is what lets the selector ask "is this a
//! quadrilateral?". The contour is closed, so the classic open-curve
//! algorithm is run on two halves split at the point farthest from the
//! start, and a final pass drops the start point if it turned out to lie
//! on a straight edge.

use crate::types::{Contour, Point, Polygon};

/// Perimeter of a contour.
///
/// With `closed`, the segment from the last point back to the first is
/// included.
#[must_use]
pub fn arc_length(contour: &Contour, closed: bool) -> f64 {
    let points = contour.points();
    let open: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    match (closed, points.first(), points.last()) {
        (true, Some(&first), Some(&last)) if points.len() > 1 => open + last.distance(first),
        _ => open,
    }
}

/// Approximate a contour with a polygon whose edges stay within
/// `tolerance` pixels of the original boundary.
///
/// Open contours keep both endpoints. Contours with fewer than three
/// points are returned unchanged.
#[must_use = "returns the approximated polygon"]
pub fn approximate_polygon(contour: &Contour, tolerance: f64, closed: bool) -> Polygon {
    let points = contour.points();
    if points.len() < 3 {
        return Polygon::new(points.to_vec());
    }

    if !closed {
        let mut kept = vec![false; points.len()];
        kept[0] = true;
        kept[points.len() - 1] = true;
        rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);
        return Polygon::new(collect_kept(points, &kept));
    }

    // Treat the contour as a ring: append the start so the second half
    // can run from the far point back to it.
    let mut ring = points.to_vec();
    ring.push(points[0]);
    let last = ring.len() - 1;

    let far = (1..last)
        .max_by(|&a, &b| {
            let da = ring[0].distance(ring[a]);
            let db = ring[0].distance(ring[b]);
            da.total_cmp(&db)
        })
        .unwrap_or(1);

    let mut kept = vec![false; ring.len()];
    kept[0] = true;
    kept[far] = true;
    rdp_recurse(&ring, 0, far, tolerance, &mut kept);
    rdp_recurse(&ring, far, last, tolerance, &mut kept);

    let mut vertices = collect_kept(&ring[..last], &kept[..last]);
    drop_straight_start(&mut vertices, tolerance);
    Polygon::new(vertices)
}

fn collect_kept(points: &[Point], kept: &[bool]) -> Vec<Point> {
    points
        .iter()
        .zip(kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// The start of a closed contour is kept unconditionally by the split.
/// When it sits in the middle of an edge, it is not a real corner.
fn drop_straight_start(vertices: &mut Vec<Point>, tolerance: f64) {
    if vertices.len() <= 3 {
        return;
    }
    let prev = vertices[vertices.len() - 1];
    let next = vertices[1];
    if perpendicular_distance(vertices[0], prev, next) <= tolerance {
        vertices.remove(0);
    }
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// line segment between them. If that distance exceeds `tolerance`, the
/// point is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line defined by `a` and `b`.
///
/// Uses the formula: |cross(b-a, p-a)| / |b-a|.
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = f64::from(b.x - a.x);
    let dy = f64::from(b.y - a.y);
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(f64::from(a.y - p.y), -(dy * f64::from(a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}
