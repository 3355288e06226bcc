//! Scalar geometry helpers shared by ports, line constraints and the
//! item distance queries.

/// Euclidean distance between two points.
pub fn distance_point_point((x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> f64 {
    (x2 - x1).hypot(y2 - y1)
}

/// Distance from `point` to the segment `start`..`end`, together with the
/// closest point on the segment.
///
/// The foot of the perpendicular is clamped parametrically to `[0, 1]`, so
/// points past either endpoint snap to that endpoint. A zero-length segment
/// degenerates to its start point.
pub fn distance_segment_point(
    start: (f64, f64),
    end: (f64, f64),
    point: (f64, f64),
) -> (f64, (f64, f64)) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq > 0.0 {
        (((point.0 - start.0) * dx + (point.1 - start.1) * dy) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let foot = (start.0 + t * dx, start.1 + t * dy);
    (distance_point_point(point, foot), foot)
}

/// Distance from `point` to the axis-aligned rectangle with origin
/// `(x, y)` and the given extents. Points inside the rectangle are at
/// distance zero.
pub fn distance_rectangle_point(
    (x, y, width, height): (f64, f64, f64, f64),
    point: (f64, f64),
) -> f64 {
    let dx = (x - point.0).max(0.0).max(point.0 - (x + width));
    let dy = (y - point.1).max(0.0).max(point.1 - (y + height));
    dx.hypot(dy)
}
