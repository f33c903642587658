//! Sampling points along edge polylines.

use geo::{Euclidean, Length, LineInterpolatePoint, LineString, RemoveRepeatedPoints};

/// Planar length of a polyline.
#[must_use]
pub fn line_length(line: &LineString<f64>) -> f64 {
    Euclidean.length(line)
}

/// Points at distances `0, step, 2*step, ...` along the line, up to the
/// first distance at or past the line's length (which is clamped to the
/// end point). A zero-length line yields no points.
#[must_use]
pub fn sample_along(line: &LineString<f64>, step: f64) -> Vec<[f64; 2]> {
    // Zero-length segments have no direction to interpolate along
    let line = line.remove_repeated_points();
    let length = line_length(&line);
    if length <= 0.0 || !length.is_finite() || step <= 0.0 {
        return Vec::new();
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = ((length + step) / step).ceil() as usize;

    (0..count)
        .filter_map(|k| {
            #[allow(clippy::cast_precision_loss)]
            let distance = (k as f64 * step).min(length);
            line.line_interpolate_point(distance / length)
        })
        .map(|point| [point.x(), point.y()])
        .collect()
}
