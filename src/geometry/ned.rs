//! Local North-East-Down frame helpers.
//!
//! Positions and velocities are plain `nalgebra::Vector3<f64>` with
//! `x = north`, `y = east`, `z = down`.

use nalgebra::{Vector2, Vector3};

/// Position in the local NED frame, meters.
pub type NedPosition = Vector3<f64>;

/// Velocity in the local NED frame, m/s.
pub type NedVelocity = Vector3<f64>;

/// Build a NED vector from its named components.
#[inline]
pub fn ned(north: f64, east: f64, down: f64) -> Vector3<f64> {
    Vector3::new(north, east, down)
}

/// Horizontal (north, east) part of a NED vector.
#[inline]
pub fn horizontal(v: &Vector3<f64>) -> Vector2<f64> {
    Vector2::new(v.x, v.y)
}

/// Horizontal Euclidean distance between two NED points, ignoring `down`.
#[inline]
pub fn horizontal_distance(a: &NedPosition, b: &NedPosition) -> f64 {
    (horizontal(b) - horizontal(a)).norm()
}

/// Bearing from `from` to `to` in radians, measured from north towards east.
///
/// Returns `None` when the two points coincide horizontally, where the
/// bearing is undefined.
pub fn bearing(from: &NedPosition, to: &NedPosition) -> Option<f64> {
    let d = horizontal(to) - horizontal(from);
    if d.x == 0.0 && d.y == 0.0 {
        return None;
    }
    Some(d.y.atan2(d.x))
}

/// Scale `v` down so its norm does not exceed `max_norm`, keeping direction.
///
/// Vectors already within the bound (including the zero vector) are returned
/// unchanged. A non-finite input collapses to zero.
pub fn clamp_norm(v: Vector3<f64>, max_norm: f64) -> Vector3<f64> {
    let norm = v.norm();
    if !norm.is_finite() {
        return Vector3::zeros();
    }
    if norm > max_norm {
        v * (max_norm / norm)
    } else {
        v
    }
}
