//! Stand-off geometry and bounded velocity synthesis.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector3;
use tracing::debug;

use crate::error::ProfileError;
use crate::geometry::{NedPosition, NedVelocity, bearing, clamp_norm, horizontal_distance};

use super::presets::PresetParams;

/// How the drone should sit relative to the tracked person.
///
/// Immutable after construction; every instance has passed validation, so
/// `max_speed > 0` and `distance_tolerance >= 0` always hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceProfile {
    target_distance: f64,
    altitude: Option<f64>,
    horizontal_offset: f64,
    distance_tolerance: f64,
    max_speed: f64,
}

impl DistanceProfile {
    /// Validate and build a profile.
    ///
    /// # Arguments
    /// * `target_distance` - Horizontal stand-off from the target, meters (> 0)
    /// * `altitude` - Commanded altitude, or `None` to hold the current one
    /// * `horizontal_offset` - Lateral offset, negative is left, meters
    /// * `distance_tolerance` - Accepted stand-off error, meters (>= 0)
    /// * `max_speed` - Upper bound on the commanded speed, m/s (> 0)
    pub fn new(
        target_distance: f64,
        altitude: Option<f64>,
        horizontal_offset: f64,
        distance_tolerance: f64,
        max_speed: f64,
    ) -> Result<Self, ProfileError> {
        if !(target_distance.is_finite() && target_distance > 0.0) {
            return Err(ProfileError::InvalidTargetDistance(target_distance));
        }
        if !(max_speed.is_finite() && max_speed > 0.0) {
            return Err(ProfileError::InvalidMaxSpeed(max_speed));
        }
        if !(distance_tolerance.is_finite() && distance_tolerance >= 0.0) {
            return Err(ProfileError::InvalidTolerance(distance_tolerance));
        }
        if !horizontal_offset.is_finite() {
            return Err(ProfileError::NonFinite {
                field: "horizontal_offset",
                value: horizontal_offset,
            });
        }
        if let Some(alt) = altitude {
            if !alt.is_finite() {
                return Err(ProfileError::NonFinite {
                    field: "altitude",
                    value: alt,
                });
            }
        }

        Ok(Self {
            target_distance,
            altitude,
            horizontal_offset,
            distance_tolerance,
            max_speed,
        })
    }

    /// Preset tables are constants that already satisfy every check in `new`.
    pub(crate) const fn from_preset(params: PresetParams) -> Self {
        Self {
            target_distance: params.target_distance,
            altitude: params.altitude,
            horizontal_offset: params.horizontal_offset,
            distance_tolerance: params.distance_tolerance,
            max_speed: params.max_speed,
        }
    }

    pub fn target_distance(&self) -> f64 {
        self.target_distance
    }

    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    pub fn horizontal_offset(&self) -> f64 {
        self.horizontal_offset
    }

    pub fn distance_tolerance(&self) -> f64 {
        self.distance_tolerance
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    /// Point the drone should occupy to hold this profile around `target`,
    /// approached from `current`.
    ///
    /// The horizontal part sits `target_distance` behind the target along the
    /// bearing from `current`, shifted `horizontal_offset` to the right of that
    /// bearing. Returns `None` when the bearing is undefined (drone directly
    /// above or below the target).
    pub fn desired_position(
        &self,
        current: &NedPosition,
        target: &NedPosition,
    ) -> Option<NedPosition> {
        let angle = bearing(current, target)?;
        let behind = angle + PI;
        let right = angle + FRAC_PI_2;

        let north = target.x
            + behind.cos() * self.target_distance
            + right.cos() * self.horizontal_offset;
        let east = target.y
            + behind.sin() * self.target_distance
            + right.sin() * self.horizontal_offset;
        let down = match self.altitude {
            Some(alt) => alt,
            None => current.z,
        };

        Some(Vector3::new(north, east, down))
    }

    /// Velocity command that moves the drone towards its desired position.
    ///
    /// The result never exceeds `max_speed` in magnitude and always points the
    /// same way as the raw displacement. With no defined bearing there is no
    /// horizontal correction; with no altitude there is no vertical one.
    pub fn calculate_movement_vector(
        &self,
        current: &NedPosition,
        target: &NedPosition,
    ) -> NedVelocity {
        let (move_north, move_east) = match self.desired_position(current, target) {
            Some(desired) => (desired.x - current.x, desired.y - current.y),
            None => (0.0, 0.0),
        };
        let move_down = match self.altitude {
            Some(alt) => alt - current.z,
            None => 0.0,
        };

        let raw = Vector3::new(move_north, move_east, move_down);
        let velocity = clamp_norm(raw, self.max_speed);

        debug!(
            "Current distance: {:.2}m, target: {:.2}m, movement: ({:.2}, {:.2}, {:.2}) m/s",
            horizontal_distance(current, target),
            self.target_distance,
            velocity.x,
            velocity.y,
            velocity.z
        );

        velocity
    }

    /// Whether the horizontal distance to `target` is within tolerance of the
    /// stand-off distance.
    pub fn is_at_desired_distance(&self, current: &NedPosition, target: &NedPosition) -> bool {
        let distance = horizontal_distance(current, target);
        (distance - self.target_distance).abs() <= self.distance_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ned;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn profile(distance: f64, altitude: Option<f64>, offset: f64, max_speed: f64) -> DistanceProfile {
        DistanceProfile::new(distance, altitude, offset, 0.5, max_speed).unwrap()
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert_eq!(
            DistanceProfile::new(5.0, None, 0.0, 0.5, 0.0),
            Err(ProfileError::InvalidMaxSpeed(0.0))
        );
        assert_eq!(
            DistanceProfile::new(5.0, None, 0.0, -0.1, 2.0),
            Err(ProfileError::InvalidTolerance(-0.1))
        );
        assert_eq!(
            DistanceProfile::new(0.0, None, 0.0, 0.5, 2.0),
            Err(ProfileError::InvalidTargetDistance(0.0))
        );
        assert!(DistanceProfile::new(5.0, Some(f64::NAN), 0.0, 0.5, 2.0).is_err());
        assert!(DistanceProfile::new(5.0, None, 0.0, 0.0, 2.0).is_ok());
    }

    #[test]
    fn test_straight_approach_is_clamped() {
        let p = profile(5.0, None, 0.0, 2.0);
        let v = p.calculate_movement_vector(&ned(0.0, 0.0, 0.0), &ned(10.0, 0.0, 0.0));
        assert_relative_eq!(v, ned(2.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_desired_point_sits_behind_target() {
        let p = profile(5.0, None, 0.0, 2.0);
        let desired = p
            .desired_position(&ned(0.0, 0.0, 0.0), &ned(10.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(desired, ned(5.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_small_displacement_is_not_scaled() {
        let p = profile(5.0, None, 0.0, 2.0);
        let v = p.calculate_movement_vector(&ned(0.0, 0.0, 0.0), &ned(6.0, 0.0, 0.0));
        assert_relative_eq!(v, ned(1.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_backs_off_when_too_close() {
        let p = profile(5.0, None, 0.0, 2.0);
        let v = p.calculate_movement_vector(&ned(0.0, 0.0, 0.0), &ned(0.0, 3.0, 0.0));
        // Desired point is 5 m west of the target, 2 m west of the drone.
        assert_relative_eq!(v, ned(0.0, -2.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_offset_shifts_right_of_bearing() {
        let p = profile(5.0, None, 1.0, 10.0);
        let desired = p
            .desired_position(&ned(0.0, 0.0, 0.0), &ned(10.0, 0.0, 0.0))
            .unwrap();
        // Facing north, right is east.
        assert_relative_eq!(desired, ned(5.0, 1.0, 0.0), epsilon = 1e-9);

        let left = profile(5.0, None, -1.0, 10.0);
        let desired = left
            .desired_position(&ned(0.0, 0.0, 0.0), &ned(10.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(desired, ned(5.0, -1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_zero_vector_when_on_top_of_target() {
        let p = profile(5.0, None, 0.0, 2.0);
        let here = ned(3.0, -4.0, -2.0);
        let v = p.calculate_movement_vector(&here, &here);
        assert_eq!(v, Vector3::zeros());
    }

    #[test]
    fn test_altitude_correction_uses_down_component() {
        let p = profile(5.0, Some(-3.0), 0.0, 10.0);
        let v = p.calculate_movement_vector(&ned(0.0, 0.0, -1.0), &ned(5.0, 0.0, -1.7));
        assert_relative_eq!(v, ned(0.0, 0.0, -2.0), epsilon = 1e-9);
    }

    #[test]
    fn test_no_altitude_means_no_vertical_motion() {
        let p = profile(5.0, None, 0.0, 10.0);
        let v = p.calculate_movement_vector(&ned(0.0, 0.0, -12.0), &ned(8.0, 1.0, -1.7));
        assert_eq!(v.z, 0.0);
    }

    #[test]
    fn test_speed_bound_holds_for_random_inputs() {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let max_speed = rng.gen_range(0.1..6.0);
            let altitude = if rng.gen_bool(0.5) {
                Some(rng.gen_range(-30.0..30.0))
            } else {
                None
            };
            let p = DistanceProfile::new(
                rng.gen_range(0.5..25.0),
                altitude,
                rng.gen_range(-5.0..5.0),
                rng.gen_range(0.0..2.0),
                max_speed,
            )
            .unwrap();
            let current = ned(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-50.0..0.0),
            );
            let target = ned(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-3.0..0.0),
            );
            let v = p.calculate_movement_vector(&current, &target);
            assert!(v.norm() <= max_speed + 1e-9, "{} > {}", v.norm(), max_speed);
        }
    }

    #[test]
    fn test_direction_matches_raw_displacement() {
        let p = profile(5.0, Some(-4.0), 2.0, 1.0);
        let current = ned(1.0, 2.0, -1.0);
        let target = ned(20.0, -7.0, -1.7);
        let desired = p.desired_position(&current, &target).unwrap();
        let raw = Vector3::new(desired.x - current.x, desired.y - current.y, -4.0 - current.z);

        let v = p.calculate_movement_vector(&current, &target);
        assert_relative_eq!(v.normalize(), raw.normalize(), epsilon = 1e-9);
    }

    #[test]
    fn test_is_at_desired_distance_band() {
        let p = DistanceProfile::new(5.0, None, 0.0, 0.5, 2.0).unwrap();
        let origin = ned(0.0, 0.0, 0.0);
        assert!(p.is_at_desired_distance(&origin, &ned(5.0, 0.0, 0.0)));
        assert!(p.is_at_desired_distance(&origin, &ned(5.5, 0.0, 0.0)));
        assert!(p.is_at_desired_distance(&origin, &ned(0.0, 4.5, 0.0)));
        assert!(!p.is_at_desired_distance(&origin, &ned(5.51, 0.0, 0.0)));
        assert!(!p.is_at_desired_distance(&origin, &ned(0.0, -4.49, 0.0)));
    }

    #[test]
    fn test_is_at_desired_distance_ignores_vertical() {
        let p = DistanceProfile::new(5.0, None, 0.0, 0.1, 2.0).unwrap();
        assert!(p.is_at_desired_distance(&ned(0.0, 0.0, -20.0), &ned(3.0, 4.0, -1.7)));
    }
}
