//! Pinhole-camera conversion from an image box to a 3D target position.
//!
//! Assumes the camera looks straight ahead along north with no yaw
//! correction, and that the tracked person sits at a fixed height relative to
//! the camera. Both are approximations; the output is a best-effort estimate.

use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::geometry::NedPosition;

use super::bbox::BoundingBox;

/// Pixel dimensions of the frames coming out of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Optical center, taken as the middle of the frame.
    pub fn center(&self) -> (f64, f64) {
        ((self.width / 2) as f64, (self.height / 2) as f64)
    }
}

/// Pinhole model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Real-world shoulder width of a person, meters.
    pub real_target_width: f64,
    /// Focal length, pixels.
    pub focal_length: f64,
    /// NED `down` assigned to every estimate (torso height relative to camera).
    pub target_down_offset: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            real_target_width: 0.5,
            focal_length: 800.0,
            target_down_offset: -1.7,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_positive("real_target_width", self.real_target_width)?;
        ConfigError::check_positive("focal_length", self.focal_length)?;
        if !self.target_down_offset.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "target_down_offset",
                value: self.target_down_offset,
            });
        }
        Ok(())
    }
}

/// Converts boxes to positions with a fixed pinhole model.
#[derive(Debug, Clone, Copy)]
pub struct TargetPositionEstimator {
    config: EstimatorConfig,
}

impl TargetPositionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Forward distance to a target whose apparent width is `pixel_width`.
    pub fn forward_distance(&self, pixel_width: u32) -> Option<f64> {
        if pixel_width == 0 {
            return None;
        }
        Some(self.config.real_target_width * self.config.focal_length / pixel_width as f64)
    }

    /// Estimate the target position for `bbox` in a frame of `geometry`.
    ///
    /// Pixels right of center map to negative east. Returns `None` for a
    /// degenerate box.
    pub fn estimate(&self, bbox: &BoundingBox, geometry: &FrameGeometry) -> Option<NedPosition> {
        if !bbox.is_valid() {
            return None;
        }
        let forward = self.forward_distance(bbox.w)?;

        let meters_per_pixel = self.config.real_target_width / bbox.w as f64;
        let (center_x, _) = bbox.center();
        let (frame_cx, _) = geometry.center();
        let lateral = (center_x - frame_cx) * meters_per_pixel;

        Some(Vector3::new(forward, -lateral, self.config.target_down_offset))
    }
}

impl Default for TargetPositionEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(640, 480)
    }

    #[test]
    fn test_forward_distance_pinhole() {
        let est = TargetPositionEstimator::default();
        // Box centered horizontally: x + w/2 = 320.
        let pos = est
            .estimate(&BoundingBox::new(270, 100, 100, 200), &geometry())
            .unwrap();
        assert_eq!(pos.x, 4.0);
        assert_relative_eq!(pos.y, 0.0, epsilon = 1e-12);
        assert_eq!(pos.z, -1.7);
    }

    #[test]
    fn test_odd_width_centered_box_has_no_lateral_offset() {
        let est = TargetPositionEstimator::default();
        // 270 + 101 / 2 = 320 in whole pixels, same as the frame center.
        let pos = est
            .estimate(&BoundingBox::new(270, 0, 101, 200), &geometry())
            .unwrap();
        assert_eq!(pos.y, 0.0);
    }

    #[test]
    fn test_halving_width_doubles_distance() {
        let est = TargetPositionEstimator::default();
        let near = est.forward_distance(100).unwrap();
        let far = est.forward_distance(50).unwrap();
        assert_relative_eq!(far, 2.0 * near, epsilon = 1e-12);
        assert_relative_eq!(far, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_right_of_center_maps_to_negative_east() {
        let est = TargetPositionEstimator::default();
        // Center at 420: 100 px right of the optical center.
        let pos = est
            .estimate(&BoundingBox::new(370, 0, 100, 200), &geometry())
            .unwrap();
        assert_relative_eq!(pos.y, -0.5, epsilon = 1e-12);

        let left = est
            .estimate(&BoundingBox::new(170, 0, 100, 200), &geometry())
            .unwrap();
        assert_relative_eq!(left.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_box_has_no_estimate() {
        let est = TargetPositionEstimator::default();
        assert!(est.estimate(&BoundingBox::new(10, 10, 0, 50), &geometry()).is_none());
        assert!(est.estimate(&BoundingBox::new(10, 10, 50, 0), &geometry()).is_none());
        assert!(est.forward_distance(0).is_none());
    }

    #[test]
    fn test_custom_down_offset() {
        let est = TargetPositionEstimator::new(EstimatorConfig {
            target_down_offset: -0.9,
            ..EstimatorConfig::default()
        });
        let pos = est
            .estimate(&BoundingBox::new(0, 0, 40, 80), &geometry())
            .unwrap();
        assert_eq!(pos.z, -0.9);
    }

    #[test]
    fn test_config_validation() {
        assert!(EstimatorConfig::default().validate().is_ok());
        let bad = EstimatorConfig {
            focal_length: 0.0,
            ..EstimatorConfig::default()
        };
        assert_eq!(
            bad.validate(),
            Err(ConfigError::NotPositive {
                field: "focal_length",
                value: 0.0
            })
        );
        let bad = EstimatorConfig {
            target_down_offset: f64::INFINITY,
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::NonFinite {
                field: "target_down_offset",
                ..
            })
        ));
    }
}
