//! Rerun-based visualization of the follow pipeline.
//!
//! Entity hierarchy:
//!     status               - Detect/track state and tick counter
//!     camera/
//!         target           - Tracked person box (image space)
//!     world/
//!         vehicle          - Drone position
//!         target           - Estimated target position
//!         velocity         - Commanded velocity arrow at the drone
//!     plots/
//!         speed            - Commanded speed
//!         target_distance  - Estimated horizontal distance to the target
//!         standoff         - Active stand-off distance
//!
//! World entities use East-North-Up so the viewer's default up axis matches.

use std::time::Instant;

use anyhow::Result;
use rerun::RecordingStream;

use crate::geometry::{NedPosition, horizontal};
use crate::system::messages::{CommandTelemetry, TelemetryMsg, VisionTelemetry};

pub struct RerunVisualizer {
    rec: RecordingStream,
    started: Instant,
}

/// NED -> right/forward/up as the viewer expects.
fn to_rfu(p: &NedPosition) -> [f32; 3] {
    [p.y as f32, p.x as f32, -p.z as f32]
}

impl RerunVisualizer {
    /// Spawn a viewer process and connect to it.
    pub fn new(app_name: &str) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name).spawn()?;
        rec.log_static("world", &rerun::ViewCoordinates::RFU()).ok();
        Ok(Self {
            rec,
            started: Instant::now(),
        })
    }

    fn set_time(&self) {
        self.rec
            .set_duration_secs("time", self.started.elapsed().as_secs_f64());
    }

    pub fn log_telemetry(&self, msg: &TelemetryMsg) {
        self.set_time();
        match msg {
            TelemetryMsg::Vision(v) => self.log_vision(v),
            TelemetryMsg::Command(c) => self.log_command(c),
        }
    }

    fn log_vision(&self, v: &VisionTelemetry) {
        self.rec
            .log(
                "status",
                &rerun::TextDocument::new(format!(
                    "**{}** | frame {}",
                    v.state.label(),
                    v.frame
                ))
                .with_media_type(rerun::MediaType::markdown()),
            )
            .ok();

        match v.bbox {
            Some(b) => {
                self.rec
                    .log(
                        "camera/target",
                        &rerun::Boxes2D::from_mins_and_sizes(
                            [[b.x as f32, b.y as f32]],
                            [[b.w as f32, b.h as f32]],
                        )
                        .with_colors([[0u8, 255, 0]]),
                    )
                    .ok();
            }
            None => {
                self.rec.log("camera/target", &rerun::Clear::flat()).ok();
            }
        }

        if let Some(p) = v.position {
            self.rec
                .log(
                    "plots/target_distance",
                    &rerun::Scalars::new([horizontal(&p).norm()]),
                )
                .ok();
        }
    }

    fn log_command(&self, c: &CommandTelemetry) {
        let speed = c.velocity.norm();
        self.rec
            .log("plots/speed", &rerun::Scalars::new([speed]))
            .ok();
        self.rec
            .log("plots/standoff", &rerun::Scalars::new([c.target_distance]))
            .ok();

        if let Some(target) = c.target {
            self.rec
                .log(
                    "world/target",
                    &rerun::Points3D::new([to_rfu(&target)])
                        .with_colors([[255u8, 64, 64]])
                        .with_radii([0.15f32]),
                )
                .ok();
        }

        if let Some(vehicle) = c.vehicle {
            let origin = to_rfu(&vehicle);
            self.rec
                .log(
                    "world/vehicle",
                    &rerun::Points3D::new([origin])
                        .with_colors([[64u8, 128, 255]])
                        .with_radii([0.2f32]),
                )
                .ok();
            self.rec
                .log(
                    "world/velocity",
                    &rerun::Arrows3D::from_vectors([to_rfu(&c.velocity)])
                        .with_origins([origin])
                        .with_colors([[255u8, 200, 0]]),
                )
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ned;

    #[test]
    fn test_rfu_axes() {
        assert_eq!(to_rfu(&ned(1.0, 2.0, -3.0)), [2.0, 1.0, 3.0]);
    }
}
