//! Vision side: turns camera frames into target position estimates.
//!
//! - `bbox` / `estimator`: image boxes and the pinhole model
//! - `capabilities`: traits for camera, detector and tracker backends
//! - `state_machine`: detect-then-track logic
//! - `vision_loop`: the worker that feeds frames into the state machine

pub mod bbox;
pub mod capabilities;
pub mod estimator;
#[cfg(feature = "opencv")]
pub mod opencv_backend;
pub mod state;
pub mod state_machine;
pub mod vision_loop;

pub use bbox::{BoundingBox, Detection, select_largest};
pub use capabilities::{FrameSource, PersonDetector, ShortTermTracker, TrackerFactory};
pub use estimator::{EstimatorConfig, FrameGeometry, TargetPositionEstimator};
pub use state::DetectTrackState;
pub use state_machine::{CycleOutcome, DetectTrackStateMachine, VisionStats};
pub use vision_loop::{VisionConfig, VisionLoop};
