//! Offline inputs for running the pipeline without hardware.

pub mod replay;

pub use replay::{
    DetectionScript, ReplayFrame, ReplayFrameSource, ScriptedDetector, ScriptedTracker,
    scripted_tracker_factory,
};
