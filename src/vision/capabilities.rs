//! Interfaces to the camera, detector and tracker.
//!
//! The state machine only ever talks to these traits; the concrete OpenCV
//! backends live behind the `opencv` feature and the CSV replay backends in
//! `io::replay`.

use crate::error::VisionError;

use super::bbox::{BoundingBox, Detection};
use super::estimator::FrameGeometry;

/// Sequential frame producer. Reads may block and may fail transiently.
pub trait FrameSource {
    type Frame;

    /// Frame dimensions, fixed for the lifetime of the session.
    fn geometry(&self) -> FrameGeometry;

    fn next_frame(&mut self) -> Result<Self::Frame, VisionError>;
}

/// Full-frame person detector.
pub trait PersonDetector<F> {
    /// All person candidates in `frame`, in no particular order.
    fn detect(&mut self, frame: &F) -> Result<Vec<Detection>, VisionError>;
}

/// Stateful single-target tracker, re-created for every detection.
pub trait ShortTermTracker<F> {
    fn init(&mut self, frame: &F, bbox: BoundingBox) -> Result<(), VisionError>;

    /// New box for the target, or `None` when the tracker has lost it.
    fn update(&mut self, frame: &F) -> Result<Option<BoundingBox>, VisionError>;
}

/// Produces a fresh tracker for each (re)detection.
pub trait TrackerFactory<F> {
    type Tracker: ShortTermTracker<F>;

    fn create(&mut self) -> Result<Self::Tracker, VisionError>;
}

impl<F, T, C> TrackerFactory<F> for C
where
    C: FnMut() -> Result<T, VisionError>,
    T: ShortTermTracker<F>,
{
    type Tracker = T;

    fn create(&mut self) -> Result<T, VisionError> {
        self()
    }
}
