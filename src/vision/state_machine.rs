//! Detect-then-track pipeline.
//!
//! Runs the expensive detector periodically and the cheap short-term tracker
//! in between. Every step ends with exactly one publish to the shared target
//! slot: a fresh estimate, or "no target" when this frame produced none.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::VisionError;
use crate::system::shared_state::{SharedTargetState, TargetObservation};

use super::bbox::{BoundingBox, select_largest};
use super::capabilities::{PersonDetector, ShortTermTracker, TrackerFactory};
use super::estimator::{FrameGeometry, TargetPositionEstimator};
use super::state::DetectTrackState;

/// What a single step did with its frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Detector found a target; a fresh tracker was started on it.
    Detected(TargetObservation),
    /// Tracker followed the target into this frame.
    Tracked(TargetObservation),
    /// Detector ran and found nobody usable.
    NoDetection,
    /// Tracker lost the target; detection is forced on the next frame.
    TrackerLost,
    /// No session is running; the frame was ignored.
    Idle,
}

impl CycleOutcome {
    pub fn observation(&self) -> Option<&TargetObservation> {
        match self {
            CycleOutcome::Detected(obs) | CycleOutcome::Tracked(obs) => Some(obs),
            _ => None,
        }
    }
}

/// Counters for one vision session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VisionStats {
    pub frames: u64,
    pub frame_read_failures: u64,
    pub detections_run: u64,
    pub detections_found: u64,
    pub tracker_updates: u64,
    pub tracker_failures: u64,
}

/// Owns the detect/track state and the tracker handle.
///
/// Not shared between threads: the vision worker owns it outright.
pub struct DetectTrackStateMachine<F, D, TF>
where
    D: PersonDetector<F>,
    TF: TrackerFactory<F>,
{
    detector: D,
    tracker_factory: TF,
    tracker: Option<TF::Tracker>,
    estimator: TargetPositionEstimator,
    geometry: FrameGeometry,
    shared: Arc<SharedTargetState>,
    detection_interval: Duration,

    state: DetectTrackState,
    current_bbox: Option<BoundingBox>,
    last_detection: Option<Instant>,
    stats: VisionStats,

    _frame: PhantomData<fn(&F)>,
}

impl<F, D, TF> DetectTrackStateMachine<F, D, TF>
where
    D: PersonDetector<F>,
    TF: TrackerFactory<F>,
{
    pub fn new(
        detector: D,
        tracker_factory: TF,
        estimator: TargetPositionEstimator,
        geometry: FrameGeometry,
        shared: Arc<SharedTargetState>,
        detection_interval: Duration,
    ) -> Self {
        Self {
            detector,
            tracker_factory,
            tracker: None,
            estimator,
            geometry,
            shared,
            detection_interval,
            state: DetectTrackState::Idle,
            current_bbox: None,
            last_detection: None,
            stats: VisionStats::default(),
            _frame: PhantomData,
        }
    }

    pub fn state(&self) -> DetectTrackState {
        self.state
    }

    pub fn current_bbox(&self) -> Option<BoundingBox> {
        self.current_bbox
    }

    pub fn stats(&self) -> &VisionStats {
        &self.stats
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Begin a camera session: `Idle -> Detecting`.
    pub fn start_session(&mut self) {
        if self.state == DetectTrackState::Idle {
            info!(
                "Vision session started ({}x{})",
                self.geometry.width, self.geometry.height
            );
            self.state = DetectTrackState::Detecting;
        }
    }

    /// End the session, drop the tracker and clear the shared target.
    pub fn end_session(&mut self) {
        self.tracker = None;
        self.current_bbox = None;
        self.last_detection = None;
        self.state = DetectTrackState::Idle;
        self.shared.publish(None);
    }

    /// Frame reads are not state transitions; they are only counted.
    pub fn record_read_failure(&mut self) {
        self.stats.frame_read_failures += 1;
    }

    /// Advance the machine by one frame captured at `now`.
    pub fn step(&mut self, frame: &F, now: Instant) -> CycleOutcome {
        self.stats.frames += 1;

        match self.state {
            DetectTrackState::Idle => CycleOutcome::Idle,
            DetectTrackState::Detecting => self.run_detection(frame, now),
            DetectTrackState::RecoveringFromFailure => {
                debug!("Forcing redetection after tracker failure");
                self.state = DetectTrackState::Detecting;
                self.run_detection(frame, now)
            }
            DetectTrackState::Tracking => {
                if self.current_bbox.is_none() || self.tracker.is_none() || self.detection_due(now)
                {
                    self.run_detection(frame, now)
                } else {
                    self.run_tracker(frame, now)
                }
            }
        }
    }

    fn detection_due(&self, now: Instant) -> bool {
        match self.last_detection {
            Some(t) => now.saturating_duration_since(t) >= self.detection_interval,
            None => true,
        }
    }

    fn run_detection(&mut self, frame: &F, now: Instant) -> CycleOutcome {
        self.stats.detections_run += 1;

        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };

        let Some(best) = select_largest(&detections).copied() else {
            debug!("No person detected ({} raw candidates)", detections.len());
            self.clear_target(DetectTrackState::Detecting);
            return CycleOutcome::NoDetection;
        };
        let Some(position) = self.estimator.estimate(&best.bbox, &self.geometry) else {
            self.clear_target(DetectTrackState::Detecting);
            return CycleOutcome::NoDetection;
        };

        debug!(
            "Person detected: {} (confidence {:.2})",
            best.bbox, best.confidence
        );

        // Old tracker is discarded before the new one is built.
        self.tracker = None;
        self.state = match self.start_tracker(frame, best.bbox) {
            Ok(tracker) => {
                self.tracker = Some(tracker);
                DetectTrackState::Tracking
            }
            Err(e) => {
                warn!("{}", e);
                DetectTrackState::Detecting
            }
        };
        self.current_bbox = Some(best.bbox);
        self.last_detection = Some(now);
        self.stats.detections_found += 1;

        let observation = TargetObservation {
            position,
            bbox: best.bbox,
            observed_at: now,
        };
        self.shared.publish(Some(observation));
        debug!(
            "Target position updated: ({:.2}, {:.2}, {:.2})",
            position.x, position.y, position.z
        );
        CycleOutcome::Detected(observation)
    }

    fn start_tracker(&mut self, frame: &F, bbox: BoundingBox) -> Result<TF::Tracker, VisionError> {
        let mut tracker = self.tracker_factory.create()?;
        tracker.init(frame, bbox)?;
        Ok(tracker)
    }

    fn run_tracker(&mut self, frame: &F, now: Instant) -> CycleOutcome {
        self.stats.tracker_updates += 1;

        let update = match self.tracker.as_mut() {
            Some(tracker) => tracker.update(frame),
            None => Ok(None),
        };

        let bbox = match update {
            Ok(Some(bbox)) => bbox,
            Ok(None) => return self.tracker_lost("tracker reported failure"),
            Err(e) => {
                warn!("{}", e);
                return self.tracker_lost("tracker error");
            }
        };
        let Some(position) = self.estimator.estimate(&bbox, &self.geometry) else {
            return self.tracker_lost("degenerate tracker box");
        };

        self.current_bbox = Some(bbox);
        let observation = TargetObservation {
            position,
            bbox,
            observed_at: now,
        };
        self.shared.publish(Some(observation));
        CycleOutcome::Tracked(observation)
    }

    fn tracker_lost(&mut self, reason: &str) -> CycleOutcome {
        debug!("Tracking lost: {}", reason);
        self.stats.tracker_failures += 1;
        self.clear_target(DetectTrackState::RecoveringFromFailure);
        CycleOutcome::TrackerLost
    }

    fn clear_target(&mut self, next: DetectTrackState) {
        self.tracker = None;
        self.current_bbox = None;
        self.state = next;
        self.shared.publish(None);
    }
}
