//! Vision worker: reads frames and drives the detect/track machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{ConfigError, VisionError};
use crate::system::messages::{TelemetryMsg, VisionTelemetry, emit};
use crate::system::shared_state::SharedTargetState;
use crate::system::worker::StopToken;

use super::capabilities::{FrameSource, PersonDetector, TrackerFactory};
use super::estimator::TargetPositionEstimator;
use super::state_machine::{CycleOutcome, DetectTrackStateMachine, VisionStats};

/// Timing for the vision worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// How often the full detector runs while tracking.
    pub detection_interval_ms: u64,
    /// Target frame period (~30 Hz).
    pub frame_period_ms: u64,
    /// Pause after a failed frame read.
    pub read_retry_backoff_ms: u64,
    /// How long `start_vision` waits for the pipeline to come up.
    pub startup_timeout_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            detection_interval_ms: 500,
            frame_period_ms: 33,
            read_retry_backoff_ms: 100,
            startup_timeout_ms: 5000,
        }
    }
}

impl VisionConfig {
    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }

    pub fn read_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_period("frame_period_ms", self.frame_period_ms)?;
        ConfigError::check_period("read_retry_backoff_ms", self.read_retry_backoff_ms)
    }
}

/// Frame source plus the state machine that consumes it.
pub struct VisionLoop<S, D, TF>
where
    S: FrameSource,
    D: PersonDetector<S::Frame>,
    TF: TrackerFactory<S::Frame>,
{
    source: S,
    machine: DetectTrackStateMachine<S::Frame, D, TF>,
    config: VisionConfig,
    telemetry: Option<Sender<TelemetryMsg>>,
}

impl<S, D, TF> VisionLoop<S, D, TF>
where
    S: FrameSource,
    D: PersonDetector<S::Frame>,
    TF: TrackerFactory<S::Frame>,
{
    pub fn new(
        source: S,
        detector: D,
        tracker_factory: TF,
        estimator: TargetPositionEstimator,
        config: VisionConfig,
        shared: Arc<SharedTargetState>,
    ) -> Self {
        let geometry = source.geometry();
        let machine = DetectTrackStateMachine::new(
            detector,
            tracker_factory,
            estimator,
            geometry,
            shared,
            config.detection_interval(),
        );
        Self {
            source,
            machine,
            config,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, sender: Sender<TelemetryMsg>) -> Self {
        self.telemetry = Some(sender);
        self
    }

    pub fn machine(&self) -> &DetectTrackStateMachine<S::Frame, D, TF> {
        &self.machine
    }

    /// Read one frame and step the machine with it.
    ///
    /// A failed read leaves the machine untouched.
    pub fn run_once(&mut self, now: Instant) -> Result<CycleOutcome, VisionError> {
        self.machine.start_session();
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.machine.record_read_failure();
                return Err(e);
            }
        };
        let outcome = self.machine.step(&frame, now);

        let observation = outcome.observation();
        emit(
            self.telemetry.as_ref(),
            TelemetryMsg::Vision(VisionTelemetry {
                frame: self.machine.stats().frames,
                state: self.machine.state(),
                bbox: observation.map(|o| o.bbox),
                position: observation.map(|o| o.position),
            }),
        );
        Ok(outcome)
    }

    /// Run until `stop` is cancelled, then clear the shared target.
    pub fn run(mut self, stop: &StopToken) -> VisionStats {
        info!("Starting tracking loop");
        let frame_period = self.config.frame_period();
        let backoff = self.config.read_retry_backoff();

        while !stop.is_cancelled() {
            let started = Instant::now();
            if let Err(e) = self.run_once(started) {
                warn!("{}", e);
                if stop.wait_timeout(backoff) {
                    break;
                }
                continue;
            }

            if let Some(rest) = frame_period.checked_sub(started.elapsed()) {
                if stop.wait_timeout(rest) {
                    break;
                }
            }
        }

        self.machine.end_session();
        let stats = self.machine.stats().clone();
        info!(
            "Tracking loop ended: {} frames, {} detections ({} found), {} tracker failures, {} read failures",
            stats.frames,
            stats.detections_run,
            stats.detections_found,
            stats.tracker_failures,
            stats.frame_read_failures
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{
        BoundingBox, DetectTrackState, Detection, FrameGeometry, ShortTermTracker,
    };
    use crossbeam_channel::bounded;
    use std::collections::VecDeque;
    use std::thread;

    struct FlakyCamera {
        reads: VecDeque<Result<u64, VisionError>>,
    }

    impl FrameSource for FlakyCamera {
        type Frame = u64;

        fn geometry(&self) -> FrameGeometry {
            FrameGeometry::new(640, 480)
        }

        fn next_frame(&mut self) -> Result<u64, VisionError> {
            self.reads
                .pop_front()
                .unwrap_or_else(|| Err(VisionError::FrameRead("end of stream".to_string())))
        }
    }

    struct AlwaysPerson;

    impl PersonDetector<u64> for AlwaysPerson {
        fn detect(&mut self, _frame: &u64) -> Result<Vec<Detection>, VisionError> {
            Ok(vec![Detection::new(BoundingBox::new(270, 0, 100, 200), 1.0)])
        }
    }

    struct SteadyTracker(BoundingBox);

    impl ShortTermTracker<u64> for SteadyTracker {
        fn init(&mut self, _frame: &u64, bbox: BoundingBox) -> Result<(), VisionError> {
            self.0 = bbox;
            Ok(())
        }

        fn update(&mut self, _frame: &u64) -> Result<Option<BoundingBox>, VisionError> {
            Ok(Some(self.0))
        }
    }

    fn steady_factory() -> Result<SteadyTracker, VisionError> {
        Ok(SteadyTracker(BoundingBox::new(0, 0, 1, 1)))
    }

    fn vision_loop(
        reads: Vec<Result<u64, VisionError>>,
        shared: Arc<SharedTargetState>,
    ) -> VisionLoop<FlakyCamera, AlwaysPerson, fn() -> Result<SteadyTracker, VisionError>> {
        VisionLoop::new(
            FlakyCamera {
                reads: reads.into(),
            },
            AlwaysPerson,
            steady_factory as fn() -> Result<SteadyTracker, VisionError>,
            TargetPositionEstimator::default(),
            VisionConfig::default(),
            shared,
        )
    }

    #[test]
    fn test_read_failure_leaves_state_unchanged() {
        let shared = SharedTargetState::new();
        let mut vl = vision_loop(
            vec![
                Ok(0),
                Err(VisionError::FrameRead("usb hiccup".to_string())),
                Ok(1),
            ],
            Arc::clone(&shared),
        );
        let now = Instant::now();

        assert!(matches!(vl.run_once(now), Ok(CycleOutcome::Detected(_))));
        assert_eq!(vl.machine().state(), DetectTrackState::Tracking);
        let seq = shared.snapshot().sequence;

        assert!(vl.run_once(now).is_err());
        assert_eq!(vl.machine().state(), DetectTrackState::Tracking);
        assert_eq!(shared.snapshot().sequence, seq);
        assert!(shared.read().is_some());

        assert!(matches!(vl.run_once(now), Ok(CycleOutcome::Tracked(_))));
        assert_eq!(vl.machine().stats().frame_read_failures, 1);
    }

    #[test]
    fn test_emits_vision_telemetry() {
        let shared = SharedTargetState::new();
        let (tx, rx) = bounded(4);
        let mut vl = vision_loop(vec![Ok(0)], shared).with_telemetry(tx);
        vl.run_once(Instant::now()).unwrap();

        match rx.try_recv().unwrap() {
            TelemetryMsg::Vision(v) => {
                assert_eq!(v.frame, 1);
                assert_eq!(v.state, DetectTrackState::Tracking);
                assert_eq!(v.position.unwrap().x, 4.0);
            }
            other => panic!("unexpected telemetry {:?}", other),
        }
    }

    #[test]
    fn test_run_clears_target_on_stop() {
        let shared = SharedTargetState::new();
        let reads = (0..10_000).map(Ok).collect();
        let vl = vision_loop(reads, Arc::clone(&shared));
        let stop = StopToken::new();

        let token = stop.clone();
        let handle = thread::spawn(move || vl.run(&token));
        thread::sleep(Duration::from_millis(100));
        assert!(shared.read().is_some());

        stop.cancel();
        let stats = handle.join().unwrap();
        assert!(stats.frames > 0);
        assert!(shared.read().is_none());
    }
}
