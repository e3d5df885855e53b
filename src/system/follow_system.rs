//! Follow system: top-level entry point and thread orchestration.
//!
//! `FollowSystem` owns the shared target slot, the active distance profile and
//! the two worker threads (vision and control). Everything else talks to it.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::{info, warn};

use crate::config::FollowConfig;
use crate::control::{ActiveProfile, CommandSink, FollowController, PositionSource};
use crate::geometry::NedPosition;
use crate::profile::{DistanceProfile, ProfilePreset, get_profile};
use crate::vision::{
    FrameGeometry, FrameSource, PersonDetector, TargetPositionEstimator, TrackerFactory,
    VisionLoop,
};

use super::messages::TelemetryMsg;
use super::shared_state::{SharedTargetState, TargetSource};
use super::worker::Worker;

const VISION_THREAD: &str = "vision";
const CONTROL_THREAD: &str = "control";

/// Snapshot of what the system is doing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemStatus {
    pub vision_running: bool,
    pub following: bool,
    pub target_detected: bool,
    pub target_distance: Option<f64>,
    pub tracking_distance: f64,
    pub preset: ProfilePreset,
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vision running: {}", self.vision_running)?;
        writeln!(f, "Following: {}", self.following)?;
        writeln!(f, "Target detected: {}", self.target_detected)?;
        match self.target_distance {
            Some(d) => writeln!(f, "Target distance: {:.2}m", d)?,
            None => writeln!(f, "Target distance: -")?,
        }
        write!(
            f,
            "Tracking distance: {:.1}m ({})",
            self.tracking_distance, self.preset
        )
    }
}

pub struct FollowSystem {
    config: FollowConfig,

    /// Latest target estimate, written by the vision thread.
    shared: Arc<SharedTargetState>,

    /// Profile used by the control thread; swapped by `change_tracking_distance`.
    profile: ActiveProfile,
    preset: ProfilePreset,

    vision: Option<Worker>,
    vision_geometry: Option<FrameGeometry>,
    follower: Option<Worker>,

    telemetry: Option<Sender<TelemetryMsg>>,
}

impl FollowSystem {
    pub fn new(config: FollowConfig) -> Result<Self> {
        config.validate()?;
        let preset = ProfilePreset::for_distance(config.initial_distance);
        info!(
            "Initial tracking distance {:.1}m ({})",
            config.initial_distance, preset
        );

        Ok(Self {
            profile: ActiveProfile::new(preset.profile()),
            preset,
            shared: SharedTargetState::new(),
            vision: None,
            vision_geometry: None,
            follower: None,
            telemetry: None,
            config,
        })
    }

    /// Send vision and control telemetry to `sender` (best effort).
    pub fn with_telemetry(mut self, sender: Sender<TelemetryMsg>) -> Self {
        self.telemetry = Some(sender);
        self
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    pub fn shared_state(&self) -> &Arc<SharedTargetState> {
        &self.shared
    }

    /// Start the vision thread.
    ///
    /// `build` runs on the vision thread and returns the frame source,
    /// detector and tracker factory, so none of them has to be `Send`. This
    /// call waits up to the configured startup timeout for it to succeed and
    /// fails if it does not (for example when the camera cannot be opened).
    pub fn start_vision<B, S, D, TF>(&mut self, build: B) -> Result<()>
    where
        B: FnOnce() -> Result<(S, D, TF)> + Send + 'static,
        S: FrameSource + 'static,
        D: PersonDetector<S::Frame> + 'static,
        TF: TrackerFactory<S::Frame> + 'static,
    {
        if let Some(worker) = &self.vision {
            if !worker.is_finished() {
                warn!("Vision tracking already running");
                return Ok(());
            }
        }

        let (ready_tx, ready_rx) = bounded::<Result<FrameGeometry, String>>(1);
        let estimator = TargetPositionEstimator::new(self.config.estimator);
        let vision_config = self.config.vision.clone();
        let shared = Arc::clone(&self.shared);
        let telemetry = self.telemetry.clone();

        let worker = Worker::spawn(VISION_THREAD, move |stop| {
            let (source, detector, tracker_factory) = match build() {
                Ok(parts) => parts,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{:#}", e)));
                    return;
                }
            };
            let geometry = source.geometry();
            let mut vision = VisionLoop::new(
                source,
                detector,
                tracker_factory,
                estimator,
                vision_config,
                shared,
            );
            if let Some(tx) = telemetry {
                vision = vision.with_telemetry(tx);
            }
            let _ = ready_tx.send(Ok(geometry));
            vision.run(&stop);
        })
        .context("Failed to spawn vision thread")?;

        let timeout = self.config.vision.startup_timeout();
        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(geometry)) => {
                info!(
                    "Vision tracking started ({}x{})",
                    geometry.width, geometry.height
                );
                self.vision = Some(worker);
                self.vision_geometry = Some(geometry);
                Ok(())
            }
            Ok(Err(msg)) => {
                worker.stop(self.config.shutdown_timeout());
                Err(anyhow!(msg).context("Failed to start vision tracking"))
            }
            Err(RecvTimeoutError::Timeout) => {
                worker.stop(self.config.shutdown_timeout());
                bail!(
                    "Vision pipeline did not start within {:.1}s",
                    timeout.as_secs_f64()
                )
            }
            Err(RecvTimeoutError::Disconnected) => {
                worker.stop(self.config.shutdown_timeout());
                bail!("Vision thread exited during startup")
            }
        }
    }

    /// Frame size reported by the running vision pipeline.
    pub fn vision_geometry(&self) -> Option<FrameGeometry> {
        self.vision_geometry
    }

    /// Stop the vision thread. The shared target is cleared on its way out.
    pub fn stop_vision(&mut self) -> bool {
        match self.vision.take() {
            Some(worker) => {
                self.vision_geometry = None;
                let stopped = worker.stop(self.config.shutdown_timeout());
                info!("Vision tracking stopped");
                stopped
            }
            None => {
                warn!("Vision tracking not running");
                false
            }
        }
    }

    pub fn is_vision_running(&self) -> bool {
        self.vision.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Start the control thread, following the system's own vision output.
    pub fn start_following<C, P>(&mut self, sink: C, position: P) -> Result<()>
    where
        C: CommandSink + Send + 'static,
        P: PositionSource + Send + 'static,
    {
        let target = Arc::clone(&self.shared);
        self.start_following_source(target, sink, position)
    }

    /// Start the control thread against an arbitrary target source.
    pub fn start_following_source<T, C, P>(
        &mut self,
        target: Arc<T>,
        sink: C,
        position: P,
    ) -> Result<()>
    where
        T: TargetSource + ?Sized + 'static,
        C: CommandSink + Send + 'static,
        P: PositionSource + Send + 'static,
    {
        if let Some(worker) = &self.follower {
            if !worker.is_finished() {
                warn!("Already following target");
                return Ok(());
            }
        }

        let mut controller = FollowController::new(
            target,
            sink,
            position,
            self.profile.clone(),
            self.config.control.clone(),
        );
        if let Some(tx) = self.telemetry.clone() {
            controller = controller.with_telemetry(tx);
        }

        let worker = Worker::spawn(CONTROL_THREAD, move |stop| {
            controller.run(&stop);
        })
        .context("Failed to spawn control thread")?;

        self.follower = Some(worker);
        info!("Started following target");
        Ok(())
    }

    /// Stop the control thread. It sends a final hover before exiting.
    pub fn stop_following(&mut self) -> bool {
        match self.follower.take() {
            Some(worker) => {
                let stopped = worker.stop(self.config.shutdown_timeout());
                info!("Stopped following target");
                stopped
            }
            None => {
                warn!("Not currently following");
                false
            }
        }
    }

    pub fn is_following(&self) -> bool {
        self.follower.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Select the preset for `distance` and make it the active profile.
    pub fn change_tracking_distance(&mut self, distance: f64) -> DistanceProfile {
        let preset = ProfilePreset::for_distance(distance);
        let profile = get_profile(distance);
        self.profile.swap(profile);
        self.preset = preset;
        info!(
            "Tracking distance changed to {:.1}m ({}, stand-off {:.1}m)",
            distance,
            preset,
            profile.target_distance()
        );
        profile
    }

    pub fn active_profile(&self) -> DistanceProfile {
        self.profile.get()
    }

    pub fn get_target_position(&self) -> Option<NedPosition> {
        self.shared.target_position()
    }

    pub fn get_target_distance(&self) -> Option<f64> {
        self.shared.target_distance()
    }

    pub fn status(&self) -> SystemStatus {
        let target_distance = self.get_target_distance();
        SystemStatus {
            vision_running: self.is_vision_running(),
            following: self.is_following(),
            target_detected: target_distance.is_some(),
            target_distance,
            tracking_distance: self.profile.get().target_distance(),
            preset: self.preset,
        }
    }

    /// Stop following, then stop vision, waiting a bounded time for each.
    pub fn shutdown(&mut self) {
        let timeout = self.config.shutdown_timeout();
        if let Some(worker) = self.follower.take() {
            worker.stop(timeout);
        }
        if let Some(worker) = self.vision.take() {
            worker.stop(timeout);
        }
        self.vision_geometry = None;
    }
}

impl Drop for FollowSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SimulatedVehicle;
    use crate::error::VisionError;
    use crate::geometry::ned;
    use crate::io::{
        DetectionScript, ReplayFrameSource, ScriptedDetector, ScriptedTracker,
        scripted_tracker_factory,
    };
    use crate::vision::{BoundingBox, Detection};
    use approx::assert_relative_eq;
    use std::thread;
    use std::time::{Duration, Instant};

    type ReplayParts = (
        ReplayFrameSource,
        ScriptedDetector,
        TrackerBox,
    );

    type TrackerBox = Box<dyn FnMut() -> std::result::Result<ScriptedTracker, VisionError>>;

    fn test_config() -> FollowConfig {
        let mut config = FollowConfig::default();
        config.vision.frame_period_ms = 5;
        config.vision.read_retry_backoff_ms = 5;
        config.vision.startup_timeout_ms = 2000;
        config.control.control_period_ms = 10;
        config
    }

    /// A person straight ahead at 4 m on every frame.
    fn replay_builder() -> impl FnOnce() -> Result<ReplayParts> + Send + 'static {
        || -> Result<ReplayParts> {
            let mut script = DetectionScript::default();
            script.push(0, Detection::new(BoundingBox::new(270, 140, 100, 200), 0.9));
            let script = Arc::new(script);
            let tracker_factory: TrackerBox = Box::new(scripted_tracker_factory(Arc::clone(&script)));
            Ok((
                ReplayFrameSource::new(Arc::clone(&script), FrameGeometry::new(640, 480), true),
                ScriptedDetector::new(script),
                tracker_factory,
            ))
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_vision_publishes_target() {
        let mut system = FollowSystem::new(test_config()).unwrap();
        system.start_vision(replay_builder()).unwrap();
        assert_eq!(system.vision_geometry(), Some(FrameGeometry::new(640, 480)));
        assert!(system.is_vision_running());

        assert!(wait_for(|| system.get_target_position().is_some()));
        let position = system.get_target_position().unwrap();
        assert_relative_eq!(position, ned(4.0, 0.0, -1.7), epsilon = 1e-9);
        assert_relative_eq!(system.get_target_distance().unwrap(), 4.0, epsilon = 1e-9);

        assert!(system.stop_vision());
        assert!(system.get_target_position().is_none());
        assert!(!system.stop_vision());
    }

    #[test]
    fn test_second_start_keeps_running_pipeline() {
        let mut system = FollowSystem::new(test_config()).unwrap();
        system.start_vision(replay_builder()).unwrap();
        system.start_vision(replay_builder()).unwrap();
        assert!(system.is_vision_running());
        system.shutdown();
        assert!(!system.is_vision_running());
    }

    #[test]
    fn test_failed_build_reports_error() {
        let mut system = FollowSystem::new(test_config()).unwrap();
        let result = system.start_vision(|| -> Result<ReplayParts> {
            bail!("Failed to open camera")
        });

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open camera"));
        assert!(!system.is_vision_running());
    }

    #[test]
    fn test_following_drives_vehicle_and_hovers_on_stop() {
        let mut system = FollowSystem::new(test_config()).unwrap();
        system.start_vision(replay_builder()).unwrap();
        assert!(wait_for(|| system.get_target_position().is_some()));

        let vehicle = SimulatedVehicle::new(ned(0.0, 0.0, 0.0));
        system
            .start_following(vehicle.clone(), vehicle.clone())
            .unwrap();
        assert!(system.is_following());
        assert!(wait_for(|| vehicle.commands_received() > 2));

        assert!(system.stop_following());
        assert!(!system.is_following());
        assert_eq!(vehicle.velocity(), ned(0.0, 0.0, 0.0));
        assert!(!system.stop_following());
    }

    #[test]
    fn test_change_tracking_distance_selects_preset() {
        let mut system = FollowSystem::new(test_config()).unwrap();
        assert_eq!(system.active_profile().target_distance(), 5.0);

        let profile = system.change_tracking_distance(8.0);
        assert_eq!(profile, ProfilePreset::Far.profile());
        assert_eq!(system.active_profile(), profile);

        let status = system.status();
        assert_eq!(status.preset, ProfilePreset::Far);
        assert_eq!(status.tracking_distance, 10.0);
        assert!(!status.target_detected);
        assert!(!status.vision_running);
        assert!(!status.following);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = test_config();
        config.initial_distance = 0.0;
        assert!(FollowSystem::new(config).is_err());
    }
}
