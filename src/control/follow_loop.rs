//! Fixed-rate control loop that turns target estimates into velocity commands.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::geometry::NedPosition;
use crate::profile::DistanceProfile;
use crate::system::messages::{CommandTelemetry, TelemetryMsg, emit};
use crate::system::shared_state::TargetSource;
use crate::system::worker::StopToken;

use super::capabilities::{CommandSink, PositionSource, VelocityCommand};

/// Timing for the control worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Tick period (~10 Hz).
    pub control_period_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_period_ms: 100,
        }
    }
}

impl ControlConfig {
    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_period("control_period_ms", self.control_period_ms)
    }
}

/// The profile the follow loop currently uses.
///
/// Cloned handles share one slot; a swap is seen by the next `get`.
#[derive(Debug, Clone)]
pub struct ActiveProfile {
    inner: Arc<RwLock<DistanceProfile>>,
}

impl ActiveProfile {
    pub fn new(profile: DistanceProfile) -> Self {
        Self {
            inner: Arc::new(RwLock::new(profile)),
        }
    }

    pub fn get(&self) -> DistanceProfile {
        *self.inner.read()
    }

    /// Replace the profile, returning the previous one.
    pub fn swap(&self, profile: DistanceProfile) -> DistanceProfile {
        std::mem::replace(&mut *self.inner.write(), profile)
    }
}

/// Why a tick sent a hover command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverReason {
    NoTarget,
    NoPosition,
}

/// Result of one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Movement command sent.
    Following {
        command: VelocityCommand,
        at_distance: bool,
    },
    /// Zero velocity sent.
    Hover(HoverReason),
    /// The sink rejected the command; retried on the next tick.
    SendFailed(VelocityCommand),
}

/// Control loop counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowStats {
    pub ticks: u64,
    pub commands: u64,
    pub hovers: u64,
    pub send_failures: u64,
    pub position_failures: u64,
}

/// Reads the shared target, asks the active profile for a velocity and
/// forwards it to the vehicle.
pub struct FollowController<T: ?Sized, C, P> {
    target: Arc<T>,
    sink: C,
    position: P,
    profile: ActiveProfile,
    config: ControlConfig,
    telemetry: Option<Sender<TelemetryMsg>>,
    stats: FollowStats,
}

impl<T, C, P> FollowController<T, C, P>
where
    T: TargetSource + ?Sized,
    C: CommandSink,
    P: PositionSource,
{
    pub fn new(
        target: Arc<T>,
        sink: C,
        position: P,
        profile: ActiveProfile,
        config: ControlConfig,
    ) -> Self {
        Self {
            target,
            sink,
            position,
            profile,
            config,
            telemetry: None,
            stats: FollowStats::default(),
        }
    }

    pub fn with_telemetry(mut self, sender: Sender<TelemetryMsg>) -> Self {
        self.telemetry = Some(sender);
        self
    }

    pub fn stats(&self) -> &FollowStats {
        &self.stats
    }

    pub fn sink(&self) -> &C {
        &self.sink
    }

    /// One control iteration.
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        let profile = self.profile.get();

        let target = self.target.latest_target().map(|t| t.position);
        let (command, vehicle, outcome) = match target {
            None => (
                VelocityCommand::hover(),
                None,
                TickOutcome::Hover(HoverReason::NoTarget),
            ),
            Some(target) => match self.position.current_position() {
                Ok(current) => {
                    let velocity = profile.calculate_movement_vector(&current, &target);
                    let command = VelocityCommand::from(velocity);
                    let at_distance = profile.is_at_desired_distance(&current, &target);
                    (
                        command,
                        Some(current),
                        TickOutcome::Following {
                            command,
                            at_distance,
                        },
                    )
                }
                Err(e) => {
                    warn!("{}", e);
                    self.stats.position_failures += 1;
                    (
                        VelocityCommand::hover(),
                        None,
                        TickOutcome::Hover(HoverReason::NoPosition),
                    )
                }
            },
        };

        if let Err(e) = self.sink.send_velocity(command) {
            warn!("{}", e);
            self.stats.send_failures += 1;
            return TickOutcome::SendFailed(command);
        }

        match outcome {
            TickOutcome::Hover(_) => self.stats.hovers += 1,
            _ => self.stats.commands += 1,
        }
        self.emit_telemetry(command, target, vehicle, &profile);
        outcome
    }

    fn emit_telemetry(
        &self,
        command: VelocityCommand,
        target: Option<NedPosition>,
        vehicle: Option<NedPosition>,
        profile: &DistanceProfile,
    ) {
        emit(
            self.telemetry.as_ref(),
            TelemetryMsg::Command(CommandTelemetry {
                tick: self.stats.ticks,
                velocity: command.into(),
                target,
                vehicle,
                target_distance: profile.target_distance(),
            }),
        );
    }

    /// Tick at the configured rate until `stop` is cancelled, then send one
    /// final hover command.
    pub fn run(mut self, stop: &StopToken) -> FollowStats {
        info!("Follow loop started");
        let period = self.config.control_period();

        while !stop.is_cancelled() {
            let started = Instant::now();
            let outcome = self.tick();
            debug!("Tick {}: {:?}", self.stats.ticks, outcome);

            let rest = period.saturating_sub(started.elapsed());
            if stop.wait_timeout(rest) {
                break;
            }
        }

        if let Err(e) = self.sink.send_velocity(VelocityCommand::hover()) {
            warn!("Final hover failed: {}", e);
            self.stats.send_failures += 1;
        }

        let stats = self.stats;
        info!(
            "Follow loop ended: {} ticks, {} commands, {} hovers, {} send failures",
            stats.ticks, stats.commands, stats.hovers, stats.send_failures
        );
        stats
    }
}
