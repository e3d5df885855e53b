//! In-process stand-in for a flight controller.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ControlError;
use crate::geometry::{NedPosition, NedVelocity};

use super::capabilities::{CommandSink, PositionSource, VelocityCommand};

#[derive(Debug)]
struct VehicleState {
    position: NedPosition,
    velocity: NedVelocity,
    updated_at: Instant,
    commands: u64,
}

impl VehicleState {
    /// Advance the position with the last commanded velocity.
    fn integrate(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.position += self.velocity * dt;
        self.updated_at = now;
    }
}

/// Point-mass vehicle that flies exactly the velocity it was last given.
///
/// Clones share the same vehicle, so one handle can be the command sink
/// while another reports the position.
#[derive(Debug, Clone)]
pub struct SimulatedVehicle {
    state: Arc<Mutex<VehicleState>>,
}

impl SimulatedVehicle {
    pub fn new(start: NedPosition) -> Self {
        Self {
            state: Arc::new(Mutex::new(VehicleState {
                position: start,
                velocity: NedVelocity::zeros(),
                updated_at: Instant::now(),
                commands: 0,
            })),
        }
    }

    pub fn position(&self) -> NedPosition {
        self.position_at(Instant::now())
    }

    pub fn velocity(&self) -> NedVelocity {
        self.state.lock().velocity
    }

    pub fn commands_received(&self) -> u64 {
        self.state.lock().commands
    }

    fn apply(&self, command: VelocityCommand, now: Instant) {
        let mut state = self.state.lock();
        state.integrate(now);
        state.velocity = command.into();
        state.commands += 1;
    }

    fn position_at(&self, now: Instant) -> NedPosition {
        let mut state = self.state.lock();
        state.integrate(now);
        state.position
    }
}

impl CommandSink for SimulatedVehicle {
    fn send_velocity(&mut self, command: VelocityCommand) -> Result<(), ControlError> {
        debug!(
            "Sim velocity: ({:.2}, {:.2}, {:.2})",
            command.north, command.east, command.down
        );
        self.apply(command, Instant::now());
        Ok(())
    }
}

impl PositionSource for SimulatedVehicle {
    fn current_position(&mut self) -> Result<NedPosition, ControlError> {
        Ok(self.position())
    }
}
