//! Vehicle-side capabilities consumed by the follow loop.

use crate::error::ControlError;
use crate::geometry::{NedPosition, NedVelocity};

/// Velocity setpoint in the local NED frame, m/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityCommand {
    pub north: f64,
    pub east: f64,
    pub down: f64,
}

impl VelocityCommand {
    pub fn new(north: f64, east: f64, down: f64) -> Self {
        Self { north, east, down }
    }

    /// Zero velocity: hold position.
    pub fn hover() -> Self {
        Self::default()
    }

    pub fn is_hover(&self) -> bool {
        self.north == 0.0 && self.east == 0.0 && self.down == 0.0
    }

    pub fn speed(&self) -> f64 {
        NedVelocity::from(*self).norm()
    }
}

impl From<NedVelocity> for VelocityCommand {
    fn from(v: NedVelocity) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<VelocityCommand> for NedVelocity {
    fn from(c: VelocityCommand) -> Self {
        NedVelocity::new(c.north, c.east, c.down)
    }
}

/// Where velocity commands go (flight controller link or simulator).
pub trait CommandSink {
    fn send_velocity(&mut self, command: VelocityCommand) -> Result<(), ControlError>;
}

/// Current vehicle position in the same NED frame as the target estimates.
pub trait PositionSource {
    fn current_position(&mut self) -> Result<NedPosition, ControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hover_is_zero() {
        let hover = VelocityCommand::hover();
        assert!(hover.is_hover());
        assert_eq!(hover, VelocityCommand::new(0.0, 0.0, 0.0));
        assert!(!VelocityCommand::new(0.0, 0.1, 0.0).is_hover());
    }

    #[test]
    fn test_conversion_keeps_axes() {
        let cmd = VelocityCommand::from(NedVelocity::new(1.0, -2.0, 2.0));
        assert_eq!(cmd, VelocityCommand::new(1.0, -2.0, 2.0));
        assert_relative_eq!(cmd.speed(), 3.0, epsilon = 1e-12);
    }
}
