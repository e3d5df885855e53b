//! Interactive operator session.
//!
//! Lines typed by the operator and termination signals arrive on two
//! channels. The session runs commands until `quit`, a signal, or the end of
//! input, and leaves the actual teardown to `FollowSystem::shutdown`.

use std::io::Write;

use anyhow::Result;
use crossbeam_channel::{Receiver, select};
use thiserror::Error;
use tracing::{info, warn};

use crate::control::SimulatedVehicle;

use super::follow_system::FollowSystem;

pub const COMMAND_HELP: &str = "Commands: start, stop, distance <m>, status, quit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Distance(f64),
    Status,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Usage: distance <meters>")]
    MissingDistance,
    #[error("Invalid distance: {0}")]
    InvalidDistance(String),
}

impl Command {
    /// Parse one input line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut parts = line.split_whitespace();
        let command = match (parts.next(), parts.next()) {
            (None, _) => return Ok(None),
            (Some("start"), _) => Command::Start,
            (Some("stop"), _) => Command::Stop,
            (Some("distance"), Some(value)) => match value.parse::<f64>() {
                Ok(d) if d.is_finite() && d > 0.0 => Command::Distance(d),
                _ => return Err(CommandError::InvalidDistance(value.to_string())),
            },
            (Some("distance"), None) => return Err(CommandError::MissingDistance),
            (Some("status"), _) => Command::Status,
            (Some("quit" | "exit"), _) => Command::Quit,
            (Some(other), _) => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Interrupted,
    InputClosed,
}

/// Run operator commands against `system` until the session ends.
///
/// `lines` disconnecting counts as end of input. Any message on `signals`
/// ends the session immediately.
pub fn run_session<W: Write>(
    system: &mut FollowSystem,
    vehicle: &SimulatedVehicle,
    lines: &Receiver<String>,
    signals: &Receiver<()>,
    out: &mut W,
) -> Result<SessionEnd> {
    loop {
        let line = select! {
            recv(signals) -> _ => {
                info!("Termination signal received");
                return Ok(SessionEnd::Interrupted);
            }
            recv(lines) -> line => match line {
                Ok(line) => line,
                Err(_) => return Ok(SessionEnd::InputClosed),
            },
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };

        match command {
            Command::Start => {
                if let Err(e) = system.start_following(vehicle.clone(), vehicle.clone()) {
                    warn!("{:#}", e);
                }
            }
            Command::Stop => {
                system.stop_following();
            }
            Command::Distance(d) => {
                let profile = system.change_tracking_distance(d);
                writeln!(
                    out,
                    "Tracking distance {:.1}m, max speed {:.1}m/s",
                    profile.target_distance(),
                    profile.max_speed()
                )?;
            }
            Command::Status => {
                writeln!(out, "{}", system.status())?;
                let p = vehicle.position();
                writeln!(out, "Vehicle: ({:.2}, {:.2}, {:.2})", p.x, p.y, p.z)?;
            }
            Command::Quit => return Ok(SessionEnd::Quit),
        }
    }
}
