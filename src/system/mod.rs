//! System orchestration and thread management.
//!
//! This module contains the top-level `FollowSystem` that spawns and
//! coordinates the vision and control threads, along with the shared target
//! slot, the worker/stop-token plumbing, the telemetry message types and the
//! interactive operator session.

mod follow_system;
pub mod messages;
pub mod session;
pub mod shared_state;
pub mod worker;

pub use follow_system::{FollowSystem, SystemStatus};
pub use messages::{CommandTelemetry, TELEMETRY_CHANNEL_CAPACITY, TelemetryMsg, VisionTelemetry};
pub use session::{COMMAND_HELP, Command, CommandError, SessionEnd, run_session};
pub use shared_state::{SharedTargetState, TargetObservation, TargetSlot, TargetSource};
pub use worker::{StopToken, Worker};
