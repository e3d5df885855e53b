//! Telemetry messages emitted by the worker threads.
//!
//! Sent over a bounded channel with `try_send`: when the consumer falls
//! behind, messages are dropped rather than stalling a loop.

use crossbeam_channel::Sender;

use crate::geometry::{NedPosition, NedVelocity};
use crate::vision::{BoundingBox, DetectTrackState};

/// Capacity of the telemetry channel.
pub const TELEMETRY_CHANNEL_CAPACITY: usize = 64;

/// Result of one vision cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionTelemetry {
    pub frame: u64,
    pub state: DetectTrackState,
    pub bbox: Option<BoundingBox>,
    pub position: Option<NedPosition>,
}

/// Command issued by one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandTelemetry {
    pub tick: u64,
    pub velocity: NedVelocity,
    pub target: Option<NedPosition>,
    pub vehicle: Option<NedPosition>,
    pub target_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryMsg {
    Vision(VisionTelemetry),
    Command(CommandTelemetry),
}

/// Best-effort send; never blocks.
pub(crate) fn emit(sender: Option<&Sender<TelemetryMsg>>, msg: TelemetryMsg) {
    if let Some(tx) = sender {
        let _ = tx.try_send(msg);
    }
}
