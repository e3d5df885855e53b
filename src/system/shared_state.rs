//! Target state shared between the vision and control threads.
//!
//! A single overwrite slot: the vision thread publishes the latest estimate
//! (or its absence) and the control thread reads whatever was published last.
//! Nothing is queued, so a slow reader only ever sees stale data, never a
//! backlog.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::geometry::{NedPosition, horizontal};
use crate::vision::BoundingBox;

/// One completed target estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetObservation {
    /// Estimated target position, local NED.
    pub position: NedPosition,
    /// Image-space box the estimate was derived from.
    pub bbox: BoundingBox,
    /// When the frame behind this estimate was processed.
    pub observed_at: Instant,
}

impl TargetObservation {
    /// Horizontal distance from the camera to the target.
    pub fn horizontal_distance(&self) -> f64 {
        horizontal(&self.position).norm()
    }
}

/// Contents of the slot as of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetSlot {
    /// `None` means no target is currently known.
    pub target: Option<TargetObservation>,
    /// Number of publishes so far; 0 before the first one.
    pub sequence: u64,
    pub published_at: Option<Instant>,
}

/// Anything the follow loop can pull target estimates from.
pub trait TargetSource: Send + Sync {
    fn latest_target(&self) -> Option<TargetObservation>;
}

/// Single-writer, multi-reader overwrite slot for the current target.
///
/// The whole slot is replaced under a write lock, so readers never observe a
/// position whose components came from different publishes.
#[derive(Debug, Default)]
pub struct SharedTargetState {
    slot: RwLock<TargetSlot>,
}

impl SharedTargetState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the current target. Returns the new sequence number.
    pub fn publish(&self, target: Option<TargetObservation>) -> u64 {
        let mut slot = self.slot.write();
        slot.sequence += 1;
        slot.target = target;
        slot.published_at = Some(Instant::now());
        slot.sequence
    }

    /// Latest published target, if any.
    pub fn read(&self) -> Option<TargetObservation> {
        self.slot.read().target
    }

    /// Latest slot including bookkeeping.
    pub fn snapshot(&self) -> TargetSlot {
        *self.slot.read()
    }

    pub fn target_position(&self) -> Option<NedPosition> {
        self.read().map(|t| t.position)
    }

    /// Horizontal distance to the target in meters, if one is known.
    pub fn target_distance(&self) -> Option<f64> {
        self.read().map(|t| t.horizontal_distance())
    }
}

impl TargetSource for SharedTargetState {
    fn latest_target(&self) -> Option<TargetObservation> {
        self.read()
    }
}
