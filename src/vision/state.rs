//! Detect-then-track state machine states.

/// State of the vision pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectTrackState {
    /// No camera session yet.
    #[default]
    Idle,
    /// Waiting for the detector to find someone.
    Detecting,
    /// Following the target with the short-term tracker.
    Tracking,
    /// Tracker lost the target; the next frame must run detection.
    RecoveringFromFailure,
}

impl DetectTrackState {
    pub fn label(self) -> &'static str {
        match self {
            DetectTrackState::Idle => "IDLE",
            DetectTrackState::Detecting => "DETECTING",
            DetectTrackState::Tracking => "TRACKING",
            DetectTrackState::RecoveringFromFailure => "RECOVERING",
        }
    }
}
