//! Error types shared across the vision and control loops.
//!
//! None of these are fatal to a running loop. The loops match on them at the
//! iteration boundary to decide whether to retry, force a redetection or hover.

use thiserror::Error;

/// Rejected `DistanceProfile` parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("target distance must be positive and finite, got {0}")]
    InvalidTargetDistance(f64),

    #[error("max speed must be positive and finite, got {0}")]
    InvalidMaxSpeed(f64),

    #[error("distance tolerance must be non-negative and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
}

/// Rejected runtime configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
}

impl ConfigError {
    /// Check a finite, strictly positive quantity.
    pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), Self> {
        if !value.is_finite() {
            return Err(Self::NonFinite { field, value });
        }
        if value <= 0.0 {
            return Err(Self::NotPositive { field, value });
        }
        Ok(())
    }

    /// Check a non-zero millisecond period.
    pub(crate) fn check_period(field: &'static str, millis: u64) -> Result<(), Self> {
        if millis == 0 {
            return Err(Self::NotPositive { field, value: 0.0 });
        }
        Ok(())
    }
}

/// Failures raised by the vision-side capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisionError {
    #[error("failed to read frame: {0}")]
    FrameRead(String),

    #[error("person detector failed: {0}")]
    Detector(String),

    #[error("tracker initialization failed: {0}")]
    TrackerInit(String),

    #[error("tracker lost the target: {0}")]
    TrackerFailure(String),
}

/// Failures raised by the vehicle-side capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("failed to send velocity command: {0}")]
    Send(String),

    #[error("vehicle position unavailable: {0}")]
    Position(String),
}
