//! Top-level runtime configuration, loaded from YAML.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::control::ControlConfig;
use crate::error::ConfigError;
use crate::vision::{EstimatorConfig, VisionConfig};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    pub vision: VisionConfig,
    pub estimator: EstimatorConfig,
    pub control: ControlConfig,
    /// Tracking distance selected at startup, meters.
    pub initial_distance: f64,
    /// How long shutdown waits for each worker to exit.
    pub shutdown_timeout_ms: u64,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            vision: VisionConfig::default(),
            estimator: EstimatorConfig::default(),
            control: ControlConfig::default(),
            initial_distance: 5.0,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl FollowConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("Invalid config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("In {}", path.display()))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vision.validate()?;
        self.estimator.validate()?;
        self.control.validate()?;
        ConfigError::check_positive("initial_distance", self.initial_distance)
    }
}
