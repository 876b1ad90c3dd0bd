//! Instance lock configuration.
//!
//! This module handles loading and validation of the reset schedule
//! settings from TOML files, with serde-supplied defaults for every field.

use crate::error::InstanceLockError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Default hour of day for daily and weekly resets
fn default_daily_hour() -> u32 {
    9
}

/// Default day of week for weekly resets (days counted from Sunday)
fn default_weekly_day() -> u32 {
    2 // Tuesday
}

/// Reset schedule settings.
///
/// Consumed only by the reset time computation; the weekly schedule reuses
/// `daily_hour` as its hour of day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetScheduleConfig {
    /// Hour of day (local time, 0-23) at which resets occur
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,

    /// Day of week (0 = Sunday) on which weekly resets occur
    #[serde(default = "default_weekly_day")]
    pub weekly_day: u32,
}

impl Default for ResetScheduleConfig {
    fn default() -> Self {
        Self {
            daily_hour: default_daily_hour(),
            weekly_day: default_weekly_day(),
        }
    }
}

/// Top-level configuration for the instance lock subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceLockConfig {
    /// Reset schedule settings
    #[serde(default)]
    pub reset_schedule: ResetScheduleConfig,
}

impl InstanceLockConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, InstanceLockError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| InstanceLockError::Config(e.to_string()))?;
            let config: InstanceLockConfig =
                toml::from_str(&content).map_err(|e| InstanceLockError::Config(e.to_string()))?;
            config.validate().map_err(InstanceLockError::Config)?;
            Ok(config)
        } else {
            let default_config = InstanceLockConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)
                .map_err(|e| InstanceLockError::Config(e.to_string()))?;
            tokio::fs::write(path, toml_content)
                .await
                .map_err(|e| InstanceLockError::Config(e.to_string()))?;
            info!("Created default instance lock configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.reset_schedule.daily_hour > 23 {
            return Err(format!(
                "reset_schedule.daily_hour must be 0-23, got {}",
                self.reset_schedule.daily_hour
            ));
        }
        if self.reset_schedule.weekly_day > 6 {
            return Err(format!(
                "reset_schedule.weekly_day must be 0-6, got {}",
                self.reset_schedule.weekly_day
            ));
        }
        Ok(())
    }
}
