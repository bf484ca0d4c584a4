// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Longest window the summaries may look back, in days.
pub const MAX_DAYS: u32 = 36_500;

/// Which sensor backend the client reads from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Replays the bundled sample script, for tests and dry runs.
    #[default]
    Dummy,
    /// A BME680 on the Linux I2C bus.
    Bme680,
}

/// The client configuration, loaded from a JSON file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub data_directory: PathBuf,
    pub location: String,

    /// Uploads are skipped (and readings stay queued) when unset.
    #[serde(default)]
    pub collector_url: Option<String>,
    #[serde(default)]
    pub outbox_directory: Option<PathBuf>,

    /// Sampling budget in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    #[serde(default = "default_threshold")]
    pub stabilization_threshold: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    #[serde(default)]
    pub sensor: SensorKind,
    #[serde(default = "default_i2c_device")]
    pub i2c_device: PathBuf,

    /// Width of the smoothing buckets, in minutes.
    #[serde(default = "default_averaging")]
    pub averaging: u32,
    #[serde(default = "default_days_smoothed")]
    pub days_smoothed: u32,
    #[serde(default = "default_days_ranged")]
    pub days_ranged: u32,
}

fn default_timeout() -> f64 {
    180.0
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_threshold() -> f64 {
    0.05
}

fn default_request_timeout() -> f64 {
    10.0
}

fn default_i2c_device() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}

fn default_averaging() -> u32 {
    60
}

fn default_days_smoothed() -> u32 {
    7
}

fn default_days_ranged() -> u32 {
    12
}

impl Config {
    /// Reads and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        log::debug!("Loaded config from {}: {config:?}", path.display());

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.trim().is_empty() {
            return Err(ConfigError::Invalid("location must not be empty".into()));
        }
        if !(self.timeout > 0.0) {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if !(self.poll_interval > 0.0) {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        if !(self.stabilization_threshold > 0.0 && self.stabilization_threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "stabilization_threshold must lie in (0, 1), got {}",
                self.stabilization_threshold
            )));
        }
        if !(self.request_timeout > 0.0) {
            return Err(ConfigError::Invalid("request_timeout must be positive".into()));
        }
        if self.averaging == 0 {
            return Err(ConfigError::Invalid("averaging must be at least one minute".into()));
        }
        for (name, days) in [
            ("days_smoothed", self.days_smoothed),
            ("days_ranged", self.days_ranged),
        ] {
            if !(1..=MAX_DAYS).contains(&days) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must lie in 1..={MAX_DAYS}, got {days}"
                )));
            }
        }

        Ok(())
    }

    pub fn outbox_directory(&self) -> PathBuf {
        self.outbox_directory
            .clone()
            .unwrap_or_else(|| self.data_directory.join("outbox"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout)
    }

    pub fn averaging(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.averaging))
    }
}

#[test]
fn test_minimal_config_gets_defaults() {
    let config: Config =
        serde_json::from_str(r#"{ "data_directory": "/var/lib/sensors", "location": "attic" }"#)
            .unwrap();

    assert!(config.validate().is_ok());
    assert_eq!(config.timeout(), Duration::from_secs(180));
    assert_eq!(config.poll_interval(), Duration::from_secs(1));
    assert_eq!(config.sensor, SensorKind::Dummy);
    assert_eq!(config.collector_url, None);
    assert_eq!(
        config.outbox_directory(),
        PathBuf::from("/var/lib/sensors/outbox")
    );
}

#[test]
fn test_threshold_out_of_range_is_rejected() {
    let config: Config = serde_json::from_str(
        r#"{ "data_directory": "/tmp", "location": "attic", "stabilization_threshold": 1.5 }"#,
    )
    .unwrap();

    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_day_windows_are_bounded() {
    for days in ["0", "4000000000"] {
        let config: Config = serde_json::from_str(&format!(
            r#"{{ "data_directory": "/tmp", "location": "attic", "days_ranged": {days} }}"#
        ))
        .unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{days}");
    }
}

#[test]
fn test_load_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("config.json"));
}
