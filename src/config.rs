//! Configuration for the exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::metric::StringValueMapping;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server listens on (default: "0.0.0.0:9513").
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path for the metrics endpoint (default: "/metrics").
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Devices to subscribe to.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Per-path mapping of string telemetry values to numbers. Keys carry a
    /// leading slash, e.g. "/interfaces/interface/state/oper-state".
    #[serde(default)]
    pub string_value_mapping: StringValueMapping,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_listen_address() -> String {
    "0.0.0.0:9513".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// One telemetry device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Device hostname; also emitted as the `device` label.
    pub hostname: String,

    /// gRPC port (default: 32767).
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP/2 keepalive interval in seconds (default: 10).
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Keepalive timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Resubscribe after a lost stream (default: true).
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    /// Stop the session after this many messages; 0 means unlimited.
    #[serde(default)]
    pub max_messages: usize,

    /// Sensor paths to subscribe to.
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

fn default_port() -> u16 {
    32767
}

fn default_keepalive_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_reconnect() -> bool {
    true
}

/// One sensor path subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Sensor path, e.g. "/interfaces/".
    pub path: String,

    /// Ask the device to suppress unchanged samples.
    #[serde(default)]
    pub suppress_unchanged: bool,

    /// Maximum interval between samples when suppression is on (ms).
    #[serde(default)]
    pub max_silent_interval_ms: u32,

    /// Sampling frequency in milliseconds (default: 2000).
    #[serde(default = "default_sample_frequency_ms")]
    pub sample_frequency_ms: u32,
}

fn default_sample_frequency_ms() -> u32 {
    2000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .listen_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.listen_address
            )));
        }

        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.targets.is_empty() {
            return Err(ConfigError::Validation(
                "At least one target is required".to_string(),
            ));
        }

        for target in &self.targets {
            if target.hostname.is_empty() {
                return Err(ConfigError::Validation(
                    "Target hostname must not be empty".to_string(),
                ));
            }
            if target.paths.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Target {} has no paths",
                    target.hostname
                )));
            }
            for path in &target.paths {
                if path.path.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "Target {} has an empty path",
                        target.hostname
                    )));
                }
            }
        }

        Ok(())
    }
}
