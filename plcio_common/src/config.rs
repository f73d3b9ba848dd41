//! Configuration loading traits and types.
//!
//! Every plcio binary reads one TOML file through the blanket
//! [`ConfigLoader`] trait. [`PlcioConfig`] is the full runtime file:
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "plcio-01"
//!
//! [server]
//! segment = "plc"
//! cycle_time_us = 1000
//!
//! [[connections]]
//! id = 1
//! kind = "shm"
//! segment = "plc"
//!
//! [[updaters]]
//! connection = 1
//! interval_ms = 100
//! ```

use crate::consts::DEFAULT_CYCLE_TIME_US;
use crate::driver::api::ConnectionId;
use crate::driver::config::DriverConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all plcio applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

/// Hosted region served by the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Region name (mapped to `/plcio_<segment>`).
    pub segment: String,

    /// Dispatch loop tick in microseconds.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,
}

impl ServerConfig {
    /// Dispatch tick as Duration.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(u64::from(self.cycle_time_us))
    }
}

/// Periodic live-snapshot update for one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Connection whose updater runs.
    pub connection: ConnectionId,

    /// Update period in milliseconds.
    pub interval_ms: u64,
}

impl UpdaterConfig {
    /// Update period as Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcioConfig {
    /// Common fields.
    pub shared: SharedConfig,

    /// Hosted region, if this process is the server.
    #[serde(default)]
    pub server: Option<ServerConfig>,

    /// Driver connections.
    #[serde(default)]
    pub connections: Vec<DriverConnection>,

    /// Updater schedule.
    #[serde(default)]
    pub updaters: Vec<UpdaterConfig>,
}

impl PlcioConfig {
    /// Validate the runtime configuration.
    ///
    /// # Validation Rules
    /// 1. `shared` is valid
    /// 2. `server.segment` is non-empty and `server.cycle_time_us` > 0
    /// 3. every connection is valid and connection ids are unique
    /// 4. every updater references a configured connection and has
    ///    `interval_ms` > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if let Some(server) = &self.server {
            if server.segment.is_empty() {
                return Err(ConfigError::ValidationError(
                    "server.segment cannot be empty".to_string(),
                ));
            }
            if server.cycle_time_us == 0 {
                return Err(ConfigError::ValidationError(
                    "server.cycle_time_us must be greater than 0".to_string(),
                ));
            }
        }

        let mut ids = HashSet::with_capacity(self.connections.len());
        for conn in &self.connections {
            conn.validate()?;
            if !ids.insert(conn.id) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate connection id {}",
                    conn.id
                )));
            }
        }

        for updater in &self.updaters {
            if !ids.contains(&updater.connection) {
                return Err(ConfigError::ValidationError(format!(
                    "Updater references unknown connection {}",
                    updater.connection
                )));
            }
            if updater.interval_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Updater for connection {}: interval_ms must be greater than 0",
                    updater.connection
                )));
            }
        }

        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
///
/// Semantic validation is left to the loaded type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
