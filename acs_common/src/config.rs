//! Configuration loading traits and station runtime settings.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all ACS applications, plus the `StationConfig` consumed by the
//! control unit binary.
//!
//! # Usage
//!
//! ```rust,no_run
//! use acs_common::config::{ConfigLoader, ConfigError, StationConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let station = StationConfig::load(Path::new("station.toml"))?;
//!     station.validate()?;
//!     println!("CAN bitrate: {}", station.can.bitrate);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::{
    CAN_ERROR_LOG_PERIOD_MS, CAN_STATUS_STALE_MS, CYCLE_TIME_US, DEFAULT_CONFIG_BLOB,
    DEFAULT_ENDPOINTS_CSV, DEFAULT_SEQUENCE_CSV, PORT_COUNT, STATUS_POLL_PERIOD_MS,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML or CSV parsing failed.
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
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common fields shared across ACS applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "acs-station-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
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

fn default_service_name() -> String {
    "acs-station".to_string()
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
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

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Station Runtime Config ─────────────────────────────────────────

/// How received CAN frames reach the receive log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanRxMode {
    /// Main loop drains the controller mailboxes into the log.
    #[default]
    Poll,
    /// Controller receive interrupt pushes frames into the log.
    Interrupt,
}

/// Serial bus backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SerialBackend {
    /// In-process simulated motor controllers on every port.
    #[default]
    Simulation,
    /// Packet-serial over TCP serial bridges listed in `[[serial.ports]]`.
    Bridge,
    /// Packet-serial over local serial devices listed in `[[serial.ports]]`.
    Native,
}

/// CAN bus backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanBackend {
    /// In-process simulated controller with simulated servos.
    #[default]
    Simulation,
    /// Linux SocketCAN network interface named by `[can] interface`.
    #[serde(rename = "socketcan")]
    SocketCan,
}

/// One serial port bound to a TCP serial bridge or a local device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortBinding {
    /// 1-based RS422 port number.
    pub port: u8,
    /// Bridge address, e.g. `"127.0.0.1:4001"` (bridge backend).
    #[serde(default)]
    pub bridge: String,
    /// Device path, e.g. `"/dev/ttyUSB0"` (native backend).
    #[serde(default)]
    pub device: String,
}

impl SerialPortBinding {
    /// Link target used by `backend`, if that backend binds ports.
    pub fn target(&self, backend: SerialBackend) -> Option<&str> {
        match backend {
            SerialBackend::Simulation => None,
            SerialBackend::Bridge => Some(&self.bridge),
            SerialBackend::Native => Some(&self.device),
        }
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Backend driving the serial motor controllers.
    #[serde(default)]
    pub backend: SerialBackend,
    /// Line baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Per-transaction timeout [ms].
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u32,
    /// Bridge or device bindings (ports not listed stay unbound).
    #[serde(default)]
    pub ports: Vec<SerialPortBinding>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            backend: SerialBackend::default(),
            baud: default_baud(),
            timeout_ms: default_serial_timeout_ms(),
            ports: Vec::new(),
        }
    }
}

/// `[can]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanSettings {
    /// Backend driving the CAN controller.
    #[serde(default)]
    pub backend: CanBackend,
    /// Bus bitrate [bit/s].
    #[serde(default = "default_can_bitrate")]
    pub bitrate: u32,
    /// Receive path selection.
    #[serde(default)]
    pub rx_mode: CanRxMode,
    /// Network interface for the `socketcan` backend.
    #[serde(default = "default_can_interface")]
    pub interface: String,
}

impl Default for CanSettings {
    fn default() -> Self {
        Self {
            backend: CanBackend::default(),
            bitrate: default_can_bitrate(),
            rx_mode: CanRxMode::default(),
            interface: default_can_interface(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Endpoint table CSV.
    #[serde(default = "default_endpoints_csv")]
    pub endpoints_csv: PathBuf,
    /// Sequence CSV loaded at startup.
    #[serde(default = "default_sequence_csv")]
    pub sequence_csv: PathBuf,
    /// Persisted `AppConfig` blob.
    #[serde(default = "default_config_blob")]
    pub config_blob: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            endpoints_csv: default_endpoints_csv(),
            sequence_csv: default_sequence_csv(),
            config_blob: default_config_blob(),
        }
    }
}

/// `[timing]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Main cycle period [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u64,
    /// Status poller period [ms].
    #[serde(default = "default_status_poll_period_ms")]
    pub status_poll_period_ms: u32,
    /// Minimum spacing of repeated CAN error lines [ms].
    #[serde(default = "default_can_error_log_period_ms")]
    pub can_error_log_period_ms: u32,
    /// CAN servo status freshness window [ms].
    #[serde(default = "default_can_status_stale_ms")]
    pub can_status_stale_ms: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            cycle_time_us: default_cycle_time_us(),
            status_poll_period_ms: default_status_poll_period_ms(),
            can_error_log_period_ms: default_can_error_log_period_ms(),
            can_status_stale_ms: default_can_status_stale_ms(),
        }
    }
}

/// Complete station runtime configuration (`station.toml`).
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "acs-stage-left"
///
/// [can]
/// bitrate = 500000
/// rx_mode = "interrupt"
///
/// [serial]
/// backend = "bridge"
/// [[serial.ports]]
/// port = 1
/// bridge = "127.0.0.1:4001"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    /// Shared fields.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Serial motor bus settings.
    #[serde(default)]
    pub serial: SerialSettings,
    /// CAN transport settings.
    #[serde(default)]
    pub can: CanSettings,
    /// File locations.
    #[serde(default)]
    pub paths: PathSettings,
    /// Loop and poll timing.
    #[serde(default)]
    pub timing: TimingSettings,
}

impl StationConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` on zero rates or periods,
    /// out-of-range or duplicated port bindings, a binding without a
    /// target for the selected backend, or an empty CAN interface.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.can.bitrate == 0 {
            return Err(ConfigError::ValidationError(
                "can.bitrate must be > 0".to_string(),
            ));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::ValidationError(
                "serial.baud must be > 0".to_string(),
            ));
        }
        if self.timing.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "timing.cycle_time_us must be > 0".to_string(),
            ));
        }
        if self.timing.status_poll_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.status_poll_period_ms must be > 0".to_string(),
            ));
        }
        if self.timing.can_status_stale_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.can_status_stale_ms must be > 0".to_string(),
            ));
        }

        if self.can.backend == CanBackend::SocketCan && self.can.interface.is_empty() {
            return Err(ConfigError::ValidationError(
                "can.interface cannot be empty for socketcan".to_string(),
            ));
        }

        let mut seen = [false; PORT_COUNT];
        for binding in &self.serial.ports {
            let port = binding.port as usize;
            if port == 0 || port > PORT_COUNT {
                return Err(ConfigError::ValidationError(format!(
                    "serial port {} out of range [1, {}]",
                    binding.port, PORT_COUNT
                )));
            }
            if seen[port - 1] {
                return Err(ConfigError::ValidationError(format!(
                    "serial port {} bound twice",
                    binding.port
                )));
            }
            seen[port - 1] = true;
            if binding.target(self.serial.backend) == Some("") {
                return Err(ConfigError::ValidationError(format!(
                    "serial port {} has no {:?} target",
                    binding.port, self.serial.backend
                )));
            }
        }
        Ok(())
    }
}

fn default_baud() -> u32 {
    115_200
}

fn default_serial_timeout_ms() -> u32 {
    10
}

fn default_can_bitrate() -> u32 {
    1_000_000
}

fn default_can_interface() -> String {
    "can0".to_string()
}

fn default_endpoints_csv() -> PathBuf {
    PathBuf::from(DEFAULT_ENDPOINTS_CSV)
}

fn default_sequence_csv() -> PathBuf {
    PathBuf::from(DEFAULT_SEQUENCE_CSV)
}

fn default_config_blob() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_BLOB)
}

fn default_cycle_time_us() -> u64 {
    CYCLE_TIME_US
}

fn default_status_poll_period_ms() -> u32 {
    STATUS_POLL_PERIOD_MS
}

fn default_can_error_log_period_ms() -> u32 {
    CAN_ERROR_LOG_PERIOD_MS
}

fn default_can_status_stale_ms() -> u32 {
    CAN_STATUS_STALE_MS
}
