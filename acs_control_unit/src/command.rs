//! Core command surface.
//!
//! Typed operations an operator front-end issues against the running
//! station. Text parsing lives in the front-end; this module only defines
//! what can be asked and what comes back.

use std::path::PathBuf;

use acs_common::config::ConfigError;
use acs_common::endpoint::{EndpointConfig, EndpointKind};
use acs_common::persist::PersistError;
use acs_common::sequence::Mode;
use acs_hal::can::{CanHealth, RxDump, ServoStatus};
use acs_hal::poller::EndpointStatus;
use acs_hal::serial::RoboClawStatus;
use thiserror::Error;

use crate::sequence::{PlayerState, SequenceError};

/// One editable endpoint field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointField {
    /// Device family.
    Kind(EndpointKind),
    /// Packet-serial address or CAN id.
    Address(u32),
    /// 1-based serial port (0 for CAN).
    SerialPort(u8),
    /// Motor channel 1/2.
    Motor(u8),
    /// Lower position limit.
    PositionMin(i32),
    /// Upper position limit.
    PositionMax(i32),
    /// Velocity floor.
    VelocityMin(u32),
    /// Velocity ceiling (0 = floor only).
    VelocityMax(u32),
    /// Acceleration floor.
    AccelMin(u32),
    /// Acceleration ceiling (0 = floor only).
    AccelMax(u32),
    /// Encoder resolution; 0 disables unit conversion.
    PulsesPerRevolution(u32),
    /// Homing offset.
    HomeOffset(i32),
    /// Homing direction.
    HomeDirection(u8),
    /// Limit switch fitted.
    LimitSwitch(bool),
}

impl EndpointField {
    /// Write this field into `ep`.
    pub fn apply(self, ep: &mut EndpointConfig) {
        match self {
            Self::Kind(v) => ep.kind = v,
            Self::Address(v) => ep.address = v,
            Self::SerialPort(v) => ep.serial_port = v,
            Self::Motor(v) => ep.motor = v,
            Self::PositionMin(v) => ep.position_min = v,
            Self::PositionMax(v) => ep.position_max = v,
            Self::VelocityMin(v) => ep.velocity_min = v,
            Self::VelocityMax(v) => ep.velocity_max = v,
            Self::AccelMin(v) => ep.accel_min = v,
            Self::AccelMax(v) => ep.accel_max = v,
            Self::PulsesPerRevolution(v) => ep.pulses_per_revolution = v,
            Self::HomeOffset(v) => ep.home_offset = v,
            Self::HomeDirection(v) => ep.home_direction = u8::from(v != 0),
            Self::LimitSwitch(v) => ep.has_limit_switch = v,
        }
    }
}

/// Motion request for the direct command paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motion {
    /// Position mode or velocity mode.
    pub mode: Mode,
    /// Target position (direction sign in velocity mode).
    pub position: i32,
    /// Velocity in device units.
    pub velocity: u32,
    /// Acceleration in device units.
    pub accel: u32,
}

/// Operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read one endpoint record.
    GetEndpoint(u8),
    /// Change one field of an endpoint.
    SetEndpoint {
        /// 1-based endpoint id.
        id: u8,
        /// New field value.
        field: EndpointField,
    },
    /// Enable or disable an endpoint.
    SetEnabled {
        /// 1-based endpoint id.
        id: u8,
        /// New state.
        enabled: bool,
    },
    /// Persist the endpoint table.
    SaveConfig,
    /// Reload the endpoint table from storage.
    ResetConfig,
    /// Restore and persist factory defaults.
    FactoryReset,
    /// Apply an endpoint CSV (default path when `None`).
    LoadEndpoints(Option<PathBuf>),
    /// Write the endpoint table as CSV (default path when `None`).
    SaveEndpoints(Option<PathBuf>),
    /// Replace the sequence from a file (default path when `None`).
    LoadSequence(Option<PathBuf>),
    /// Write the sequence to a file (default path when `None`).
    SaveSequence(Option<PathBuf>),
    /// Event count, loop length and player state.
    SequenceInfo,
    /// Start or pause show time and playback.
    SetPlaying(bool),
    /// Stop playback and rewind show time.
    Rewind,
    /// Hold an endpoint at its last polled position.
    StopInPlace(u8),
    /// Last polled status of an endpoint.
    EndpointStatus(u8),
    /// Read a serial controller directly.
    SerialRead {
        /// 1-based port.
        port: u8,
        /// Packet-serial address.
        address: u8,
    },
    /// Command a serial motor directly, bypassing the endpoint table.
    SerialCommand {
        /// 1-based port.
        port: u8,
        /// Packet-serial address.
        address: u8,
        /// Motor channel 1/2.
        motor: u8,
        /// Requested motion.
        motion: Motion,
    },
    /// Request and read a CAN servo position.
    CanRead(u16),
    /// Command a CAN servo directly, in device units.
    CanCommand {
        /// Servo CAN id.
        can_id: u16,
        /// Requested motion.
        motion: Motion,
    },
    /// Bus health line.
    CanHealth,
    /// Drain up to `n` logged frames (0 = all).
    DumpCanLog(usize),
}

/// Command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Done, nothing to report.
    Ok,
    /// One endpoint record.
    Endpoint {
        /// 1-based endpoint id.
        id: u8,
        /// Current record.
        config: EndpointConfig,
    },
    /// Number of rows or events affected.
    Count(usize),
    /// Sequence summary.
    SequenceInfo {
        /// Events in the table.
        count: usize,
        /// Loop period [ms].
        loop_length_ms: u32,
        /// Player state.
        state: PlayerState,
        /// Show time [ms].
        show_time_ms: u32,
    },
    /// Polled endpoint status.
    Status(EndpointStatus),
    /// Direct serial read.
    Serial(RoboClawStatus),
    /// Direct CAN read; `None` until a reply arrives.
    Can(Option<ServoStatus>),
    /// Bus health.
    Health(CanHealth),
    /// Drained receive log.
    CanLog(RxDump),
}

/// Command failures.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Endpoint id outside the table.
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(u8),

    /// Endpoint is disabled.
    #[error("endpoint {0} is disabled")]
    Disabled(u8),

    /// Playback requested with an empty sequence.
    #[error("no sequence loaded")]
    NoSequence,

    /// No status has been polled for the endpoint yet.
    #[error("no status for endpoint {0}")]
    NoStatus(u8),

    /// Device did not answer or refused the command.
    #[error("device error: {0}")]
    Device(String),

    /// Edit rejected by the endpoint rules.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Blob storage failed.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Sequence table or file failed.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Anything that executes operator commands.
pub trait CommandExecutor {
    /// Run one command.
    ///
    /// # Errors
    ///
    /// See [`CommandError`].
    fn execute(&mut self, command: Command) -> Result<Response, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_apply_writes_one_field() {
        let mut ep = EndpointConfig::default();
        let before = ep;
        EndpointField::VelocityMax(800).apply(&mut ep);
        assert_eq!(ep.velocity_max, 800);
        assert_eq!(EndpointConfig { velocity_max: before.velocity_max, ..ep }, before);

        EndpointField::HomeDirection(7).apply(&mut ep);
        assert_eq!(ep.home_direction, 1);
        EndpointField::Kind(EndpointKind::MksServo).apply(&mut ep);
        assert!(ep.kind.is_can());
    }

    #[test]
    fn errors_render() {
        assert_eq!(CommandError::InvalidEndpoint(0).to_string(), "invalid endpoint 0");
        let e: CommandError = SequenceError::TableFull.into();
        assert_eq!(e.to_string(), "event table full");
    }
}
