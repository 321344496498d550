//! Endpoint model: per-axis configuration records and the system table.
//!
//! An endpoint is one controllable motion axis, whichever bus it rides on.
//! The table holds [`MAX_ENDPOINTS`] slots addressed by 1-based ids; all
//! access goes through bounds-checked accessors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;
use crate::consts::{MAX_ENDPOINTS, MAX_STANDARD_CAN_ID, PORT_COUNT};

// ─── Kind / Transport ───────────────────────────────────────────────

/// Transport family an endpoint kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// RS422 serial motor controller, addressed by port + address + motor.
    Serial,
    /// CAN servo drive, addressed by arbitration id.
    Can,
}

/// Device protocol family of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EndpointKind {
    /// RoboClaw packet-serial controller (two motors per address).
    #[default]
    RoboClaw = 0,
    /// MKS SERVO42/57D closed-loop stepper on CAN.
    MksServo = 1,
    /// REV FRC CAN motor controller.
    RevFrcCan = 2,
    /// Joe servo on the serial bus.
    JoeServoSerial = 3,
    /// Joe servo on CAN.
    JoeServoCan = 4,
}

impl EndpointKind {
    /// All kinds in numeric order.
    pub const ALL: [EndpointKind; 5] = [
        Self::RoboClaw,
        Self::MksServo,
        Self::RevFrcCan,
        Self::JoeServoSerial,
        Self::JoeServoCan,
    ];

    /// Transport family of this kind.
    pub const fn transport(self) -> Transport {
        match self {
            Self::RoboClaw | Self::JoeServoSerial => Transport::Serial,
            Self::MksServo | Self::RevFrcCan | Self::JoeServoCan => Transport::Can,
        }
    }

    /// `true` for CAN-family kinds.
    pub const fn is_can(self) -> bool {
        matches!(self.transport(), Transport::Can)
    }

    /// Canonical upper-case name used in CSV files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RoboClaw => "ROBOCLAW",
            Self::MksServo => "MKS_SERVO",
            Self::RevFrcCan => "REV_FRC_CAN",
            Self::JoeServoSerial => "JOE_SERVO_SERIAL",
            Self::JoeServoCan => "JOE_SERVO_CAN",
        }
    }

    /// Short display name.
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::RoboClaw => "RC",
            Self::MksServo => "MKS",
            Self::RevFrcCan => "REV",
            Self::JoeServoSerial => "JS",
            Self::JoeServoCan => "JC",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for EndpointKind {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| ConfigError::ParseError(format!("unknown endpoint kind {value}")))
    }
}

impl FromStr for EndpointKind {
    type Err = ConfigError;

    /// Accepts a numeric kind (0–4), a canonical name or an alias,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Ok(n) = text.parse::<u8>() {
            return Self::try_from(n);
        }
        match text.to_ascii_uppercase().as_str() {
            "ROBOCLAW" | "RC" => Ok(Self::RoboClaw),
            "MKS_SERVO" | "MKS" => Ok(Self::MksServo),
            "REV_FRC_CAN" | "REV" | "FRC_CAN" => Ok(Self::RevFrcCan),
            "JOE_SERVO_SERIAL" | "JOE_SERIAL" | "JS" => Ok(Self::JoeServoSerial),
            "JOE_SERVO_CAN" | "JOE_CAN" | "JC" => Ok(Self::JoeServoCan),
            _ => Err(ConfigError::ParseError(format!(
                "unknown endpoint type '{text}'"
            ))),
        }
    }
}

// ─── EndpointConfig ─────────────────────────────────────────────────

/// Configuration record for one motion axis.
///
/// Ranges are expressed in whichever unit the axis uses: device units when
/// `pulses_per_revolution == 0`, engineering units otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Protocol family.
    pub kind: EndpointKind,
    /// 1-based serial port for serial kinds, 0 for CAN kinds.
    pub serial_port: u8,
    /// Motor channel on a serial controller (1 or 2), unused for CAN.
    pub motor: u8,
    /// Serial device address or CAN arbitration id.
    pub address: u32,
    /// Whether the endpoint takes part in dispatch and polling.
    pub enabled: bool,
    /// Lowest commandable position.
    pub position_min: i32,
    /// Highest commandable position.
    pub position_max: i32,
    /// Lowest commandable velocity.
    pub velocity_min: u32,
    /// Highest commandable velocity (0 = floor only).
    pub velocity_max: u32,
    /// Lowest commandable acceleration.
    pub accel_min: u32,
    /// Highest commandable acceleration (0 = floor only).
    pub accel_max: u32,
    /// Pulses per output revolution; 0 selects device-unit passthrough.
    pub pulses_per_revolution: u32,
    /// Homing offset.
    pub home_offset: i32,
    /// Homing direction (0 or 1).
    pub home_direction: u8,
    /// Whether a limit switch is wired.
    pub has_limit_switch: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            kind: EndpointKind::RoboClaw,
            serial_port: 1,
            motor: 1,
            address: 0x80,
            enabled: false,
            position_min: 0,
            position_max: 0,
            velocity_min: 0,
            velocity_max: 3000,
            accel_min: 0,
            accel_max: 6000,
            pulses_per_revolution: 0,
            home_offset: 0,
            home_direction: 0,
            has_limit_switch: false,
        }
    }
}

impl EndpointConfig {
    /// Transport family of this endpoint.
    #[inline]
    pub const fn transport(&self) -> Transport {
        self.kind.transport()
    }

    /// CAN id when the endpoint is a CAN kind with a standard identifier.
    pub fn can_id(&self) -> Option<u16> {
        (self.kind.is_can() && self.address <= MAX_STANDARD_CAN_ID).then_some(self.address as u16)
    }

    /// Packet-serial address when the endpoint is a serial kind and the
    /// address fits in one byte.
    pub fn serial_address(&self) -> Option<u8> {
        if self.kind.is_can() {
            return None;
        }
        u8::try_from(self.address).ok()
    }

    /// 0-based serial port index when the port is in range.
    pub fn port_index(&self) -> Option<usize> {
        let port = self.serial_port as usize;
        (1..=PORT_COUNT).contains(&port).then(|| port - 1)
    }

    /// Check the transport addressing invariants.
    ///
    /// Disabled endpoints always pass.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` naming the violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        match self.transport() {
            Transport::Can => {
                if self.serial_port != 0 {
                    return Err(ConfigError::ValidationError(
                        "CAN port must be 0".to_string(),
                    ));
                }
                if self.kind == EndpointKind::MksServo && self.address > MAX_STANDARD_CAN_ID {
                    return Err(ConfigError::ValidationError(format!(
                        "MKS CAN ID must be 0-0x{MAX_STANDARD_CAN_ID:X}"
                    )));
                }
            }
            Transport::Serial => {
                if self.port_index().is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "serial port must be 1-{PORT_COUNT}"
                    )));
                }
                if self.serial_address().is_none() {
                    return Err(ConfigError::ValidationError(
                        "serial address must be 0-0xFF".to_string(),
                    ));
                }
                if self.kind == EndpointKind::RoboClaw && !(1..=2).contains(&self.motor) {
                    return Err(ConfigError::ValidationError(
                        "RoboClaw motor must be 1-2".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ─── AppConfig ──────────────────────────────────────────────────────

/// Persistence header identifying a compatible configuration blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfigHeader {
    /// Blob signature.
    pub magic: u32,
    /// Layout version.
    pub version: u16,
    /// Encoded blob size [bytes].
    pub size: u16,
}

impl ConfigHeader {
    /// "CFG1".
    pub const MAGIC: u32 = 0x4346_4731;
    /// Current layout version.
    pub const VERSION: u16 = 4;

    /// Header this build writes and accepts.
    pub fn current() -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            size: crate::persist::blob_size(),
        }
    }
}

/// Whole-system configuration: header plus the fixed endpoint table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Persistence header.
    pub header: ConfigHeader,
    endpoints: [EndpointConfig; MAX_ENDPOINTS],
}

impl Default for AppConfig {
    /// Factory defaults: every slot a RoboClaw on port 1 alternating motors
    /// 1/2 at address 0x80, only the first two slots enabled.
    fn default() -> Self {
        Self {
            header: ConfigHeader::current(),
            endpoints: std::array::from_fn(|i| EndpointConfig {
                motor: (i % 2) as u8 + 1,
                enabled: i < 2,
                ..EndpointConfig::default()
            }),
        }
    }
}

impl AppConfig {
    /// Build a table from explicit slots with a current header.
    pub fn from_endpoints(endpoints: [EndpointConfig; MAX_ENDPOINTS]) -> Self {
        Self {
            header: ConfigHeader::current(),
            endpoints,
        }
    }

    /// All-default slots with a zeroed header (layout probe for sizing).
    pub(crate) fn blank() -> Self {
        Self {
            header: ConfigHeader::default(),
            endpoints: [EndpointConfig::default(); MAX_ENDPOINTS],
        }
    }

    /// Endpoint by 1-based id.
    pub fn endpoint(&self, id: u8) -> Option<&EndpointConfig> {
        Self::slot(id).map(|i| &self.endpoints[i])
    }

    /// Mutable endpoint by 1-based id.
    pub fn endpoint_mut(&mut self, id: u8) -> Option<&mut EndpointConfig> {
        Self::slot(id).map(move |i| &mut self.endpoints[i])
    }

    /// Replace a slot after validating the new record.
    ///
    /// # Errors
    ///
    /// `ValidationError` for a bad id or a record violating its invariants;
    /// the table is left unchanged.
    pub fn set_endpoint(&mut self, id: u8, endpoint: EndpointConfig) -> Result<(), ConfigError> {
        let slot = Self::slot(id).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "endpoint id {id} out of range [1, {MAX_ENDPOINTS}]"
            ))
        })?;
        endpoint.validate()?;
        self.endpoints[slot] = endpoint;
        Ok(())
    }

    /// Iterate `(id, endpoint)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &EndpointConfig)> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(i, ep)| ((i + 1) as u8, ep))
    }

    /// Iterate enabled endpoints only.
    pub fn enabled(&self) -> impl Iterator<Item = (u8, &EndpointConfig)> {
        self.iter().filter(|(_, ep)| ep.enabled)
    }

    /// Validate every slot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, ep) in self.iter() {
            ep.validate()
                .map_err(|e| ConfigError::ValidationError(format!("endpoint {id}: {e}")))?;
        }
        Ok(())
    }

    #[inline]
    fn slot(id: u8) -> Option<usize> {
        let id = id as usize;
        (1..=MAX_ENDPOINTS).contains(&id).then(|| id - 1)
    }
}
