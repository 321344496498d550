//! Serial Motor Bus.
//!
//! Owns one [`RoboClawDriver`] per physical RS422 port. Ports without a
//! serial backing stay unbound; every operation on them fails without
//! touching the wire. No retry and no queueing across calls.

pub mod bridge;
pub mod device;
pub mod protocol;
pub mod sim;

use acs_common::consts::PORT_COUNT;
use tracing::debug;

use crate::error::BusError;

/// Motor channel on a dual-channel controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motor {
    /// Channel 1.
    M1,
    /// Channel 2.
    M2,
}

impl TryFrom<u8> for Motor {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::M1),
            2 => Ok(Self::M2),
            other => Err(other),
        }
    }
}

/// Reinterpret a wire `u32` as two's-complement `i32` (bit pattern kept).
#[inline]
pub const fn to_signed32(raw: u32) -> i32 {
    i32::from_ne_bytes(raw.to_ne_bytes())
}

/// Reinterpret an `i32` as its two's-complement `u32` wire pattern.
#[inline]
pub const fn to_unsigned32(value: i32) -> u32 {
    u32::from_ne_bytes(value.to_ne_bytes())
}

/// Result of one status read; each field group carries its own validity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoboClawStatus {
    /// Encoder count, motor 1.
    pub enc1: i32,
    /// Encoder count, motor 2.
    pub enc2: i32,
    /// Encoder read succeeded.
    pub enc_valid: bool,
    /// Instantaneous speed, motor 1.
    pub speed1: i32,
    /// Instantaneous speed, motor 2.
    pub speed2: i32,
    /// Speed read succeeded.
    pub speed_valid: bool,
    /// Controller error flags.
    pub error: u32,
    /// Error read succeeded.
    pub error_valid: bool,
}

impl RoboClawStatus {
    /// `true` when at least one field group is valid.
    pub const fn any_valid(&self) -> bool {
        self.enc_valid || self.speed_valid || self.error_valid
    }

    /// Encoder and speed for one channel, if the encoder read succeeded.
    pub const fn channel(&self, motor: Motor) -> Option<(i32, i32)> {
        if !self.enc_valid {
            return None;
        }
        match motor {
            Motor::M1 => Some((self.enc1, self.speed1)),
            Motor::M2 => Some((self.enc2, self.speed2)),
        }
    }
}

/// Protocol driver bound to one serial port.
///
/// Mirrors the controller's packet-serial command set used by this system.
/// Every call is one bounded transaction; `None`/`false` means the
/// transaction failed.
pub trait RoboClawDriver: Send {
    /// Backend identifier (e.g. "simulation", "packet_serial").
    fn name(&self) -> &'static str;

    /// Read the 32-bit error flags.
    fn read_error(&mut self, address: u8) -> Option<u32>;

    /// Read both encoder counters (raw wire values).
    fn read_encoders(&mut self, address: u8) -> Option<(u32, u32)>;

    /// Read both instantaneous speeds (raw wire values).
    fn read_speeds(&mut self, address: u8) -> Option<(u32, u32)>;

    /// Accel/velocity/decel-limited move to an absolute position.
    #[allow(clippy::too_many_arguments)]
    fn speed_accel_deccel_position(
        &mut self,
        address: u8,
        motor: Motor,
        accel: u32,
        speed: u32,
        deccel: u32,
        position: u32,
        immediate: bool,
    ) -> bool;

    /// Accel-limited velocity move.
    fn speed_accel(&mut self, address: u8, motor: Motor, accel: u32, speed: u32) -> bool;
}

/// One driver slot per RS422 port.
pub struct SerialMotorBus {
    drivers: [Option<Box<dyn RoboClawDriver>>; PORT_COUNT],
}

impl SerialMotorBus {
    /// Create a bus with every port unbound.
    pub fn new() -> Self {
        Self {
            drivers: std::array::from_fn(|_| None),
        }
    }

    /// Bind a driver to a 0-based port index, replacing any previous one.
    pub fn bind(&mut self, port_index: usize, driver: Box<dyn RoboClawDriver>) -> Result<(), BusError> {
        let slot = self
            .drivers
            .get_mut(port_index)
            .ok_or(BusError::PortOutOfRange(port_index))?;
        debug!("SER: port {} bound to {}", port_index + 1, driver.name());
        *slot = Some(driver);
        Ok(())
    }

    /// Whether a driver is bound at the port index.
    pub fn is_bound(&self, port_index: usize) -> bool {
        matches!(self.drivers.get(port_index), Some(Some(_)))
    }

    /// Number of bound ports.
    pub fn bound_count(&self) -> usize {
        self.drivers.iter().filter(|d| d.is_some()).count()
    }

    fn driver(&mut self, port_index: usize) -> Option<&mut (dyn RoboClawDriver + 'static)> {
        self.drivers.get_mut(port_index)?.as_deref_mut()
    }

    /// Read error flags, encoders and speeds.
    ///
    /// Returns `None` when the port is unbound or no field could be read.
    pub fn read_status(&mut self, port_index: usize, address: u8) -> Option<RoboClawStatus> {
        let rc = self.driver(port_index)?;
        let mut status = RoboClawStatus::default();

        if let Some(error) = rc.read_error(address) {
            status.error = error;
            status.error_valid = true;
        }
        if let Some((e1, e2)) = rc.read_encoders(address) {
            status.enc1 = to_signed32(e1);
            status.enc2 = to_signed32(e2);
            status.enc_valid = true;
        }
        if let Some((s1, s2)) = rc.read_speeds(address) {
            status.speed1 = to_signed32(s1);
            status.speed2 = to_signed32(s2);
            status.speed_valid = true;
        }

        status.any_valid().then_some(status)
    }

    /// Immediate accel/velocity/decel-limited position move.
    ///
    /// Fails when the port is unbound or `motor` is not 1 or 2.
    pub fn command_position(
        &mut self,
        port_index: usize,
        address: u8,
        motor: u8,
        position: i32,
        velocity: u32,
        accel: u32,
    ) -> bool {
        let Ok(motor) = Motor::try_from(motor) else {
            return false;
        };
        let Some(rc) = self.driver(port_index) else {
            return false;
        };
        rc.speed_accel_deccel_position(
            address,
            motor,
            accel,
            velocity,
            accel,
            to_unsigned32(position),
            true,
        )
    }

    /// Accel-limited velocity move.
    ///
    /// Fails when the port is unbound or `motor` is not 1 or 2.
    pub fn command_velocity(
        &mut self,
        port_index: usize,
        address: u8,
        motor: u8,
        velocity: u32,
        accel: u32,
    ) -> bool {
        let Ok(motor) = Motor::try_from(motor) else {
            return false;
        };
        let Some(rc) = self.driver(port_index) else {
            return false;
        };
        rc.speed_accel(address, motor, accel, velocity)
    }
}

impl Default for SerialMotorBus {
    fn default() -> Self {
        Self::new()
    }
}
