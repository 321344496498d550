//! Engineering ↔ device unit conversion.
//!
//! Engineering units are degrees, deg/s and deg/s². Device units depend on
//! the transport family:
//!
//! | Quantity | Serial family      | CAN-servo family        |
//! |----------|--------------------|-------------------------|
//! | position | pulses             | pulses (±0x7FFFFF)      |
//! | velocity | counts/s (≥ 0)     | RPM, 0–3000             |
//! | accel    | counts/s² (≥ 0)    | 0–255 over 0–100 deg/s² |
//!
//! Conversion only happens when `pulses_per_revolution > 0`; otherwise every
//! function is a truncating identity. All functions are total.

use crate::endpoint::{EndpointConfig, EndpointKind, Transport};
use crate::mks;

/// Pulses per revolution assumed for a kind when displaying nominal scale.
pub const fn default_pulses_per_rev(kind: EndpointKind) -> u32 {
    match kind {
        EndpointKind::MksServo => mks::DEFAULT_PULSES_PER_REV,
        EndpointKind::RoboClaw
        | EndpointKind::RevFrcCan
        | EndpointKind::JoeServoSerial
        | EndpointKind::JoeServoCan => 4096,
    }
}

/// `true` when the endpoint has an engineering-unit calibration.
#[inline]
pub const fn uses_engineering_units(ep: &EndpointConfig) -> bool {
    ep.pulses_per_revolution != 0
}

/// Quantity selector for the generic conversion entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Degrees ↔ pulses.
    Position,
    /// deg/s ↔ counts/s or RPM.
    Velocity,
    /// deg/s² ↔ counts/s² or 0–255 scale.
    Accel,
}

/// A value in device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceValue {
    /// Signed pulse count.
    Position(i32),
    /// Non-negative device velocity.
    Velocity(u32),
    /// Non-negative device acceleration.
    Accel(u32),
}

impl DeviceValue {
    /// Widened raw value.
    pub const fn raw(self) -> i64 {
        match self {
            Self::Position(v) => v as i64,
            Self::Velocity(v) | Self::Accel(v) => v as i64,
        }
    }
}

/// Convert an engineering value to device units.
pub fn to_device(quantity: Quantity, value: f32, ep: &EndpointConfig) -> DeviceValue {
    match quantity {
        Quantity::Position => DeviceValue::Position(degrees_to_pulses(value, ep)),
        Quantity::Velocity => DeviceValue::Velocity(deg_per_sec_to_device_velocity(value, ep)),
        Quantity::Accel => DeviceValue::Accel(deg_per_sec2_to_device_accel(value, ep)),
    }
}

/// Convert a device value back to engineering units.
pub fn to_engineering(value: DeviceValue, ep: &EndpointConfig) -> f32 {
    match value {
        DeviceValue::Position(p) => pulses_to_degrees(p, ep),
        DeviceValue::Velocity(v) => device_velocity_to_deg_per_sec(v, ep),
        DeviceValue::Accel(a) => device_accel_to_deg_per_sec2(a, ep),
    }
}

/// Degrees → pulses.
pub fn degrees_to_pulses(degrees: f32, ep: &EndpointConfig) -> i32 {
    if !uses_engineering_units(ep) {
        return degrees as i32;
    }
    let pulses = degrees * (ep.pulses_per_revolution as f32 / 360.0);
    match ep.transport() {
        Transport::Can => (pulses as i32).clamp(-mks::MAX_POSITION, mks::MAX_POSITION),
        Transport::Serial => pulses as i32,
    }
}

/// deg/s → device velocity.
pub fn deg_per_sec_to_device_velocity(deg_per_sec: f32, ep: &EndpointConfig) -> u32 {
    if !uses_engineering_units(ep) {
        let raw = deg_per_sec as u32;
        return match ep.transport() {
            Transport::Can => raw.min(u32::from(mks::MAX_SPEED_RPM)),
            Transport::Serial => raw,
        };
    }
    match ep.transport() {
        Transport::Can => {
            let rpm = deg_per_sec * 60.0 / 360.0;
            rpm.clamp(0.0, mks::MAX_SPEED_RPM as f32) as u32
        }
        Transport::Serial => {
            let counts = deg_per_sec * (ep.pulses_per_revolution as f32 / 360.0);
            counts.max(0.0) as u32
        }
    }
}

/// deg/s² → device acceleration.
pub fn deg_per_sec2_to_device_accel(deg_per_sec2: f32, ep: &EndpointConfig) -> u32 {
    if !uses_engineering_units(ep) {
        let raw = deg_per_sec2 as u32;
        return match ep.transport() {
            Transport::Can => raw.min(u32::from(mks::MAX_ACCEL)),
            Transport::Serial => raw,
        };
    }
    match ep.transport() {
        Transport::Can => {
            let scale = deg_per_sec2 / 100.0 * mks::MAX_ACCEL as f32;
            scale.clamp(0.0, mks::MAX_ACCEL as f32) as u32
        }
        Transport::Serial => {
            let counts = deg_per_sec2 * (ep.pulses_per_revolution as f32 / 360.0);
            counts.max(0.0) as u32
        }
    }
}

/// Pulses → degrees.
pub fn pulses_to_degrees(pulses: i32, ep: &EndpointConfig) -> f32 {
    if !uses_engineering_units(ep) {
        return pulses as f32;
    }
    pulses as f32 * (360.0 / ep.pulses_per_revolution as f32)
}

/// Device velocity → deg/s.
pub fn device_velocity_to_deg_per_sec(velocity: u32, ep: &EndpointConfig) -> f32 {
    if !uses_engineering_units(ep) {
        return velocity as f32;
    }
    match ep.transport() {
        Transport::Can => velocity as f32 * 6.0,
        Transport::Serial => velocity as f32 * (360.0 / ep.pulses_per_revolution as f32),
    }
}

/// Device acceleration → deg/s².
pub fn device_accel_to_deg_per_sec2(accel: u32, ep: &EndpointConfig) -> f32 {
    if !uses_engineering_units(ep) {
        return accel as f32;
    }
    match ep.transport() {
        Transport::Can => accel as f32 * 100.0 / mks::MAX_ACCEL as f32,
        Transport::Serial => accel as f32 * (360.0 / ep.pulses_per_revolution as f32),
    }
}
