//! Endpoint Resolver / Dispatcher.
//!
//! Turns one [`SequenceEvent`] into one transport command:
//!
//! 1. Resolve the endpoint id; disabled or unknown endpoints drop the event.
//! 2. Clamp velocity, acceleration and position into the endpoint's range.
//! 3. Serial kinds go to the [`SerialMotorBus`]; CAN kinds are converted to
//!    device units, packed by the servo codec and sent on the [`CanTransport`].
//!
//! Nothing here retries. A failed command is reported in the
//! [`DispatchOutcome`] and otherwise forgotten.

use acs_common::consts::MAX_STANDARD_CAN_ID;
use acs_common::endpoint::{AppConfig, EndpointConfig, EndpointKind, Transport};
use acs_common::mks;
use acs_common::sequence::{Mode, SequenceEvent};
use acs_common::units;
use acs_hal::can::CanTransport;
use acs_hal::serial::SerialMotorBus;
use tracing::debug;

/// Why an event did not reach a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Endpoint id outside the table.
    UnknownEndpoint,
    /// Endpoint disabled.
    Disabled,
    /// Port, motor or address outside the transport's range.
    Unroutable,
    /// Kind has no command path.
    Unsupported(EndpointKind),
}

/// Result of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Serial command issued; `ok` is the wire result.
    Serial {
        /// 0-based port index.
        port_index: usize,
        /// Command accepted by the controller.
        ok: bool,
    },
    /// CAN frame sent; `ok` is the controller result.
    Can {
        /// Servo CAN id.
        can_id: u16,
        /// Frame queued.
        ok: bool,
    },
    /// Event dropped before any I/O.
    Dropped(DropReason),
}

impl DispatchOutcome {
    /// Command reached the wire and was accepted.
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Serial { ok: true, .. } | Self::Can { ok: true, .. })
    }
}

/// Clamp an unsigned command into `[min, max]`.
///
/// With `max == 0` only the floor applies. When `max < min` the ceiling is
/// moved up to `min`, so the result never drops below `min`.
pub fn clamp_u32_range(value: u32, min: u32, max: u32) -> u32 {
    if max > 0 {
        value.clamp(min, max.max(min))
    } else {
        value.max(min)
    }
}

/// Clamp a signed position into `[min, max]`; only applies when `max > min`.
pub fn clamp_i32_range(value: i32, min: i32, max: i32) -> i32 {
    if max > min {
        value.clamp(min, max)
    } else {
        value
    }
}

/// Route one event to its transport.
pub fn dispatch(
    event: &SequenceEvent,
    config: &AppConfig,
    serial: &mut SerialMotorBus,
    can: &mut CanTransport,
) -> DispatchOutcome {
    let outcome = route(event, config, serial, can);
    if !outcome.is_delivered() {
        debug!(
            "DISPATCH: ep {} t={} {:?}",
            event.endpoint_id, event.time_ms, outcome
        );
    }
    outcome
}

fn route(
    event: &SequenceEvent,
    config: &AppConfig,
    serial: &mut SerialMotorBus,
    can: &mut CanTransport,
) -> DispatchOutcome {
    let Some(ep) = config.endpoint(event.endpoint_id) else {
        return DispatchOutcome::Dropped(DropReason::UnknownEndpoint);
    };
    if !ep.enabled {
        return DispatchOutcome::Dropped(DropReason::Disabled);
    }

    match ep.transport() {
        Transport::Serial => match ep.kind {
            EndpointKind::RoboClaw => dispatch_roboclaw(event, ep, serial),
            kind => DispatchOutcome::Dropped(DropReason::Unsupported(kind)),
        },
        Transport::Can => match ep.kind {
            EndpointKind::MksServo => dispatch_mks(event, ep, can),
            kind => DispatchOutcome::Dropped(DropReason::Unsupported(kind)),
        },
    }
}

fn dispatch_roboclaw(
    event: &SequenceEvent,
    ep: &EndpointConfig,
    serial: &mut SerialMotorBus,
) -> DispatchOutcome {
    let Some(port_index) = ep.port_index() else {
        return DispatchOutcome::Dropped(DropReason::Unroutable);
    };
    if !(1..=2).contains(&ep.motor) {
        return DispatchOutcome::Dropped(DropReason::Unroutable);
    }
    let Some(address) = ep.serial_address() else {
        return DispatchOutcome::Dropped(DropReason::Unroutable);
    };

    let velocity = clamp_u32_range(event.velocity, ep.velocity_min, ep.velocity_max);
    let accel = clamp_u32_range(event.accel, ep.accel_min, ep.accel_max);
    let ok = match event.mode {
        Mode::Velocity => serial.command_velocity(port_index, address, ep.motor, velocity, accel),
        Mode::Position => {
            let position = clamp_i32_range(event.position, ep.position_min, ep.position_max);
            serial.command_position(port_index, address, ep.motor, position, velocity, accel)
        }
    };
    DispatchOutcome::Serial { port_index, ok }
}

fn dispatch_mks(event: &SequenceEvent, ep: &EndpointConfig, can: &mut CanTransport) -> DispatchOutcome {
    if ep.address > MAX_STANDARD_CAN_ID {
        return DispatchOutcome::Dropped(DropReason::Unroutable);
    }
    let can_id = ep.address as u16;

    let velocity = clamp_u32_range(event.velocity, ep.velocity_min, ep.velocity_max);
    let speed = units::deg_per_sec_to_device_velocity(velocity as f32, ep)
        .min(u32::from(mks::MAX_SPEED_RPM)) as u16;
    let accel = clamp_u32_range(event.accel, ep.accel_min, ep.accel_max);
    let accel = units::deg_per_sec2_to_device_accel(accel as f32, ep)
        .min(u32::from(mks::MAX_ACCEL)) as u8;

    let ok = match event.mode {
        Mode::Velocity => {
            let reverse = event.position < 0;
            match mks::pack_velocity(u32::from(can_id), speed, accel, reverse) {
                Ok(frame) => can.send(u32::from(can_id), &frame),
                Err(_) => return DispatchOutcome::Dropped(DropReason::Unroutable),
            }
        }
        Mode::Position => {
            let position = clamp_i32_range(event.position, ep.position_min, ep.position_max);
            let pulses = units::degrees_to_pulses(position as f32, ep);
            match mks::pack_position(u32::from(can_id), speed, accel, pulses) {
                Ok(frame) => can.send(u32::from(can_id), &frame),
                Err(_) => return DispatchOutcome::Dropped(DropReason::Unroutable),
            }
        }
    };
    DispatchOutcome::Can { can_id, ok }
}
