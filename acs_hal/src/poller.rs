//! Status Poller.
//!
//! Refreshes one endpoint per period, round-robin over every enabled
//! endpoint that has a status path. Serial endpoints are read synchronously;
//! CAN endpoints get a fire-and-forget request and pick up whatever reply
//! the transport cached since the last visit.

use acs_common::consts::MAX_ENDPOINTS;
use acs_common::endpoint::{AppConfig, EndpointConfig, EndpointKind};

use crate::can::CanTransport;
use crate::serial::{Motor, SerialMotorBus};

/// Last known state of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStatus {
    /// Position in device units.
    pub position: Option<i32>,
    /// Speed in device units (serial only).
    pub velocity: Option<i32>,
    /// Controller error flags (serial only).
    pub error: Option<u32>,
    /// Time of the last successful refresh [ms].
    pub updated_ms: u32,
}

/// Round-robin status refresher.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    period_ms: u32,
    last_poll_ms: Option<u32>,
    cursor: usize,
    cache: [Option<EndpointStatus>; MAX_ENDPOINTS],
}

fn pollable(ep: &EndpointConfig) -> bool {
    ep.enabled
        && match ep.kind {
            EndpointKind::RoboClaw => {
                ep.port_index().is_some()
                    && ep.serial_address().is_some()
                    && Motor::try_from(ep.motor).is_ok()
            }
            EndpointKind::MksServo => ep.can_id().is_some(),
            EndpointKind::RevFrcCan | EndpointKind::JoeServoSerial | EndpointKind::JoeServoCan => {
                false
            }
        }
}

impl StatusPoller {
    /// Create a poller refreshing one endpoint every `period_ms`.
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            last_poll_ms: None,
            cursor: 0,
            cache: [None; MAX_ENDPOINTS],
        }
    }

    /// Service the next endpoint if the period elapsed.
    ///
    /// Returns the endpoint id that was serviced.
    pub fn poll(
        &mut self,
        now_ms: u32,
        config: &AppConfig,
        serial: &mut SerialMotorBus,
        can: &mut CanTransport,
    ) -> Option<u8> {
        if self
            .last_poll_ms
            .is_some_and(|last| now_ms.wrapping_sub(last) < self.period_ms)
        {
            return None;
        }
        self.last_poll_ms = Some(now_ms);

        let slot = (0..MAX_ENDPOINTS)
            .map(|step| (self.cursor + step) % MAX_ENDPOINTS)
            .find(|&slot| config.endpoint(slot as u8 + 1).is_some_and(pollable))?;
        self.cursor = (slot + 1) % MAX_ENDPOINTS;

        let id = slot as u8 + 1;
        let ep = *config.endpoint(id)?;
        self.refresh(slot, &ep, now_ms, serial, can);
        Some(id)
    }

    fn refresh(
        &mut self,
        slot: usize,
        ep: &EndpointConfig,
        now_ms: u32,
        serial: &mut SerialMotorBus,
        can: &mut CanTransport,
    ) {
        match ep.kind {
            EndpointKind::RoboClaw => {
                let (Some(port), Ok(motor), Some(address)) = (
                    ep.port_index(),
                    Motor::try_from(ep.motor),
                    ep.serial_address(),
                ) else {
                    return;
                };
                let Some(status) = serial.read_status(port, address) else {
                    return;
                };
                let entry = self.cache[slot].get_or_insert_with(EndpointStatus::default);
                if let Some((position, speed)) = status.channel(motor) {
                    entry.position = Some(position);
                    if status.speed_valid {
                        entry.velocity = Some(speed);
                    }
                }
                if status.error_valid {
                    entry.error = Some(status.error);
                }
                entry.updated_ms = now_ms;
            }
            EndpointKind::MksServo => {
                let Some(can_id) = ep.can_id() else {
                    return;
                };
                can.request_status(can_id);
                self.cache[slot] = can.get_status(can_id, now_ms).map(|s| EndpointStatus {
                    position: Some(s.position),
                    velocity: None,
                    error: None,
                    updated_ms: s.last_update_ms,
                });
            }
            EndpointKind::RevFrcCan | EndpointKind::JoeServoSerial | EndpointKind::JoeServoCan => {}
        }
    }

    /// Cached status for a 1-based endpoint id.
    pub fn status(&self, id: u8) -> Option<EndpointStatus> {
        let slot = usize::from(id).checked_sub(1)?;
        *self.cache.get(slot)?
    }

    /// Drop every cached status (e.g. after a config change).
    pub fn clear(&mut self) {
        self.cache = [None; MAX_ENDPOINTS];
    }
}
