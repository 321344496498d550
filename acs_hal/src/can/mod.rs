//! CAN Transport.
//!
//! - [`CanController`]: controller backend (simulation, SocketCAN on Linux).
//! - [`rx_log`]: interrupt-fed receive ring with a masked-index discipline.
//! - [`errors`]: error registers, log dedup and the health line.
//! - [`servo_cache`]: per-servo status with staleness expiry.
//! - [`transport`]: the [`CanTransport`] that ties these together.

pub mod critical;
pub mod errors;
pub mod rx_log;
pub mod servo_cache;
pub mod sim;
#[cfg(target_os = "linux")]
pub mod socket;
pub mod transport;

pub use errors::{CanHealth, ErrorCounters, FaultState};
pub use rx_log::{RxConsumer, RxProducer, rx_log};
pub use servo_cache::ServoStatus;
pub use transport::{CanTransport, RxDump};

use std::fmt;

use acs_common::consts::MAX_STANDARD_CAN_ID;

use crate::error::BusError;

/// Raw CAN frame as captured by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanFrame {
    /// Arbitration id (11 or 29 bit).
    pub id: u32,
    /// Payload length (0-8).
    pub len: u8,
    /// Payload bytes; only `len` are meaningful.
    pub data: [u8; 8],
    /// 29-bit identifier.
    pub extended: bool,
    /// Controller reported a mailbox overrun for this frame.
    pub overrun: bool,
    /// Controller timestamp.
    pub timestamp: u16,
    /// Receiving mailbox.
    pub mailbox: u8,
}

impl CanFrame {
    /// Build a frame; payloads beyond 8 bytes are truncated and ids above
    /// the standard range mark the frame extended.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(8);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            len: len as u8,
            data,
            extended: id > MAX_STANDARD_CAN_ID,
            ..Self::default()
        }
    }

    /// Meaningful payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len.min(8))]
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MB {}  OVERRUN: {}  LEN: {} EXT: {} TS: {} ID: {:X} Buffer:",
            self.mailbox,
            u8::from(self.overrun),
            self.len,
            u8::from(self.extended),
            self.timestamp,
            self.id
        )?;
        for b in self.payload() {
            write!(f, " {b:X}")?;
        }
        Ok(())
    }
}

/// Where received frames go.
#[derive(Debug, Clone)]
pub enum RxPath {
    /// Frames stay in the controller until [`CanController::read`].
    Poll,
    /// The controller's receive handler pushes into the log directly.
    Interrupt(RxProducer),
}

/// CAN controller backend.
pub trait CanController: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Configure the bitrate and the receive path.
    fn begin(&mut self, bitrate: u32, rx: RxPath) -> Result<(), BusError>;

    /// Queue a frame for transmission.
    fn write(&mut self, frame: &CanFrame) -> bool;

    /// Take one pending frame (polled receive path).
    fn read(&mut self) -> Option<CanFrame>;

    /// Read the error registers.
    fn error_counters(&self) -> ErrorCounters;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_clamps_payload_and_flags_extended() {
        let f = CanFrame::new(0x1234, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(f.len, 8);
        assert_eq!(f.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(f.extended);

        let f = CanFrame::new(0x7FF, &[0x30]);
        assert!(!f.extended);
        assert_eq!(f.payload(), &[0x30]);
    }

    #[test]
    fn frame_display() {
        let f = CanFrame::new(0x05, &[0x30, 0x00, 0x03, 0xE8]);
        assert_eq!(
            f.to_string(),
            "MB 0  OVERRUN: 0  LEN: 4 EXT: 0 TS: 0 ID: 5 Buffer: 30 0 3 E8"
        );
    }
}
