//! Simulated CAN controller.
//!
//! Simulated servos answer read-position requests and follow position
//! frames. Frames delivered to the controller go to the receive log from
//! "interrupt context" or wait in a mailbox queue, depending on the
//! receive path chosen at `begin`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use acs_common::mks;
use tracing::debug;

use super::errors::ErrorCounters;
use super::{CanController, CanFrame, RxPath};
use crate::error::BusError;

/// Receive mailbox depth.
const MAILBOX_DEPTH: usize = 256;

#[derive(Debug, Default)]
struct SimCanState {
    bitrate: u32,
    isr: Option<super::RxProducer>,
    mailbox: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    servos: HashMap<u16, i32>,
    counters: ErrorCounters,
    fail_writes: bool,
    clock: u16,
}

impl SimCanState {
    fn deliver(&mut self, mut frame: CanFrame) {
        frame.timestamp = self.clock;
        self.clock = self.clock.wrapping_add(1);
        match &self.isr {
            Some(producer) => {
                producer.push(frame);
            }
            None => {
                if self.mailbox.len() >= MAILBOX_DEPTH {
                    self.mailbox.pop_front();
                    frame.overrun = true;
                }
                self.mailbox.push_back(frame);
            }
        }
    }

    fn servo_reacts(&mut self, frame: &CanFrame) {
        let Ok(id) = u16::try_from(frame.id) else {
            return;
        };
        let Some(&position) = self.servos.get(&id) else {
            return;
        };
        let payload = frame.payload();
        match payload.first() {
            Some(&mks::CMD_READ_POSITION) => {
                let reply = CanFrame::new(frame.id, &mks::pack_position_response(position));
                self.deliver(reply);
            }
            Some(&mks::CMD_POSITION) if payload.len() == 8 => {
                if mks::checksum(frame.id, &payload[..7]) != payload[7] {
                    debug!("CAN SIM: 0x{id:03X} bad checksum");
                    return;
                }
                let raw = u32::from(payload[4]) << 16
                    | u32::from(payload[5]) << 8
                    | u32::from(payload[6]);
                self.servos.insert(id, mks::decode_int24(raw));
            }
            _ => {}
        }
    }
}

fn lock(state: &Mutex<SimCanState>) -> MutexGuard<'_, SimCanState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process CAN controller.
#[derive(Debug, Default)]
pub struct SimCanController {
    state: Arc<Mutex<SimCanState>>,
}

impl SimCanController {
    /// Create a controller with no servos on the bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this controller's state.
    pub fn probe(&self) -> SimCanProbe {
        SimCanProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl CanController for SimCanController {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn begin(&mut self, bitrate: u32, rx: RxPath) -> Result<(), BusError> {
        if bitrate == 0 {
            return Err(BusError::InitFailed("bitrate must be > 0".to_string()));
        }
        let mut st = lock(&self.state);
        st.bitrate = bitrate;
        st.isr = match rx {
            RxPath::Poll => None,
            RxPath::Interrupt(producer) => Some(producer),
        };
        Ok(())
    }

    fn write(&mut self, frame: &CanFrame) -> bool {
        let mut st = lock(&self.state);
        if st.fail_writes {
            return false;
        }
        st.sent.push(*frame);
        st.servo_reacts(frame);
        true
    }

    fn read(&mut self) -> Option<CanFrame> {
        lock(&self.state).mailbox.pop_front()
    }

    fn error_counters(&self) -> ErrorCounters {
        lock(&self.state).counters
    }
}

/// Shared view into a [`SimCanController`].
#[derive(Debug, Clone)]
pub struct SimCanProbe {
    state: Arc<Mutex<SimCanState>>,
}

impl SimCanProbe {
    /// Put a servo on the bus at `position`.
    pub fn add_servo(&self, can_id: u16, position: i32) {
        lock(&self.state).servos.insert(can_id, position);
    }

    /// Current position of a simulated servo.
    pub fn servo_position(&self, can_id: u16) -> Option<i32> {
        lock(&self.state).servos.get(&can_id).copied()
    }

    /// Deliver a frame as if received from the bus.
    pub fn inject(&self, frame: CanFrame) {
        lock(&self.state).deliver(frame);
    }

    /// Frames written so far, oldest first.
    pub fn sent(&self) -> Vec<CanFrame> {
        lock(&self.state).sent.clone()
    }

    /// Forget written frames.
    pub fn clear_sent(&self) {
        lock(&self.state).sent.clear();
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Program the error registers.
    pub fn set_error_registers(&self, esr1: u32, ecr: u16) {
        lock(&self.state).counters = ErrorCounters { esr1, ecr };
    }

    /// Bitrate passed to `begin`.
    pub fn bitrate(&self) -> u32 {
        lock(&self.state).bitrate
    }
}
