//! Simulated motor controller.
//!
//! Position moves complete instantly; velocity moves only update the
//! reported speed. A [`SimRoboClawProbe`] shares the controller state so a
//! test or the station front end can inspect commands and inject faults.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Motor, RoboClawDriver};

/// One command received by the simulated controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCommand {
    /// Controller address.
    pub address: u8,
    /// Channel.
    pub motor: Motor,
    /// Acceleration.
    pub accel: u32,
    /// Speed.
    pub speed: u32,
    /// Deceleration (position moves only).
    pub deccel: Option<u32>,
    /// Target position wire value (position moves only).
    pub position: Option<u32>,
    /// Immediate flag (position moves only).
    pub immediate: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Channel {
    encoder: u32,
    speed: u32,
}

#[derive(Debug, Default)]
struct SimState {
    channels: HashMap<(u8, Motor), Channel>,
    commands: Vec<SimCommand>,
    error_flags: u32,
    fail_reads: bool,
    fail_writes: bool,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated dual-channel controller bank (any address answers).
#[derive(Debug, Default)]
pub struct SimRoboClaw {
    state: Arc<Mutex<SimState>>,
}

impl SimRoboClaw {
    /// Create a controller with zeroed encoders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this controller's state.
    pub fn probe(&self) -> SimRoboClawProbe {
        SimRoboClawProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl RoboClawDriver for SimRoboClaw {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn read_error(&mut self, _address: u8) -> Option<u32> {
        let st = lock(&self.state);
        (!st.fail_reads).then_some(st.error_flags)
    }

    fn read_encoders(&mut self, address: u8) -> Option<(u32, u32)> {
        let st = lock(&self.state);
        if st.fail_reads {
            return None;
        }
        let get = |m| st.channels.get(&(address, m)).copied().unwrap_or_default();
        Some((get(Motor::M1).encoder, get(Motor::M2).encoder))
    }

    fn read_speeds(&mut self, address: u8) -> Option<(u32, u32)> {
        let st = lock(&self.state);
        if st.fail_reads {
            return None;
        }
        let get = |m| st.channels.get(&(address, m)).copied().unwrap_or_default();
        Some((get(Motor::M1).speed, get(Motor::M2).speed))
    }

    fn speed_accel_deccel_position(
        &mut self,
        address: u8,
        motor: Motor,
        accel: u32,
        speed: u32,
        deccel: u32,
        position: u32,
        immediate: bool,
    ) -> bool {
        let mut st = lock(&self.state);
        if st.fail_writes {
            return false;
        }
        st.commands.push(SimCommand {
            address,
            motor,
            accel,
            speed,
            deccel: Some(deccel),
            position: Some(position),
            immediate,
        });
        let ch = st.channels.entry((address, motor)).or_default();
        ch.encoder = position;
        ch.speed = 0;
        true
    }

    fn speed_accel(&mut self, address: u8, motor: Motor, accel: u32, speed: u32) -> bool {
        let mut st = lock(&self.state);
        if st.fail_writes {
            return false;
        }
        st.commands.push(SimCommand {
            address,
            motor,
            accel,
            speed,
            deccel: None,
            position: None,
            immediate: false,
        });
        st.channels.entry((address, motor)).or_default().speed = speed;
        true
    }
}

/// Shared view into a [`SimRoboClaw`].
#[derive(Debug, Clone)]
pub struct SimRoboClawProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimRoboClawProbe {
    /// Every command received so far, oldest first.
    pub fn commands(&self) -> Vec<SimCommand> {
        lock(&self.state).commands.clone()
    }

    /// Most recent command.
    pub fn last_command(&self) -> Option<SimCommand> {
        lock(&self.state).commands.last().copied()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        lock(&self.state).commands.clear();
    }

    /// Make every read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Set the reported error flags.
    pub fn set_error_flags(&self, flags: u32) {
        lock(&self.state).error_flags = flags;
    }

    /// Force an encoder value.
    pub fn set_encoder(&self, address: u8, motor: Motor, value: u32) {
        lock(&self.state)
            .channels
            .entry((address, motor))
            .or_default()
            .encoder = value;
    }
}
