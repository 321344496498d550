//! CAN transport: controller, receive log, error monitor and servo cache.

use acs_common::config::{CanRxMode, CanSettings, TimingSettings};
use acs_common::consts::RX_LOG_SIZE;
use acs_common::mks;
use tracing::{debug, info, warn};

use super::errors::{CanHealth, ErrorCounters, ErrorMonitor};
use super::rx_log::{RxConsumer, RxProducer, rx_log};
use super::servo_cache::{ServoCache, ServoStatus};
use super::{CanController, CanFrame, RxPath};
use crate::error::BusError;

/// Frames removed by [`CanTransport::dump_rx_log`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxDump {
    /// An overflow was pending (and is now cleared).
    pub overflow: bool,
    /// Drained frames, oldest first.
    pub frames: heapless::Vec<CanFrame, RX_LOG_SIZE>,
}

/// CAN bus owner.
pub struct CanTransport {
    controller: Box<dyn CanController>,
    rx_mode: CanRxMode,
    producer: RxProducer,
    consumer: RxConsumer,
    servos: ServoCache,
    monitor: ErrorMonitor,
}

impl CanTransport {
    /// Start the controller with the configured bitrate and receive path.
    ///
    /// # Errors
    ///
    /// Propagates the controller's initialization failure.
    pub fn new(
        mut controller: Box<dyn CanController>,
        settings: &CanSettings,
        timing: &TimingSettings,
    ) -> Result<Self, BusError> {
        let (producer, consumer) = rx_log();
        let path = match settings.rx_mode {
            CanRxMode::Poll => RxPath::Poll,
            CanRxMode::Interrupt => RxPath::Interrupt(producer.clone()),
        };
        controller.begin(settings.bitrate, path)?;
        info!(
            "CAN: {} started at {} bit/s, rx {:?}",
            controller.name(),
            settings.bitrate,
            settings.rx_mode
        );
        Ok(Self {
            controller,
            rx_mode: settings.rx_mode,
            producer,
            consumer,
            servos: ServoCache::new(timing.can_status_stale_ms),
            monitor: ErrorMonitor::new(timing.can_error_log_period_ms),
        })
    }

    /// Controller backend name.
    pub fn backend_name(&self) -> &'static str {
        self.controller.name()
    }

    /// Transmit a raw frame.
    pub fn send(&mut self, id: u32, payload: &[u8]) -> bool {
        let frame = CanFrame::new(id, payload);
        let ok = self.controller.write(&frame);
        if !ok {
            debug!("CAN: send to 0x{id:X} failed");
        }
        ok
    }

    /// Pump the receive path. In poll mode this drains the controller into
    /// the receive log; returns the number of frames moved.
    pub fn events(&mut self) -> usize {
        if self.rx_mode == CanRxMode::Interrupt {
            return 0;
        }
        let mut moved = 0;
        while let Some(frame) = self.controller.read() {
            self.producer.push(frame);
            moved += 1;
        }
        moved
    }

    /// Drain the receive log, caching every servo position response.
    pub fn process_rx_frames(&mut self, now_ms: u32) -> usize {
        let mut handled = 0;
        while let Some(frame) = self.consumer.pop() {
            if self.handle_frame(&frame, now_ms) {
                handled += 1;
            }
        }
        handled
    }

    fn handle_frame(&mut self, frame: &CanFrame, now_ms: u32) -> bool {
        let payload = frame.payload();
        if payload.len() < 4 || payload[0] != mks::CMD_READ_POSITION {
            return false;
        }
        let Ok(can_id) = u16::try_from(frame.id) else {
            return false;
        };
        if self.servos.register(can_id).is_none() {
            debug!("CAN: servo cache full, ignoring 0x{can_id:03X}");
            return false;
        }
        match mks::parse_position_response(payload) {
            Ok(position) => self.servos.record_position(can_id, position, now_ms),
            Err(e) => {
                debug!("CAN: bad response from 0x{can_id:03X}: {e}");
                false
            }
        }
    }

    /// Ask a servo for its position; the reply lands in the cache later.
    pub fn request_status(&mut self, can_id: u16) -> bool {
        self.send(u32::from(can_id), &mks::read_position_request())
    }

    /// Cached servo status, if refreshed within the staleness window.
    pub fn get_status(&self, can_id: u16, now_ms: u32) -> Option<ServoStatus> {
        self.servos.get(can_id, now_ms)
    }

    /// Current error registers.
    pub fn error_counters(&self) -> ErrorCounters {
        self.controller.error_counters()
    }

    /// Log the error registers when they changed or an error persists.
    ///
    /// Returns `true` when a line was emitted.
    pub fn log_error_counters(&mut self, now_ms: u32) -> bool {
        let counters = self.controller.error_counters();
        let due = self.monitor.check(counters, now_ms);
        if due {
            warn!("CAN ERR: {counters}");
        }
        due
    }

    /// Bus health snapshot.
    pub fn health(&self) -> CanHealth {
        CanHealth(self.controller.error_counters())
    }

    /// Drain up to `max` frames (0 = all, at most `RX_LOG_SIZE`) for
    /// diagnostics, reporting a pending overflow first.
    pub fn dump_rx_log(&mut self, max: usize) -> RxDump {
        let overflow = self.consumer.take_overflow();
        if overflow {
            warn!("CAN RX LOG OVERFLOW");
        }
        let mut frames = heapless::Vec::new();
        while !frames.is_full() && (max == 0 || frames.len() < max) {
            let Some(frame) = self.consumer.pop() else {
                break;
            };
            info!("{frame}");
            // Capacity checked above.
            let _ = frames.push(frame);
        }
        RxDump { overflow, frames }
    }

    /// Servos seen so far.
    pub fn tracked_servos(&self) -> usize {
        self.servos.len()
    }
}
