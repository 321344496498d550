//! SocketCAN controller (Linux).
//!
//! Drives a kernel CAN network interface. The bitrate belongs to the
//! interface and is set with `ip link`; `begin` only records it.
//!
//! Polled receive reads the socket non-blocking. Interrupt receive runs a
//! reader thread on a duplicated socket that pushes into the receive log;
//! that socket relies on the read timeout, never `O_NONBLOCK`, because the
//! flag is shared with the transmit side through `dup()`.
//!
//! Error frames are folded into ESR1/ECR-shaped counters so the health
//! report reads the same as on the simulated controller.

use std::io;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socketcan::{
    BlockingCan, CanFrame as SocketFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket,
    SocketOptions, StandardId,
};
use tracing::{debug, info, trace, warn};

use super::errors::{ErrorCounters, Esr1};
use super::{CanController, CanFrame, RxPath, RxProducer};
use crate::error::BusError;

/// Reader thread wake-up period while the bus is idle.
const RX_THREAD_TIMEOUT: Duration = Duration::from_millis(5);

/// Transmit blocking bound.
const TX_TIMEOUT: Duration = Duration::from_millis(2);

// ─── Error Frame Decoding ───────────────────────────────────────────

/// Error class bits of an error frame identifier.
mod class {
    pub const CRTL: u32 = 0x0000_0004;
    pub const PROT: u32 = 0x0000_0008;
    pub const ACK: u32 = 0x0000_0020;
    pub const BUSOFF: u32 = 0x0000_0040;
    pub const RESTARTED: u32 = 0x0000_0100;
    pub const CNT: u32 = 0x0000_0200;
}

/// Controller status byte (`data[1]`).
mod crtl {
    pub const RX_WARNING: u8 = 0x04;
    pub const TX_WARNING: u8 = 0x08;
    pub const RX_PASSIVE: u8 = 0x10;
    pub const TX_PASSIVE: u8 = 0x20;
    pub const ACTIVE: u8 = 0x40;
}

/// Protocol violation type byte (`data[2]`).
mod prot {
    pub const BIT: u8 = 0x01;
    pub const FORM: u8 = 0x02;
    pub const STUFF: u8 = 0x04;
    pub const BIT0: u8 = 0x08;
    pub const BIT1: u8 = 0x10;
}

/// Protocol violation location byte for the CRC sequence (`data[3]`).
const PROT_LOC_CRC_SEQ: u8 = 0x08;

fn set_fault_code(counters: &mut ErrorCounters, code: u32) {
    counters.esr1 = (counters.esr1 & !Esr1::FLT_CONF.bits()) | (code << 4);
}

/// Fold one kernel error frame into the register snapshot.
///
/// `class_bits` is the error frame identifier, `data` its payload.
pub fn fold_error_frame(counters: &mut ErrorCounters, class_bits: u32, data: &[u8]) {
    let byte = |i: usize| data.get(i).copied().unwrap_or(0);
    let mut flags = Esr1::from_bits_truncate(counters.esr1);

    if class_bits & class::RESTARTED != 0 {
        *counters = ErrorCounters::default();
        return;
    }
    if class_bits & class::BUSOFF != 0 {
        set_fault_code(counters, 2);
        return;
    }
    if class_bits & class::ACK != 0 {
        flags |= Esr1::ACK_ERR;
    }
    if class_bits & class::PROT != 0 {
        let kind = byte(2);
        flags.set(Esr1::BIT0_ERR, kind & (prot::BIT | prot::BIT0) != 0);
        flags.set(Esr1::BIT1_ERR, kind & prot::BIT1 != 0);
        flags.set(Esr1::FRM_ERR, kind & prot::FORM != 0);
        flags.set(Esr1::STF_ERR, kind & prot::STUFF != 0);
        flags.set(Esr1::CRC_ERR, byte(3) == PROT_LOC_CRC_SEQ);
    }
    counters.esr1 = (counters.esr1 & Esr1::FLT_CONF.bits()) | flags.bits();

    if class_bits & class::CRTL != 0 {
        let status = byte(1);
        let mut flags = Esr1::from_bits_truncate(counters.esr1);
        flags.set(Esr1::RX_WRN, status & crtl::RX_WARNING != 0);
        flags.set(Esr1::TX_WRN, status & crtl::TX_WARNING != 0);
        counters.esr1 = (counters.esr1 & Esr1::FLT_CONF.bits()) | flags.bits();
        if status & (crtl::RX_PASSIVE | crtl::TX_PASSIVE) != 0 {
            set_fault_code(counters, 1);
        } else if status & crtl::ACTIVE != 0 {
            set_fault_code(counters, 0);
        }
    }
    if class_bits & class::CNT != 0 {
        counters.ecr = u16::from(byte(7)) << 8 | u16::from(byte(6));
    }
}

// ─── Frame Conversion ───────────────────────────────────────────────

fn to_socket_frame(frame: &CanFrame) -> Option<SocketFrame> {
    if frame.extended {
        ExtendedId::new(frame.id).and_then(|id| SocketFrame::new(id, frame.payload()))
    } else {
        u16::try_from(frame.id)
            .ok()
            .and_then(StandardId::new)
            .and_then(|id| SocketFrame::new(id, frame.payload()))
    }
}

fn from_socket_frame(frame: &SocketFrame) -> CanFrame {
    let mut out = CanFrame::new(frame.raw_id(), frame.data());
    out.extended = frame.is_extended();
    out
}

fn lock(counters: &Mutex<ErrorCounters>) -> MutexGuard<'_, ErrorCounters> {
    counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Route one received frame: error frames update the counters, the rest
/// are handed back.
fn sort_frame(frame: &SocketFrame, counters: &Mutex<ErrorCounters>) -> Option<CanFrame> {
    if frame.is_error_frame() {
        trace!("CAN: error frame 0x{:08X}", frame.raw_id());
        fold_error_frame(&mut lock(counters), frame.raw_id(), frame.data());
        return None;
    }
    Some(from_socket_frame(frame))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

// ─── Controller ─────────────────────────────────────────────────────

struct RxThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

fn spawn_reader(
    socket: CanSocket,
    producer: RxProducer,
    counters: Arc<Mutex<ErrorCounters>>,
) -> io::Result<RxThread> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = thread::Builder::new()
        .name("acs-can-rx".to_string())
        .spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                match socket.read_frame() {
                    Ok(frame) => {
                        if let Some(frame) = sort_frame(&frame, &counters) {
                            producer.push(frame);
                        }
                    }
                    Err(e) if is_timeout(&e) => {}
                    Err(e) => {
                        warn!("CAN: receive failed: {e}");
                        thread::sleep(RX_THREAD_TIMEOUT);
                    }
                }
            }
        })?;
    Ok(RxThread { stop, handle })
}

/// Controller on a SocketCAN network interface.
pub struct SocketCanController {
    interface: String,
    socket: Option<CanSocket>,
    counters: Arc<Mutex<ErrorCounters>>,
    reader: Option<RxThread>,
}

impl SocketCanController {
    /// Controller for `interface`; the socket opens at `begin`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            socket: None,
            counters: Arc::new(Mutex::new(ErrorCounters::default())),
            reader: None,
        }
    }

    /// Interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop.store(true, Ordering::Relaxed);
            if reader.handle.join().is_err() {
                warn!("CAN: receive thread panicked");
            }
        }
    }

    fn init_failed(&self, what: &str, e: impl std::fmt::Display) -> BusError {
        BusError::InitFailed(format!("{what} {}: {e}", self.interface))
    }
}

impl CanController for SocketCanController {
    fn name(&self) -> &'static str {
        "socketcan"
    }

    fn begin(&mut self, bitrate: u32, rx: RxPath) -> Result<(), BusError> {
        self.stop_reader();
        self.socket = None;

        let socket = CanSocket::open(&self.interface).map_err(|e| self.init_failed("open", e))?;
        if let Err(e) = socket.set_error_filter_accept_all() {
            warn!("CAN: error frames disabled on {}: {e}", self.interface);
        }
        socket
            .set_write_timeout(TX_TIMEOUT)
            .map_err(|e| self.init_failed("configure", e))?;

        match rx {
            RxPath::Poll => {
                socket
                    .set_nonblocking(true)
                    .map_err(|e| self.init_failed("configure", e))?;
            }
            RxPath::Interrupt(producer) => {
                let rx_socket = socket
                    .as_fd()
                    .try_clone_to_owned()
                    .map(CanSocket::from)
                    .map_err(|e| self.init_failed("clone", e))?;
                rx_socket
                    .set_read_timeout(RX_THREAD_TIMEOUT)
                    .map_err(|e| self.init_failed("configure", e))?;
                let reader = spawn_reader(rx_socket, producer, Arc::clone(&self.counters))
                    .map_err(|e| self.init_failed("spawn reader for", e))?;
                self.reader = Some(reader);
            }
        }

        *lock(&self.counters) = ErrorCounters::default();
        self.socket = Some(socket);
        info!(
            "CAN: {} open (bitrate {bitrate} is set on the interface)",
            self.interface
        );
        Ok(())
    }

    fn write(&mut self, frame: &CanFrame) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        let Some(out) = to_socket_frame(frame) else {
            debug!("CAN: id 0x{:X} not representable", frame.id);
            return false;
        };
        match socket.transmit(&out) {
            Ok(()) => true,
            Err(e) => {
                debug!("CAN: transmit 0x{:X} failed: {e}", frame.id);
                false
            }
        }
    }

    fn read(&mut self) -> Option<CanFrame> {
        // The reader thread owns receive in interrupt mode.
        if self.reader.is_some() {
            return None;
        }
        let socket = self.socket.as_ref()?;
        loop {
            match socket.read_frame() {
                Ok(frame) => {
                    if let Some(frame) = sort_frame(&frame, &self.counters) {
                        return Some(frame);
                    }
                }
                Err(e) if is_timeout(&e) => return None,
                Err(e) => {
                    debug!("CAN: receive failed: {e}");
                    return None;
                }
            }
        }
    }

    fn error_counters(&self) -> ErrorCounters {
        *lock(&self.counters)
    }
}

impl Drop for SocketCanController {
    fn drop(&mut self) {
        self.stop_reader();
    }
}
