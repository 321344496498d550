//! CAN controller error registers, error-line dedup and health report.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Error and status register 1 flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Esr1: u32 {
        /// Fault confinement state field.
        const FLT_CONF = 0x0000_0030;
        /// Receive error warning.
        const RX_WRN = 1 << 8;
        /// Transmit error warning.
        const TX_WRN = 1 << 9;
        /// Stuffing error.
        const STF_ERR = 1 << 10;
        /// Form error.
        const FRM_ERR = 1 << 11;
        /// CRC error.
        const CRC_ERR = 1 << 12;
        /// Acknowledge error.
        const ACK_ERR = 1 << 13;
        /// Bit0 error.
        const BIT0_ERR = 1 << 14;
        /// Bit1 error.
        const BIT1_ERR = 1 << 15;
        /// Rx warning interrupt.
        const RWRN_INT = 1 << 16;
        /// Tx warning interrupt.
        const TWRN_INT = 1 << 17;
    }
}

/// Bits of ESR1 that count as a live error condition.
pub const ESR1_ERROR_MASK: u32 = 0x0003_F000;

/// Flags listed by the health report, in print order.
const HEALTH_FLAGS: [(Esr1, &str); 8] = [
    (Esr1::ACK_ERR, "ACK_ERR"),
    (Esr1::CRC_ERR, "CRC_ERR"),
    (Esr1::FRM_ERR, "FRM_ERR"),
    (Esr1::STF_ERR, "STF_ERR"),
    (Esr1::BIT0_ERR, "BIT0_ERR"),
    (Esr1::BIT1_ERR, "BIT1_ERR"),
    (Esr1::TX_WRN, "TX_WRN"),
    (Esr1::RX_WRN, "RX_WRN"),
];

/// Fault confinement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    /// Normal operation.
    ErrorActive,
    /// Error counters above 127.
    ErrorPassive,
    /// Transmitter disconnected.
    BusOff,
    /// Reserved encoding.
    Unknown,
}

impl FaultState {
    /// Decode the 2-bit fault confinement code.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::ErrorActive,
            1 => Self::ErrorPassive,
            2 => Self::BusOff,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ErrorActive => "Error Active",
            Self::ErrorPassive => "Error Passive",
            Self::BusOff => "Bus Off",
            Self::Unknown => "Unknown",
        })
    }
}

/// Snapshot of the two error registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    /// Error and status register 1.
    pub esr1: u32,
    /// Error counter register (RX count in the high byte, TX in the low).
    pub ecr: u16,
}

impl ErrorCounters {
    /// Receive error count.
    pub const fn rx_errors(&self) -> u8 {
        (self.ecr >> 8) as u8
    }

    /// Transmit error count.
    pub const fn tx_errors(&self) -> u8 {
        (self.ecr & 0xFF) as u8
    }

    /// Fault confinement state.
    pub const fn fault_state(&self) -> FaultState {
        FaultState::from_code(((self.esr1 & Esr1::FLT_CONF.bits()) >> 4) as u8)
    }

    /// ESR1 as flags (unknown bits dropped).
    pub const fn flags(&self) -> Esr1 {
        Esr1::from_bits_truncate(self.esr1)
    }

    /// Non-zero counters or any live error bit.
    pub const fn has_errors(&self) -> bool {
        self.ecr != 0 || self.esr1 & ESR1_ERROR_MASK != 0
    }
}

impl fmt::Display for ErrorCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ESR1=0x{:08X} ECR=0x{:04X} RX={} TX={} {}",
            self.esr1,
            self.ecr,
            self.rx_errors(),
            self.tx_errors(),
            self.fault_state()
        )
    }
}

/// Decides when an error-counter line is worth logging.
///
/// A line is due when either register changed since the last logged
/// snapshot, or an error condition persists and `period_ms` has elapsed
/// since the last line.
#[derive(Debug, Clone)]
pub struct ErrorMonitor {
    last: ErrorCounters,
    last_log_ms: u32,
    period_ms: u32,
}

impl ErrorMonitor {
    /// Create a monitor with an all-zero baseline.
    pub const fn new(period_ms: u32) -> Self {
        Self {
            last: ErrorCounters { esr1: 0, ecr: 0 },
            last_log_ms: 0,
            period_ms,
        }
    }

    /// Feed a snapshot; returns `true` when it should be logged.
    pub fn check(&mut self, counters: ErrorCounters, now_ms: u32) -> bool {
        let changed = counters != self.last;
        let periodic = now_ms.wrapping_sub(self.last_log_ms) >= self.period_ms;
        if changed || (counters.has_errors() && periodic) {
            self.last = counters;
            self.last_log_ms = now_ms;
            return true;
        }
        false
    }
}

/// One-line bus health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanHealth(pub ErrorCounters);

impl CanHealth {
    /// Active flag names, in report order.
    pub fn active_flags(&self) -> impl Iterator<Item = &'static str> + '_ {
        let flags = self.0.flags();
        HEALTH_FLAGS
            .iter()
            .filter(move |(flag, _)| flags.contains(*flag))
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for CanHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CAN: {}", self.0)?;
        for name in self.active_flags() {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}
