//! System-wide constants for the ACS workspace.
//!
//! Single source of truth for table sizes, protocol limits and default paths.
//! Imported by all crates; no duplication permitted.

use static_assertions::const_assert;

/// Number of endpoint slots in the configuration table (ids are 1-based).
pub const MAX_ENDPOINTS: usize = 16;

/// Number of physical RS422 serial ports on the target board.
///
/// Build-time constant: board revisions have shipped with 7 and 8 ports.
pub const PORT_COUNT: usize = 8;

/// Capacity of the sequence event table.
pub const MAX_EVENTS: usize = 512;

/// Latest event time accepted by the sequence loader [ms].
pub const MAX_EVENT_TIME_MS: u32 = 300_000;

/// Capacity of the CAN receive log ring (one slot is always kept empty).
pub const RX_LOG_SIZE: usize = 16;

/// Maximum number of CAN servos tracked by the status cache.
pub const MAX_TRACKED_SERVOS: usize = 16;

/// Largest standard (11-bit) CAN identifier.
pub const MAX_STANDARD_CAN_ID: u32 = 0x7FF;

/// Default main cycle time in microseconds (1 kHz).
pub const CYCLE_TIME_US: u64 = 1000;

/// Default status poll period [ms] (one endpoint per period).
pub const STATUS_POLL_PERIOD_MS: u32 = 100;

/// CAN servo status older than this is treated as absent [ms].
pub const CAN_STATUS_STALE_MS: u32 = 1000;

/// Minimum spacing of repeated CAN error log lines while errors persist [ms].
pub const CAN_ERROR_LOG_PERIOD_MS: u32 = 500;

/// Default station configuration file.
pub const DEFAULT_STATION_CONFIG: &str = "config/station.toml";

/// Default endpoint CSV path.
pub const DEFAULT_ENDPOINTS_CSV: &str = "endpoints.csv";

/// Default sequence CSV path.
pub const DEFAULT_SEQUENCE_CSV: &str = "animation.csv";

/// Default persisted configuration blob path (EEPROM image).
pub const DEFAULT_CONFIG_BLOB: &str = "config.bin";

const_assert!(MAX_ENDPOINTS > 0 && MAX_ENDPOINTS <= u8::MAX as usize);
const_assert!(PORT_COUNT > 0 && PORT_COUNT <= u8::MAX as usize);
const_assert!(RX_LOG_SIZE >= 2 && RX_LOG_SIZE <= u8::MAX as usize);
const_assert!(MAX_TRACKED_SERVOS >= MAX_ENDPOINTS);
