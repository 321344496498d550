//! Local serial device link.
//!
//! Opens an RS422 adapter through `serialport` and runs packet-serial on it.

use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

use super::protocol::PacketSerial;
use crate::error::BusError;

/// Open a serial device and return a packet-serial driver on it.
///
/// `timeout_ms` bounds every read and write.
///
/// # Errors
///
/// `BusError::InitFailed` when the device cannot be opened at `baud`.
pub fn open(
    path: &str,
    baud: u32,
    timeout_ms: u32,
) -> Result<PacketSerial<Box<dyn SerialPort>>, BusError> {
    let timeout = Duration::from_millis(u64::from(timeout_ms.max(1)));
    let port = serialport::new(path, baud)
        .timeout(timeout)
        .open()
        .map_err(|e| BusError::InitFailed(format!("open {path}: {e}")))?;

    info!("SER: device {path} opened at {baud} baud");
    Ok(PacketSerial::new(port))
}
