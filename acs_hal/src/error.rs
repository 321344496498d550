//! Transport error types.

use thiserror::Error;

/// Errors raised while wiring or driving a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Serial port index outside the board's port table.
    #[error("serial port index {0} out of range")]
    PortOutOfRange(usize),

    /// Backend could not be opened or initialized.
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Wire write or read failed.
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Backend name not registered.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),
}
