//! Prelude module for common re-exports.
//!
//! ```rust
//! use acs_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, StationConfig};
pub use crate::persist::{ConfigStore, PersistError};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_ENDPOINTS, MAX_EVENTS, PORT_COUNT};

// ─── Endpoint Model ─────────────────────────────────────────────────
pub use crate::endpoint::{AppConfig, ConfigHeader, EndpointConfig, EndpointKind, Transport};

// ─── Sequence ───────────────────────────────────────────────────────
pub use crate::sequence::{Mode, SequenceEvent};
