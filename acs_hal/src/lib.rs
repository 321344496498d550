//! # ACS HAL Library
//!
//! Transport layer of the Animation Control Station.
//!
//! # Module Structure
//!
//! - [`serial`] - Serial Motor Bus, packet-serial driver, TCP bridge and device links, simulation
//! - [`can`] - CAN Transport, receive log, error monitor, servo status cache, SocketCAN
//! - [`poller`] - Round-robin endpoint status refresh
//! - [`backend`] - Backend registry and bus construction from `station.toml`
//! - [`error`] - Transport error type
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          acs_hal                                 │
//! │  ┌──────────────────┐                 ┌───────────────────────┐  │
//! │  │  SerialMotorBus  │                 │      CanTransport     │  │
//! │  │  [port] ──► dyn  │                 │  dyn CanController    │  │
//! │  │  RoboClawDriver  │                 │     │ RX IRQ / poll   │  │
//! │  └────────▲─────────┘                 │     ▼                 │  │
//! │           │                           │  RxLog ──► ServoCache │  │
//! │           │      ┌──────────────┐     │  ErrorMonitor         │  │
//! │           └──────┤ StatusPoller ├────►│                       │  │
//! │                  └──────────────┘     └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod backend;
pub mod can;
pub mod error;
pub mod poller;
pub mod serial;

pub use crate::backend::{BackendRegistry, build_can_transport, build_serial_bus};
pub use crate::can::{CanFrame, CanTransport};
pub use crate::error::BusError;
pub use crate::poller::{EndpointStatus, StatusPoller};
pub use crate::serial::{RoboClawStatus, SerialMotorBus};

static_assertions::assert_impl_all!(can::RxProducer: Send, Sync, Clone);
static_assertions::assert_impl_all!(can::RxConsumer: Send);
static_assertions::assert_impl_all!(CanTransport: Send);
static_assertions::assert_impl_all!(SerialMotorBus: Send);
#[cfg(target_os = "linux")]
static_assertions::assert_impl_all!(can::socket::SocketCanController: Send);
