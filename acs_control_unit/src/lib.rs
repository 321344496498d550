//! # ACS Control Unit Library
//!
//! Playback brain of the Animation Control Station: resolves sequence
//! events to endpoints, dispatches them onto the buses and paces the whole
//! station from one cooperative cycle.
//!
//! # Module Structure
//!
//! - [`dispatch`] - Endpoint resolver, range clamping, per-transport routing
//! - [`sequence`] - Sequence player and the `[sequence]` CSV file
//! - [`show`] - Play/pause show clock
//! - [`command`] - Typed operator command surface
//! - [`station`] - Owned buses, tables and clocks; command executor
//! - [`cycle`] - Fixed-period main loop with timing statistics
//!
//! # Cycle
//!
//! ```text
//!   CycleRunner ──tick(now)──► Station
//!                                ├─ CanTransport   events / rx / error log
//!                                ├─ StatusPoller   one endpoint per period
//!                                └─ SequencePlayer ──► dispatch ──► SerialMotorBus
//!                                        ▲                     └──► CanTransport
//!                                    ShowClock
//! ```

#![deny(missing_docs)]

pub mod command;
pub mod cycle;
pub mod dispatch;
pub mod sequence;
pub mod show;
pub mod station;

pub use crate::command::{Command, CommandError, CommandExecutor, Response};
pub use crate::cycle::{CycleRunner, CycleStats};
pub use crate::dispatch::{DispatchOutcome, dispatch};
pub use crate::sequence::{PlayerState, SequenceError, SequencePlayer};
pub use crate::show::ShowClock;
pub use crate::station::{Station, StationError};

static_assertions::assert_impl_all!(SequencePlayer: Send, Clone);
static_assertions::assert_impl_all!(Station: Send);
