//! # ACS Common Library
//!
//! Shared types for the Animation Control Station workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Table sizes, protocol limits, default paths
//! - [`config`] - TOML config loading and station runtime settings
//! - [`endpoint`] - Endpoint records and the `AppConfig` table
//! - [`endpoint_csv`] - `endpoints.csv` text config
//! - [`persist`] - `AppConfig` blob store with header check
//! - [`units`] - Engineering ↔ device unit conversion
//! - [`mks`] - MKS servo CAN codec
//! - [`sequence`] - Sequence event record
//! - [`text`] - CSV line helpers

#![deny(missing_docs)]

pub mod config;
pub mod consts;
pub mod endpoint;
pub mod endpoint_csv;
pub mod mks;
pub mod persist;
pub mod prelude;
pub mod sequence;
pub mod text;
pub mod units;
