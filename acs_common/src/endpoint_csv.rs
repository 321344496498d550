//! Endpoint table text config (`endpoints.csv`).
//!
//! One row per endpoint:
//!
//! ```text
//! endpoint_id,type,address,enabled,position_min,position_max,velocity_min,
//! velocity_max,accel_min,accel_max,serial_port,motor
//! [,pulses_per_rev,home_offset,home_direction,has_limit_switch]
//! ```
//!
//! Rows with too few fields, unparseable numbers or broken addressing rules
//! are skipped with a warning; they never abort the load.

use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::consts::{MAX_ENDPOINTS, PORT_COUNT};
use crate::endpoint::{AppConfig, EndpointConfig, EndpointKind};
use crate::text::{parse_i32, parse_u32, split_fields, strip_inline_comment};

/// Fields in the legacy layout.
pub const BASE_FIELDS: usize = 12;
/// Fields in the layout with calibration columns.
pub const FULL_FIELDS: usize = 16;

const HEADER: &str = "# endpoint_id,type,address,enabled,position_min,position_max,velocity_min,velocity_max,accel_min,accel_max,serial_port,motor,pulses_per_rev,home_offset,home_direction,has_limit_switch";
const UNITS_NOTE: &str = "# Note: position_min/max in degrees, velocity in deg/s, accel in deg/s² when pulses_per_rev > 0";

/// Reason a row was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// Fewer than 12 fields.
    #[error("need {BASE_FIELDS} or {FULL_FIELDS} fields, got {0}")]
    TooFewFields(usize),
    /// A field failed to parse.
    #[error("parse error ({0})")]
    Parse(&'static str),
    /// Endpoint id outside the table.
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(u32),
    /// Addressing rule violated.
    #[error("{0}")]
    Rule(ConfigError),
}

/// Outcome of applying a CSV document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvReport {
    /// Rows written into the table.
    pub applied: usize,
    /// Rows skipped with a diagnostic.
    pub skipped: usize,
}

/// Parse one data row against the current slot contents.
///
/// Out-of-range port/motor values on disabled rows keep the slot's previous
/// value.
pub fn parse_endpoint_row(
    row: &str,
    current: &AppConfig,
) -> Result<(u8, EndpointConfig), RowError> {
    let f = split_fields::<FULL_FIELDS>(row);
    if f.len() < BASE_FIELDS {
        return Err(RowError::TooFewFields(f.len()));
    }

    let id = parse_u32(f[0]).ok_or(RowError::Parse("endpoint_id"))?;
    let kind: EndpointKind = f[1].parse().map_err(|_| RowError::Parse("type"))?;
    let address = parse_u32(f[2]).ok_or(RowError::Parse("address"))?;
    let enabled = parse_u32(f[3]).ok_or(RowError::Parse("enabled"))? != 0;
    let position_min = parse_i32(f[4]).ok_or(RowError::Parse("position_min"))?;
    let position_max = parse_i32(f[5]).ok_or(RowError::Parse("position_max"))?;
    let velocity_min = parse_u32(f[6]).ok_or(RowError::Parse("velocity_min"))?;
    let velocity_max = parse_u32(f[7]).ok_or(RowError::Parse("velocity_max"))?;
    let accel_min = parse_u32(f[8]).ok_or(RowError::Parse("accel_min"))?;
    let accel_max = parse_u32(f[9]).ok_or(RowError::Parse("accel_max"))?;
    let port = parse_u32(f[10]).ok_or(RowError::Parse("serial_port"))?;
    let motor = parse_u32(f[11]).ok_or(RowError::Parse("motor"))?;

    let pulses_per_revolution = match f.get(12) {
        Some(field) => parse_u32(field).ok_or(RowError::Parse("pulses_per_rev"))?,
        None => 0,
    };
    // Homing columns are best-effort.
    let home_offset = f.get(13).and_then(|s| parse_i32(s)).unwrap_or(0);
    let home_direction = f.get(14).and_then(|s| parse_u32(s)).unwrap_or(0);
    let has_limit_switch = f.get(15).and_then(|s| parse_u32(s)).unwrap_or(0);

    if id == 0 || id as usize > MAX_ENDPOINTS {
        return Err(RowError::InvalidEndpoint(id));
    }
    let id = id as u8;
    let previous = current.endpoint(id).copied().unwrap_or_default();

    let ep = EndpointConfig {
        kind,
        serial_port: if port as usize <= PORT_COUNT {
            port as u8
        } else {
            previous.serial_port
        },
        motor: if motor <= 2 { motor as u8 } else { previous.motor },
        address,
        enabled,
        position_min,
        position_max,
        velocity_min,
        velocity_max,
        accel_min,
        accel_max,
        pulses_per_revolution,
        home_offset,
        home_direction: u8::from(home_direction != 0),
        has_limit_switch: has_limit_switch != 0,
    };

    // Validate the raw values so out-of-range ports on enabled rows fail.
    let raw = EndpointConfig {
        serial_port: port.min(u8::MAX as u32) as u8,
        motor: motor.min(u8::MAX as u32) as u8,
        ..ep
    };
    raw.validate().map_err(RowError::Rule)?;
    Ok((id, ep))
}

/// Apply every valid row of a CSV document to `config`.
pub fn apply_endpoint_csv(text: &str, config: &mut AppConfig) -> CsvReport {
    let mut report = CsvReport::default();
    for line in text.lines() {
        let row = strip_inline_comment(line);
        if row.is_empty() {
            continue;
        }
        match parse_endpoint_row(row, config) {
            Ok((id, ep)) => {
                if let Some(slot) = config.endpoint_mut(id) {
                    *slot = ep;
                    report.applied += 1;
                }
            }
            Err(e) => {
                warn!("CFG: skip line ({e}): {}", line.trim());
                report.skipped += 1;
            }
        }
    }
    report
}

/// Load `path` into `config`.
///
/// # Errors
///
/// `FileNotFound` when the file is absent, `ParseError` on read failure.
pub fn load_endpoint_csv(path: &Path, config: &mut AppConfig) -> Result<CsvReport, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound
        } else {
            ConfigError::ParseError(e.to_string())
        }
    })?;
    let report = apply_endpoint_csv(&text, config);
    info!(
        "CFG: {} applied {} rows, skipped {}",
        path.display(),
        report.applied,
        report.skipped
    );
    Ok(report)
}

/// Render the full table in the 16-field layout.
pub fn render_endpoint_csv(config: &AppConfig) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(UNITS_NOTE);
    out.push('\n');
    for (id, ep) in config.iter() {
        let _ = writeln!(
            out,
            "{},{},0x{:08X},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            id,
            ep.kind.name(),
            ep.address,
            u8::from(ep.enabled),
            ep.position_min,
            ep.position_max,
            ep.velocity_min,
            ep.velocity_max,
            ep.accel_min,
            ep.accel_max,
            ep.serial_port,
            ep.motor,
            ep.pulses_per_revolution,
            ep.home_offset,
            ep.home_direction,
            u8::from(ep.has_limit_switch),
        );
    }
    out
}

/// Write the table to `path`.
pub fn save_endpoint_csv(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    std::fs::write(path, render_endpoint_csv(config))
        .map_err(|e| ConfigError::ParseError(format!("write {}: {e}", path.display())))?;
    info!("CFG: wrote {}", path.display());
    Ok(())
}
