//! Sequence file (`animation.csv`).
//!
//! ```text
//! [sequence]
//! # time_ms,endpoint_id,position,velocity,accel,mode
//! 0,1,0,800,250,pos
//! 2000,1,1000,800,250,pos
//! [endpoints]
//! ```
//!
//! Only rows between `[sequence]` and `[endpoints]` (or end of file) are
//! read. `mode` is optional and defaults to `pos`. Bad rows are skipped with
//! a warning; a file with no `[sequence]` marker is rejected.

use std::fmt::Write as _;
use std::path::Path;

use acs_common::consts::{MAX_EVENTS, MAX_EVENT_TIME_MS};
use acs_common::sequence::{Mode, SequenceEvent};
use acs_common::text::{is_section_line, parse_i32, parse_u32, split_fields, strip_inline_comment};
use tracing::{info, warn};

use super::SequenceError;
use super::player::SequencePlayer;

const HEADER: &str = "# time_ms,endpoint_id,position,velocity,accel,mode";
const MIN_FIELDS: usize = 5;
const MAX_FIELDS: usize = 6;

fn parse_row(row: &str) -> Result<SequenceEvent, String> {
    let f = split_fields::<MAX_FIELDS>(row);
    if f.len() < MIN_FIELDS {
        return Err(format!("need {MIN_FIELDS} fields, got {}", f.len()));
    }
    let time_ms = parse_u32(f[0]).ok_or("parse error (time_ms)")?;
    let endpoint = parse_u32(f[1]).ok_or("parse error (endpoint_id)")?;
    let position = parse_i32(f[2]).ok_or("parse error (position)")?;
    let velocity = parse_u32(f[3]).ok_or("parse error (velocity)")?;
    let accel = parse_u32(f[4]).ok_or("parse error (accel)")?;
    let mode = match f.get(5) {
        Some(field) => field.parse::<Mode>().map_err(|e| e.to_string())?,
        None => Mode::Position,
    };

    if time_ms > MAX_EVENT_TIME_MS {
        return Err(format!("time out of range: {time_ms}"));
    }
    let endpoint_id = u8::try_from(endpoint).map_err(|_| format!("invalid endpoint {endpoint}"))?;
    let event = SequenceEvent {
        time_ms,
        endpoint_id,
        position,
        velocity,
        accel,
        mode,
    };
    event.validate().map_err(|e| e.to_string())?;
    Ok(event)
}

/// Parse the `[sequence]` section of a document.
///
/// Stops with a warning after `MAX_EVENTS` rows.
///
/// # Errors
///
/// `NoSequenceSection` when the marker never appears.
pub fn parse_sequence(text: &str) -> Result<Vec<SequenceEvent>, SequenceError> {
    let mut events = Vec::new();
    let mut seen_section = false;
    let mut in_section = false;

    for (lineno, line) in text.lines().enumerate() {
        if is_section_line(line, "sequence") {
            seen_section = true;
            in_section = true;
            continue;
        }
        if is_section_line(line, "endpoints") {
            in_section = false;
            continue;
        }
        if !in_section {
            continue;
        }
        let row = strip_inline_comment(line);
        if row.is_empty() {
            continue;
        }
        match parse_row(row) {
            Ok(event) => {
                if events.len() >= MAX_EVENTS {
                    warn!("SEQ: event buffer full ({MAX_EVENTS}), stopping at line {}", lineno + 1);
                    break;
                }
                events.push(event);
            }
            Err(e) => warn!("SEQ: skip line {} ({e}): {}", lineno + 1, line.trim()),
        }
    }

    if !seen_section {
        return Err(SequenceError::NoSequenceSection);
    }
    Ok(events)
}

/// Load a sequence file into `player`, replacing its table.
///
/// The player is cleared first, so a failed load leaves it empty.
/// Returns the number of events loaded.
///
/// # Errors
///
/// `Io` on read failure, `NoSequenceSection` for a file without a marker.
pub fn load_sequence(path: &Path, player: &mut SequencePlayer) -> Result<usize, SequenceError> {
    player.clear();
    let text = std::fs::read_to_string(path)?;
    let events = parse_sequence(&text)?;
    player.load(&events);
    info!("SEQ: {} -> {} events", path.display(), player.len());
    Ok(player.len())
}

/// Render events as a `[sequence]` document.
pub fn render_sequence(events: &[SequenceEvent]) -> String {
    let mut out = String::from("[sequence]\n");
    out.push_str(HEADER);
    out.push('\n');
    for ev in events {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            ev.time_ms, ev.endpoint_id, ev.position, ev.velocity, ev.accel, ev.mode
        );
    }
    out
}

/// Write events to `path`.
///
/// # Errors
///
/// `Io` on write failure.
pub fn save_sequence(path: &Path, events: &[SequenceEvent]) -> Result<(), SequenceError> {
    std::fs::write(path, render_sequence(events))?;
    info!("SEQ: wrote {} events to {}", events.len(), path.display());
    Ok(())
}

/// Built-in demo: endpoints 1-4 swing 0 → 1000 → 0 → -1000 → 0 every 2 s.
pub fn default_animation() -> Vec<SequenceEvent> {
    const KEYS: [(u32, i32); 5] = [(0, 0), (2000, 1000), (4000, 0), (6000, -1000), (8000, 0)];
    KEYS.iter()
        .flat_map(|&(time_ms, position)| {
            (1..=4).map(move |endpoint_id| SequenceEvent {
                time_ms,
                endpoint_id,
                position,
                velocity: 800,
                accel: 250,
                mode: Mode::Position,
            })
        })
        .collect()
}

/// Write [`default_animation`] to `path`.
///
/// # Errors
///
/// `Io` on write failure.
pub fn write_default_sequence(path: &Path) -> Result<(), SequenceError> {
    save_sequence(path, &default_animation())
}
