//! Sequence event record shared by the player, the file collaborator and
//! the command surface.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;
use crate::consts::{MAX_ENDPOINTS, MAX_EVENT_TIME_MS};

/// Motion mode of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Mode {
    /// Move to `position` at `velocity`/`accel`.
    #[default]
    Position = 0,
    /// Spin at `velocity`; the sign of `position` selects direction.
    Velocity = 1,
}

impl Mode {
    /// Short name written to sequence files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Position => "pos",
            Self::Velocity => "vel",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    /// Empty input means `Position`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.split_whitespace().next().unwrap_or("");
        match word.to_ascii_lowercase().as_str() {
            "" | "pos" | "position" | "p" | "0" => Ok(Self::Position),
            "vel" | "velocity" | "v" | "1" => Ok(Self::Velocity),
            other => Err(ConfigError::ParseError(format!("invalid mode '{other}'"))),
        }
    }
}

/// One timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceEvent {
    /// Show time at which the event is due [ms].
    pub time_ms: u32,
    /// Target endpoint (1-based).
    pub endpoint_id: u8,
    /// Target position (or direction sign in velocity mode).
    pub position: i32,
    /// Velocity.
    pub velocity: u32,
    /// Acceleration.
    pub accel: u32,
    /// Motion mode.
    pub mode: Mode,
}

impl SequenceEvent {
    /// Playback ordering key: `(time_ms, endpoint_id)`.
    #[inline]
    pub fn playback_cmp(&self, other: &Self) -> Ordering {
        (self.time_ms, self.endpoint_id).cmp(&(other.time_ms, other.endpoint_id))
    }

    /// Check time and endpoint ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_ms > MAX_EVENT_TIME_MS {
            return Err(ConfigError::ValidationError(format!(
                "time out of range: {}",
                self.time_ms
            )));
        }
        if self.endpoint_id == 0 || self.endpoint_id as usize > MAX_ENDPOINTS {
            return Err(ConfigError::ValidationError(format!(
                "invalid endpoint {}",
                self.endpoint_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_aliases() {
        for s in ["pos", "position", "P", "0", "", "  pos  "] {
            assert_eq!(s.parse::<Mode>().unwrap(), Mode::Position, "{s:?}");
        }
        for s in ["vel", "Velocity", "v", "1", " vel trailing"] {
            assert_eq!(s.parse::<Mode>().unwrap(), Mode::Velocity, "{s:?}");
        }
        assert!("jog".parse::<Mode>().is_err());
    }

    #[test]
    fn event_validation_bounds() {
        let mut ev = SequenceEvent {
            time_ms: MAX_EVENT_TIME_MS,
            endpoint_id: 1,
            ..SequenceEvent::default()
        };
        assert!(ev.validate().is_ok());
        ev.time_ms += 1;
        assert!(ev.validate().is_err());
        ev.time_ms = 0;
        ev.endpoint_id = 0;
        assert!(ev.validate().is_err());
        ev.endpoint_id = MAX_ENDPOINTS as u8 + 1;
        assert!(ev.validate().is_err());
    }

    #[test]
    fn playback_order_is_time_then_endpoint() {
        let a = SequenceEvent { time_ms: 10, endpoint_id: 2, ..Default::default() };
        let b = SequenceEvent { time_ms: 10, endpoint_id: 3, ..Default::default() };
        let c = SequenceEvent { time_ms: 5, endpoint_id: 9, ..Default::default() };
        assert_eq!(a.playback_cmp(&b), Ordering::Less);
        assert_eq!(c.playback_cmp(&a), Ordering::Less);
        assert_eq!(a.playback_cmp(&a), Ordering::Equal);
    }
}
