//! Sequence playback.
//!
//! - [`player`]: the fixed-capacity event table and its play state machine
//! - [`file`]: the `[sequence]` CSV collaborator and the default animation

pub mod file;
pub mod player;

use thiserror::Error;

pub use file::{load_sequence, parse_sequence, render_sequence, save_sequence};
pub use player::{PlayerState, SequencePlayer};

/// Sequence table and file errors.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The event table already holds `MAX_EVENTS` entries.
    #[error("event table full")]
    TableFull,

    /// Index past the end of the table.
    #[error("event index {0} out of range")]
    IndexOutOfRange(usize),

    /// Event time or endpoint outside the accepted range.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// File has no `[sequence]` marker.
    #[error("no [sequence] section found")]
    NoSequenceSection,

    /// Reading or writing the sequence file failed.
    #[error("sequence file I/O: {0}")]
    Io(#[from] std::io::Error),
}
