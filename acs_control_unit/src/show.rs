//! Show clock.
//!
//! Show time is the playback clock fed to the sequence player. It runs only
//! while playing; pausing freezes it and resuming continues from the frozen
//! value. All timestamps are microseconds from a caller-supplied monotonic
//! source.

/// Millisecond counter relative to a reset point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timebase {
    t0_us: u64,
}

impl Timebase {
    /// Start counting from `now_us`.
    pub const fn new(now_us: u64) -> Self {
        Self { t0_us: now_us }
    }

    /// Move the zero point to `now_us`.
    pub fn reset(&mut self, now_us: u64) {
        self.t0_us = now_us;
    }

    /// Milliseconds since the last reset, wrapping at `u32::MAX`.
    pub const fn now_ms(&self, now_us: u64) -> u32 {
        (now_us.saturating_sub(self.t0_us) / 1000) as u32
    }
}

/// Play/pause show time with resume offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowClock {
    timebase: Timebase,
    playing: bool,
    resume_ms: u32,
    paused_at_ms: u32,
}

impl ShowClock {
    /// Paused clock at show time zero.
    pub const fn new() -> Self {
        Self {
            timebase: Timebase::new(0),
            playing: false,
            resume_ms: 0,
            paused_at_ms: 0,
        }
    }

    /// Whether show time is advancing.
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start or pause. Repeated calls with the same value are no-ops.
    pub fn set_playing(&mut self, playing: bool, now_us: u64) {
        match (self.playing, playing) {
            (false, true) => {
                self.timebase.reset(now_us);
                self.resume_ms = self.paused_at_ms;
                self.playing = true;
            }
            (true, false) => {
                self.paused_at_ms = self.current_ms(now_us);
                self.playing = false;
            }
            _ => {}
        }
    }

    /// Pause and rewind to show time zero.
    pub fn rewind(&mut self) {
        self.playing = false;
        self.resume_ms = 0;
        self.paused_at_ms = 0;
    }

    /// Show time at `now_us` [ms].
    pub fn current_ms(&self, now_us: u64) -> u32 {
        if self.playing {
            self.resume_ms.wrapping_add(self.timebase.now_ms(now_us))
        } else {
            self.paused_at_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_counts_from_reset() {
        let mut tb = Timebase::new(5_000);
        assert_eq!(tb.now_ms(5_999), 0);
        assert_eq!(tb.now_ms(7_000), 2);
        tb.reset(10_000);
        assert_eq!(tb.now_ms(12_500), 2);
        assert_eq!(tb.now_ms(0), 0);
    }

    #[test]
    fn pause_freezes_and_resume_continues() {
        let mut clock = ShowClock::new();
        assert_eq!(clock.current_ms(9_000_000), 0);

        clock.set_playing(true, 1_000_000);
        assert_eq!(clock.current_ms(1_250_000), 250);

        clock.set_playing(false, 1_500_000);
        assert_eq!(clock.current_ms(1_500_000), 500);
        assert_eq!(clock.current_ms(9_000_000), 500);

        clock.set_playing(true, 20_000_000);
        assert_eq!(clock.current_ms(20_100_000), 600);

        // Already playing: no re-zero.
        clock.set_playing(true, 30_000_000);
        assert_eq!(clock.current_ms(30_000_000), 10_500);
    }

    #[test]
    fn rewind_returns_to_zero() {
        let mut clock = ShowClock::new();
        clock.set_playing(true, 0);
        clock.rewind();
        assert!(!clock.is_playing());
        assert_eq!(clock.current_ms(5_000_000), 0);
        clock.set_playing(true, 5_000_000);
        assert_eq!(clock.current_ms(5_001_000), 1);
    }
}
