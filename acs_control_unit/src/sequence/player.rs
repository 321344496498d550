//! Sequence Player.
//!
//! Holds up to [`MAX_EVENTS`] events ordered by `(time_ms, endpoint_id)` and
//! sweeps them against a looping show time:
//!
//! ```text
//!   Empty ──load/insert──▶ Stopped ──play──▶ Playing
//!     ▲                      ▲  ◀────stop─────  │
//!     └──── table emptied ───┴──────────────────┘
//! ```
//!
//! Each [`SequencePlayer::advance`] wraps the show time into
//! `[0, loop_length_ms)`, consumes every event due since the previous call,
//! and hands on only the last due event per endpoint, in endpoint order.
//! Every table mutation rewinds the cursor.

use std::cmp::Ordering;

use acs_common::consts::{MAX_ENDPOINTS, MAX_EVENTS};
use acs_common::endpoint::AppConfig;
use acs_common::sequence::SequenceEvent;
use acs_hal::can::CanTransport;
use acs_hal::serial::SerialMotorBus;
use heapless::Vec;
use tracing::{info, warn};

use super::SequenceError;
use crate::dispatch::dispatch;

/// Player state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No events loaded.
    Empty,
    /// Events loaded, not dispatching.
    Stopped,
    /// Events loaded and dispatched on every update.
    Playing,
}

/// Stable in-place insertion sort by playback key.
///
/// Ties keep their relative order.
pub fn sort_events(events: &mut [SequenceEvent]) {
    for i in 1..events.len() {
        let mut j = i;
        while j > 0 && events[j - 1].playback_cmp(&events[j]) == Ordering::Greater {
            events.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Fixed-capacity event table with a playback cursor.
#[derive(Debug, Clone, Default)]
pub struct SequencePlayer {
    events: Vec<SequenceEvent, MAX_EVENTS>,
    cursor: usize,
    last_time_ms: u32,
    max_time_ms: u32,
    playing: bool,
}

impl SequencePlayer {
    /// Create an empty player.
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            cursor: 0,
            last_time_ms: 0,
            max_time_ms: 0,
            playing: false,
        }
    }

    // ─── Table ──────────────────────────────────────────────────────

    /// Replace the table.
    ///
    /// Invalid rows are skipped with a warning. Rows past capacity are
    /// dropped after one warning. Returns `true` when at least one event
    /// was loaded. Playback stops either way.
    pub fn load(&mut self, events: &[SequenceEvent]) -> bool {
        self.clear();
        for ev in events {
            if let Err(e) = ev.validate() {
                warn!("SEQ: skip event ({e}): {ev:?}");
                continue;
            }
            if self.events.push(*ev).is_err() {
                warn!("SEQ: event buffer full ({MAX_EVENTS}), remaining rows dropped");
                break;
            }
        }
        self.sort_for_playback();
        info!(
            "SEQ: loaded {} events, loop {} ms",
            self.events.len(),
            self.loop_length_ms()
        );
        !self.events.is_empty()
    }

    /// Drop every event and stop.
    pub fn clear(&mut self) {
        self.events.clear();
        self.max_time_ms = 0;
        self.playing = false;
        self.reset();
    }

    /// Event at `index`.
    pub fn get(&self, index: usize) -> Option<&SequenceEvent> {
        self.events.get(index)
    }

    /// Every event in playback order.
    pub fn events(&self) -> &[SequenceEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Overwrite the event at `index`.
    ///
    /// With `keep_order` the event stays at `index` even if that breaks the
    /// ordering; otherwise the table is re-sorted and the event's new index
    /// is returned.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` or `InvalidEvent`; the table is untouched.
    pub fn set(
        &mut self,
        index: usize,
        event: SequenceEvent,
        keep_order: bool,
    ) -> Result<usize, SequenceError> {
        event
            .validate()
            .map_err(|e| SequenceError::InvalidEvent(e.to_string()))?;
        let slot = self
            .events
            .get_mut(index)
            .ok_or(SequenceError::IndexOutOfRange(index))?;
        *slot = event;

        if keep_order {
            self.recompute_loop();
            self.reset();
            return Ok(index);
        }
        self.sort_for_playback();
        Ok(self.position_of(&event).unwrap_or(index))
    }

    /// Insert an event in playback order; returns its index.
    ///
    /// # Errors
    ///
    /// `TableFull` at capacity, `InvalidEvent` for out-of-range fields.
    pub fn insert(&mut self, event: SequenceEvent) -> Result<usize, SequenceError> {
        event
            .validate()
            .map_err(|e| SequenceError::InvalidEvent(e.to_string()))?;
        self.events
            .push(event)
            .map_err(|_| SequenceError::TableFull)?;
        self.sort_for_playback();
        Ok(self
            .position_of(&event)
            .unwrap_or(self.events.len() - 1))
    }

    /// Remove and return the event at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange`.
    pub fn delete(&mut self, index: usize) -> Result<SequenceEvent, SequenceError> {
        if index >= self.events.len() {
            return Err(SequenceError::IndexOutOfRange(index));
        }
        let removed = self.events.remove(index);
        if self.events.is_empty() {
            self.playing = false;
        }
        self.recompute_loop();
        self.reset();
        Ok(removed)
    }

    /// Restore playback order after `keep_order` edits.
    pub fn sort_for_playback(&mut self) {
        sort_events(&mut self.events);
        self.recompute_loop();
        self.reset();
    }

    fn position_of(&self, event: &SequenceEvent) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    fn recompute_loop(&mut self) {
        self.max_time_ms = self.events.iter().map(|e| e.time_ms).max().unwrap_or(0);
    }

    /// Loop period [ms]: latest event time + 1, or 0 when empty.
    pub fn loop_length_ms(&self) -> u32 {
        if self.events.is_empty() {
            0
        } else {
            self.max_time_ms + 1
        }
    }

    // ─── Playback ───────────────────────────────────────────────────

    /// Current state.
    pub fn state(&self) -> PlayerState {
        match (self.events.is_empty(), self.playing) {
            (true, _) => PlayerState::Empty,
            (false, false) => PlayerState::Stopped,
            (false, true) => PlayerState::Playing,
        }
    }

    /// Rewind the cursor and start playing. `false` when empty.
    pub fn play(&mut self) -> bool {
        if self.events.is_empty() {
            return false;
        }
        self.reset();
        self.playing = true;
        true
    }

    /// Stop dispatching. The cursor is kept.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Rewind to the start of the loop.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last_time_ms = 0;
    }

    /// Index of the next event to consume.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Consume the events due at show time `now_ms` and pass the last one
    /// per endpoint to `sink`, in endpoint order.
    ///
    /// Runs regardless of the play state. Returns the number of events
    /// handed to `sink`.
    pub fn advance<F>(&mut self, now_ms: u32, mut sink: F) -> usize
    where
        F: FnMut(&SequenceEvent),
    {
        if self.events.is_empty() {
            return 0;
        }

        let t = if self.max_time_ms > 0 {
            now_ms % (self.max_time_ms + 1)
        } else {
            now_ms
        };
        if t < self.last_time_ms {
            self.cursor = 0;
        }
        self.last_time_ms = t;

        let mut pending: [Option<SequenceEvent>; MAX_ENDPOINTS] = [None; MAX_ENDPOINTS];
        while let Some(ev) = self.events.get(self.cursor) {
            if ev.time_ms > t {
                break;
            }
            if let Some(slot) = usize::from(ev.endpoint_id)
                .checked_sub(1)
                .and_then(|i| pending.get_mut(i))
            {
                *slot = Some(*ev);
            }
            self.cursor += 1;
        }

        let mut handed = 0;
        for ev in pending.iter().flatten() {
            sink(ev);
            handed += 1;
        }
        handed
    }

    /// Dispatch due events while playing; returns the number dispatched.
    pub fn update(
        &mut self,
        now_ms: u32,
        config: &AppConfig,
        serial: &mut SerialMotorBus,
        can: &mut CanTransport,
    ) -> usize {
        if self.state() != PlayerState::Playing {
            return 0;
        }
        self.advance(now_ms, |ev| {
            dispatch(ev, config, serial, can);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_common::sequence::Mode;

    fn ev(time_ms: u32, endpoint_id: u8, position: i32) -> SequenceEvent {
        SequenceEvent {
            time_ms,
            endpoint_id,
            position,
            velocity: 800,
            accel: 250,
            mode: Mode::Position,
        }
    }

    fn collect(player: &mut SequencePlayer, now_ms: u32) -> std::vec::Vec<SequenceEvent> {
        let mut out = std::vec::Vec::new();
        player.advance(now_ms, |e| out.push(*e));
        out
    }

    fn is_sorted(player: &SequencePlayer) -> bool {
        player
            .events()
            .windows(2)
            .all(|w| w[0].playback_cmp(&w[1]) != Ordering::Greater)
    }

    #[test]
    fn state_machine() {
        let mut p = SequencePlayer::new();
        assert_eq!(p.state(), PlayerState::Empty);
        assert!(!p.play());

        assert!(p.load(&[ev(0, 1, 0)]));
        assert_eq!(p.state(), PlayerState::Stopped);
        assert!(p.play());
        assert_eq!(p.state(), PlayerState::Playing);
        p.stop();
        assert_eq!(p.state(), PlayerState::Stopped);

        p.play();
        p.delete(0).unwrap();
        assert_eq!(p.state(), PlayerState::Empty);
        p.insert(ev(5, 2, 0)).unwrap();
        assert_eq!(p.state(), PlayerState::Stopped);
    }

    #[test]
    fn load_skips_invalid_rows() {
        let mut p = SequencePlayer::new();
        assert!(p.load(&[ev(300_001, 1, 0), ev(10, 0, 0), ev(10, 17, 0), ev(10, 16, 0)]));
        assert_eq!(p.len(), 1);
        assert_eq!(p.get(0).map(|e| e.endpoint_id), Some(16));
        assert!(!p.load(&[ev(300_001, 1, 0)]));
        assert_eq!(p.state(), PlayerState::Empty);
    }

    #[test]
    fn load_stops_at_capacity() {
        let rows: std::vec::Vec<_> = (0..MAX_EVENTS as u32 + 10).map(|t| ev(t, 1, 0)).collect();
        let mut p = SequencePlayer::new();
        assert!(p.load(&rows));
        assert_eq!(p.len(), MAX_EVENTS);
        assert!(matches!(p.insert(ev(0, 1, 0)), Err(SequenceError::TableFull)));
        assert_eq!(p.len(), MAX_EVENTS);
    }

    #[test]
    fn sort_is_stable_on_equal_keys() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(100, 2, 1), ev(50, 1, 0), ev(100, 2, 2), ev(100, 1, 9), ev(100, 2, 3)]);
        let order: std::vec::Vec<_> = p
            .events()
            .iter()
            .map(|e| (e.time_ms, e.endpoint_id, e.position))
            .collect();
        assert_eq!(
            order,
            vec![(50, 1, 0), (100, 1, 9), (100, 2, 1), (100, 2, 2), (100, 2, 3)]
        );
    }

    #[test]
    fn mutations_keep_sort_invariant() {
        let mut p = SequencePlayer::new();
        let mut seed = 0x2545_F491u32;
        for _ in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let t = seed % 5_000;
            let id = (seed >> 20) as u8 % 16 + 1;
            if seed % 4 == 0 && !p.is_empty() {
                p.delete(seed as usize % p.len()).unwrap();
            } else {
                p.insert(ev(t, id, seed as i32)).unwrap();
            }
            assert!(is_sorted(&p));
        }
    }

    #[test]
    fn insert_returns_index_of_new_event() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 1, 0), ev(2000, 1, 0), ev(4000, 1, 0)]);
        assert_eq!(p.insert(ev(3000, 2, 7)).unwrap(), 2);
        assert_eq!(p.get(2).map(|e| e.position), Some(7));
        assert_eq!(p.insert(ev(9000, 1, 0)).unwrap(), 4);
        assert_eq!(p.loop_length_ms(), 9001);
    }

    #[test]
    fn set_with_and_without_keep_order() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 1, 0), ev(2000, 1, 0), ev(4000, 1, 0)]);

        assert_eq!(p.set(0, ev(5000, 1, 0), true).unwrap(), 0);
        assert_eq!(p.get(0).map(|e| e.time_ms), Some(5000));
        assert_eq!(p.loop_length_ms(), 5001);
        assert!(!is_sorted(&p));

        p.sort_for_playback();
        assert!(is_sorted(&p));
        assert_eq!(p.get(2).map(|e| e.time_ms), Some(5000));

        assert_eq!(p.set(2, ev(3000, 3, 0), false).unwrap(), 1);
        assert!(is_sorted(&p));
        assert!(matches!(p.set(9, ev(0, 1, 0), false), Err(SequenceError::IndexOutOfRange(9))));
        assert!(matches!(p.set(0, ev(0, 0, 0), false), Err(SequenceError::InvalidEvent(_))));
    }

    #[test]
    fn loop_wraps_and_replays() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 1, 0), ev(2000, 1, 1000), ev(4000, 1, 0)]);
        assert_eq!(p.loop_length_ms(), 4001);

        let first = collect(&mut p, 4000);
        p.reset();
        let wrapped = collect(&mut p, 8001);
        assert_eq!(first, wrapped);
        assert_eq!(first, vec![ev(4000, 1, 0)]);
    }

    #[test]
    fn earlier_time_rewinds_cursor() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 1, 0), ev(2000, 1, 1000), ev(4000, 1, 0)]);

        assert_eq!(collect(&mut p, 0), vec![ev(0, 1, 0)]);
        assert_eq!(collect(&mut p, 2500), vec![ev(2000, 1, 1000)]);
        assert!(collect(&mut p, 3000).is_empty());
        assert_eq!(p.cursor(), 2);
        // 4002 wraps to 1.
        assert_eq!(collect(&mut p, 4002), vec![ev(0, 1, 0)]);
        assert_eq!(p.cursor(), 1);
    }

    #[test]
    fn last_due_event_per_endpoint_wins() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 3, 1), ev(10, 3, 2), ev(20, 3, 3), ev(5, 1, 4), ev(30, 2, 5)]);
        let out = collect(&mut p, 25);
        assert_eq!(out, vec![ev(5, 1, 4), ev(20, 3, 3)]);
    }

    #[test]
    fn zero_length_loop_does_not_wrap() {
        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 1, 0), ev(0, 2, 0)]);
        assert_eq!(p.loop_length_ms(), 1);
        assert_eq!(collect(&mut p, 12_345).len(), 2);
        assert!(collect(&mut p, 20_000).is_empty());
    }

    #[test]
    fn update_requires_playing() {
        use acs_common::config::{CanSettings, TimingSettings};
        use acs_hal::can::sim::SimCanController;
        use acs_hal::serial::sim::SimRoboClaw;

        let sim = SimRoboClaw::new();
        let probe = sim.probe();
        let mut serial = SerialMotorBus::new();
        serial.bind(0, Box::new(sim)).unwrap();
        let mut can = CanTransport::new(
            Box::new(SimCanController::new()),
            &CanSettings::default(),
            &TimingSettings::default(),
        )
        .unwrap();
        let config = AppConfig::default();

        let mut p = SequencePlayer::new();
        p.load(&[ev(0, 1, 100), ev(0, 2, 200)]);
        assert_eq!(p.update(0, &config, &mut serial, &mut can), 0);
        assert!(probe.commands().is_empty());

        p.play();
        assert_eq!(p.update(0, &config, &mut serial, &mut can), 2);
        assert_eq!(probe.commands().len(), 2);
    }
}
