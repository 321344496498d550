//! Per-servo status cache keyed by CAN id.

use acs_common::consts::MAX_TRACKED_SERVOS;

/// Last decoded status of one CAN servo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServoStatus {
    /// Position [pulses].
    pub position: i32,
    /// Velocity [RPM].
    pub velocity: u16,
    /// Motor current (0-255).
    pub current: u8,
    /// Error flags.
    pub error_code: u8,
    /// Time of the last update [ms].
    pub last_update_ms: u32,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    can_id: u16,
    status: Option<ServoStatus>,
}

/// Fixed-capacity cache; servos register on first response.
#[derive(Debug, Clone)]
pub struct ServoCache {
    slots: heapless::Vec<Slot, MAX_TRACKED_SERVOS>,
    stale_ms: u32,
}

impl ServoCache {
    /// Create an empty cache whose entries expire after `stale_ms`.
    pub const fn new(stale_ms: u32) -> Self {
        Self {
            slots: heapless::Vec::new(),
            stale_ms,
        }
    }

    fn find(&self, can_id: u16) -> Option<usize> {
        self.slots.iter().position(|s| s.can_id == can_id)
    }

    /// Index of `can_id`, registering it if new. `None` when the cache is full.
    pub fn register(&mut self, can_id: u16) -> Option<usize> {
        if let Some(index) = self.find(can_id) {
            return Some(index);
        }
        self.slots
            .push(Slot {
                can_id,
                status: None,
            })
            .ok()?;
        Some(self.slots.len() - 1)
    }

    /// Store a freshly decoded position.
    pub fn record_position(&mut self, can_id: u16, position: i32, now_ms: u32) -> bool {
        let Some(index) = self.register(can_id) else {
            return false;
        };
        let status = self.slots[index].status.get_or_insert_with(ServoStatus::default);
        status.position = position;
        status.last_update_ms = now_ms;
        true
    }

    /// Cached status if it was refreshed within the staleness window.
    pub fn get(&self, can_id: u16, now_ms: u32) -> Option<ServoStatus> {
        let status = self.slots[self.find(can_id)?].status?;
        (now_ms.wrapping_sub(status.last_update_ms) <= self.stale_ms).then_some(status)
    }

    /// Registered servo count.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no servo has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_then_stale() {
        let mut cache = ServoCache::new(1000);
        assert!(cache.get(5, 0).is_none());
        assert!(cache.record_position(5, 1000, 2000));
        assert_eq!(cache.get(5, 2000).map(|s| s.position), Some(1000));
        assert!(cache.get(5, 3000).is_some());
        assert!(cache.get(5, 3001).is_none());
    }

    #[test]
    fn registered_without_data_is_unavailable() {
        let mut cache = ServoCache::new(1000);
        assert_eq!(cache.register(9), Some(0));
        assert_eq!(cache.register(9), Some(0));
        assert!(cache.get(9, 0).is_none());
    }

    #[test]
    fn full_cache_rejects_new_ids_and_keeps_old() {
        let mut cache = ServoCache::new(1000);
        for id in 0..MAX_TRACKED_SERVOS as u16 {
            assert!(cache.record_position(id, i32::from(id), 0));
        }
        assert!(!cache.record_position(0x100, 1, 0));
        assert_eq!(cache.register(0x100), None);
        assert_eq!(cache.len(), MAX_TRACKED_SERVOS);
        assert_eq!(cache.get(3, 10).map(|s| s.position), Some(3));
        assert!(cache.record_position(3, 33, 20));
        assert_eq!(cache.get(3, 20).map(|s| s.position), Some(33));
    }

    #[test]
    fn survives_clock_wrap() {
        let mut cache = ServoCache::new(1000);
        cache.record_position(1, 7, u32::MAX - 100);
        assert!(cache.get(1, 200).is_some());
        assert!(cache.get(1, 1000).is_none());
    }
}
