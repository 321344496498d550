//! CAN receive log.
//!
//! Fixed-capacity ring of raw frames between the receive interrupt (or the
//! polled drain) and the main loop. One slot is kept free to tell full from
//! empty, so the ring holds `RX_LOG_SIZE - 1` frames.
//!
//! - Producer: [`RxProducer::push`] runs in interrupt context. When the ring
//!   is full it sets the sticky overflow flag and drops the new frame.
//!   Like the consumer it masks only for the index check and the head store.
//! - Consumer: [`RxConsumer::pop`] masks the interrupt only to read the
//!   indices and to publish the new tail. The payload copy happens unmasked;
//!   the producer never writes the slot at `tail` while the ring is non-empty.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use acs_common::consts::RX_LOG_SIZE;

use super::CanFrame;
use super::critical::IrqGate;

static_assertions::const_assert!(RX_LOG_SIZE >= 2);

struct RxLog {
    gate: IrqGate,
    slots: [UnsafeCell<CanFrame>; RX_LOG_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
    overflow: AtomicBool,
}

// SAFETY: slot access is partitioned by the head/tail protocol. The producer
// writes only the slot at `head` before publishing it; the single consumer
// reads only the slot at `tail`, and `head != tail` whenever it does.
unsafe impl Sync for RxLog {}

/// Create a receive log and split it into its two ends.
pub fn rx_log() -> (RxProducer, RxConsumer) {
    let log = Arc::new(RxLog {
        gate: IrqGate::new(),
        slots: std::array::from_fn(|_| UnsafeCell::new(CanFrame::default())),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        overflow: AtomicBool::new(false),
    });
    (
        RxProducer {
            log: Arc::clone(&log),
        },
        RxConsumer { log },
    )
}

/// Interrupt-side handle. Clones share the same ring; only the active
/// receive path pushes, never two clones at once.
#[derive(Clone)]
pub struct RxProducer {
    log: Arc<RxLog>,
}

impl RxProducer {
    /// Append a frame; returns `false` and flags overflow when full.
    ///
    /// The gate is held for the index check and for the head store only;
    /// the payload copy runs unmasked like the consumer's.
    pub fn push(&self, frame: CanFrame) -> bool {
        let Some(head) = self.reserve() else {
            return false;
        };
        // SAFETY: `head` is not the consumer's slot (see `RxLog`), and the
        // consumer cannot reach it before `publish` moves `head` past it.
        unsafe {
            *self.log.slots[head].get() = frame;
        }
        self.publish(head);
        true
    }

    /// Slot for the next frame, or `None` with overflow flagged when full.
    fn reserve(&self) -> Option<usize> {
        let log = &*self.log;
        log.gate.with(|| {
            let head = log.head.load(Ordering::Relaxed);
            if (head + 1) % RX_LOG_SIZE == log.tail.load(Ordering::Acquire) {
                log.overflow.store(true, Ordering::Relaxed);
                None
            } else {
                Some(head)
            }
        })
    }

    fn publish(&self, head: usize) {
        let log = &*self.log;
        log.gate
            .with(|| log.head.store((head + 1) % RX_LOG_SIZE, Ordering::Release));
    }
}

impl std::fmt::Debug for RxProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxProducer").finish_non_exhaustive()
    }
}

/// Main-loop handle. Exactly one exists per log.
pub struct RxConsumer {
    log: Arc<RxLog>,
}

impl RxConsumer {
    /// Remove the oldest frame.
    pub fn pop(&mut self) -> Option<CanFrame> {
        let log = &*self.log;
        let (head, tail) = log.gate.with(|| {
            (
                log.head.load(Ordering::Acquire),
                log.tail.load(Ordering::Relaxed),
            )
        });
        if head == tail {
            return None;
        }

        // SAFETY: `tail != head`, so the producer will not write this slot
        // until the tail store below.
        let frame = unsafe { *log.slots[tail].get() };

        log.gate
            .with(|| log.tail.store((tail + 1) % RX_LOG_SIZE, Ordering::Release));
        Some(frame)
    }

    /// Read and clear the overflow flag.
    pub fn take_overflow(&mut self) -> bool {
        let log = &*self.log;
        log.gate.with(|| log.overflow.swap(false, Ordering::Relaxed))
    }

    /// Frames currently buffered.
    pub fn len(&self) -> usize {
        let log = &*self.log;
        let (head, tail) = log.gate.with(|| {
            (
                log.head.load(Ordering::Acquire),
                log.tail.load(Ordering::Relaxed),
            )
        });
        (head + RX_LOG_SIZE - tail) % RX_LOG_SIZE
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity.
    pub const fn capacity(&self) -> usize {
        RX_LOG_SIZE - 1
    }
}

impl std::fmt::Debug for RxConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxConsumer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(id: u32) -> CanFrame {
        CanFrame::new(id, &[id as u8])
    }

    #[test]
    fn fifo_order() {
        let (tx, mut rx) = rx_log();
        assert!(rx.pop().is_none());
        for id in 1..=3 {
            assert!(tx.push(frame(id)));
        }
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.pop().map(|f| f.id), Some(1));
        assert_eq!(rx.pop().map(|f| f.id), Some(2));
        assert_eq!(rx.pop().map(|f| f.id), Some(3));
        assert!(rx.is_empty());
    }

    #[test]
    fn overflow_drops_newest_and_flags_once() {
        let (tx, mut rx) = rx_log();
        let cap = rx.capacity();
        for id in 0..cap as u32 {
            assert!(tx.push(frame(id)));
        }
        assert!(!tx.push(frame(100)));
        assert!(!tx.push(frame(101)));

        assert!(rx.take_overflow());
        assert!(!rx.take_overflow());

        // Oldest frames survive.
        let ids: Vec<u32> = std::iter::from_fn(|| rx.pop()).map(|f| f.id).collect();
        assert_eq!(ids, (0..cap as u32).collect::<Vec<_>>());

        assert!(tx.push(frame(7)));
        assert!(!rx.take_overflow());
    }

    #[test]
    fn payload_copy_runs_unmasked() {
        let (tx, mut rx) = rx_log();
        let head = tx.reserve().unwrap();
        assert!(!tx.log.gate.is_masked());

        // Reserved but unpublished slots stay invisible to the consumer.
        unsafe {
            *tx.log.slots[head].get() = frame(42);
        }
        assert!(rx.pop().is_none());

        tx.publish(head);
        assert!(!tx.log.gate.is_masked());
        assert_eq!(rx.pop().map(|f| f.id), Some(42));
    }

    #[test]
    fn wraps_around_many_times() {
        let (tx, mut rx) = rx_log();
        for id in 0..(RX_LOG_SIZE as u32 * 5) {
            assert!(tx.push(frame(id)));
            assert_eq!(rx.pop().map(|f| f.id), Some(id));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn concurrent_producer_keeps_order() {
        let (tx, mut rx) = rx_log();
        let producer = thread::spawn(move || {
            let mut id = 0u32;
            while id < 2000 {
                if tx.push(frame(id)) {
                    id += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0u32;
        while expected < 2000 {
            match rx.pop() {
                Some(f) => {
                    assert_eq!(f.id, expected);
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();
    }
}
