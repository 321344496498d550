//! Interrupt-mask critical section.
//!
//! [`IrqGate`] stands in for masking the CAN receive interrupt. While a
//! guard is alive the receive handler cannot run, so the holder sees ring
//! indices that no producer is mutating. Holders must keep the window to a
//! few loads and stores.

use std::sync::atomic::{AtomicBool, Ordering};

/// Mask for one interrupt source.
#[derive(Debug, Default)]
pub struct IrqGate {
    masked: AtomicBool,
}

impl IrqGate {
    /// Create an unmasked gate.
    pub const fn new() -> Self {
        Self {
            masked: AtomicBool::new(false),
        }
    }

    /// Mask the interrupt until the guard drops.
    pub fn mask(&self) -> IrqGuard<'_> {
        while self
            .masked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        IrqGuard { gate: self }
    }

    /// Run `f` with the interrupt masked.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.mask();
        f()
    }

    /// Whether the interrupt is currently masked.
    pub fn is_masked(&self) -> bool {
        self.masked.load(Ordering::Relaxed)
    }
}

/// Unmasks the interrupt on drop.
#[derive(Debug)]
pub struct IrqGuard<'a> {
    gate: &'a IrqGate,
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.gate.masked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn guard_unmasks_on_drop() {
        let gate = IrqGate::new();
        {
            let _g = gate.mask();
            assert!(gate.is_masked());
        }
        assert!(!gate.is_masked());
        assert_eq!(gate.with(|| 7), 7);
        assert!(!gate.is_masked());
    }

    #[test]
    fn sections_are_exclusive() {
        let gate = Arc::new(IrqGate::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        gate.with(|| {
                            let v = counter.load(Ordering::Relaxed);
                            counter.store(v + 1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }
}
