//! Cooperative main cycle.
//!
//! Fixed-period loop: tick the station, record timing, sleep out the rest
//! of the period. Overruns are logged for the first 10 occurrences and then
//! every 1000th; a summary is logged at DEBUG every 1000 cycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::station::Station;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [µs].
    pub last_cycle_us: u64,
    /// Minimum cycle duration [µs].
    pub min_cycle_us: u64,
    /// Maximum cycle duration [µs].
    pub max_cycle_us: u64,
    /// Running sum for average computation.
    pub sum_cycle_us: u64,
    /// Cycles that exceeded the period.
    pub overruns: u64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_us: 0,
            min_cycle_us: u64::MAX,
            max_cycle_us: 0,
            sum_cycle_us: 0,
            overruns: 0,
        }
    }

    /// Record a cycle duration; returns `true` on overrun.
    #[inline]
    pub fn record(&mut self, duration_us: u64, budget_us: u64) -> bool {
        self.cycle_count += 1;
        self.last_cycle_us = duration_us;
        self.min_cycle_us = self.min_cycle_us.min(duration_us);
        self.max_cycle_us = self.max_cycle_us.max(duration_us);
        self.sum_cycle_us = self.sum_cycle_us.saturating_add(duration_us);
        let overrun = duration_us > budget_us;
        if overrun {
            self.overruns += 1;
        }
        overrun
    }

    /// Average cycle time [µs] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_us(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_us / self.cycle_count
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether overrun number `n` gets a log line.
#[inline]
pub const fn should_log_overrun(n: u64) -> bool {
    n <= 10 || n % 1000 == 0
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the station and paces it.
pub struct CycleRunner {
    station: Station,
    cycle_time: Duration,
    running: Arc<AtomicBool>,
    stats: CycleStats,
    epoch: Instant,
}

impl CycleRunner {
    /// Create a runner ticking `station` every `cycle_time_us`.
    pub fn new(station: Station, cycle_time_us: u64) -> Self {
        Self {
            station,
            cycle_time: Duration::from_micros(cycle_time_us),
            running: Arc::new(AtomicBool::new(true)),
            stats: CycleStats::new(),
            epoch: Instant::now(),
        }
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Timing statistics so far.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// The station being driven.
    pub fn station(&self) -> &Station {
        &self.station
    }

    /// The station, for commands between cycles.
    pub fn station_mut(&mut self) -> &mut Station {
        &mut self.station
    }

    /// Run one cycle without sleeping; returns events dispatched.
    pub fn run_once(&mut self) -> usize {
        let cycle_start = Instant::now();
        let now_us = cycle_start.duration_since(self.epoch).as_micros() as u64;
        let dispatched = self.station.tick(now_us);

        let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
        let budget_us = self.cycle_time.as_micros() as u64;
        if self.stats.record(cycle_time_us, budget_us) && should_log_overrun(self.stats.overruns) {
            warn!(
                "Timing violation #{}: cycle took {}us (target {}us)",
                self.stats.overruns, cycle_time_us, budget_us
            );
        }
        dispatched
    }

    /// Cycle until the running flag is cleared.
    pub fn run(&mut self) {
        info!(
            "Starting main cycle (cycle_time={}us)...",
            self.cycle_time.as_micros()
        );

        while self.running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            self.run_once();

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }

            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "Main cycle: {} cycles, avg={}us, max={}us, overruns={}, {:?}",
                    self.stats.cycle_count,
                    self.stats.avg_cycle_us(),
                    self.stats.max_cycle_us,
                    self.stats.overruns,
                    self.station
                );
            }
        }

        info!(
            "Main cycle stopped after {} cycles (overruns: {})",
            self.stats.cycle_count, self.stats.overruns
        );
    }

    /// Request the loop to stop.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_common::config::StationConfig;
    use acs_hal::backend::BackendRegistry;

    #[test]
    fn stats_track_extremes_and_overruns() {
        let mut stats = CycleStats::new();
        assert_eq!(stats.avg_cycle_us(), 0);
        assert!(!stats.record(400, 1000));
        assert!(stats.record(1500, 1000));
        assert!(!stats.record(200, 1000));
        assert_eq!(stats.cycle_count, 3);
        assert_eq!(stats.min_cycle_us, 200);
        assert_eq!(stats.max_cycle_us, 1500);
        assert_eq!(stats.avg_cycle_us(), 700);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn overrun_logging_is_rate_limited() {
        let logged: Vec<u64> = (1..=3000).filter(|&n| should_log_overrun(n)).collect();
        assert_eq!(logged.len(), 13);
        assert_eq!(&logged[9..], &[10, 1000, 2000, 3000]);
    }

    #[test]
    fn run_stops_on_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = StationConfig::default();
        cfg.paths.config_blob = dir.path().join("config.bin");
        cfg.paths.endpoints_csv = dir.path().join("endpoints.csv");
        cfg.paths.sequence_csv = dir.path().join("animation.csv");

        let station = Station::from_config(&cfg, &BackendRegistry::default()).unwrap();
        let mut runner = CycleRunner::new(station, 1000);
        let flag = runner.running_flag();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            flag.store(false, Ordering::SeqCst);
        });
        runner.run();
        stopper.join().unwrap();
        assert!(runner.stats().cycle_count > 0);
        assert_eq!(runner.station().player().len(), 20);
    }
}
