use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Source of time for every timed decision in the kernel.
///
/// Breaker cooldowns, queue staleness, load-cache TTLs and overhead
/// measurement all read from a `Clock`, never from the OS directly,
/// so tests can drive virtual time.
pub trait Clock: Send + Sync + Debug {
    /// Monotonic instant used for intervals and timeouts.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the UNIX epoch, used for reporting only.
    fn unix_millis(&self) -> u64;
}

/// Default clock. Backed by tokio's time driver, so a paused test
/// runtime (`start_paused = true`) advances it deterministically.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock for synchronous tests. Time only moves on `advance`.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_unix_ms: u64,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_unix_ms: TokioClock.unix_millis(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn unix_millis(&self) -> u64 {
        self.origin_unix_ms + self.offset_ms.load(Ordering::SeqCst)
    }
}

/// Milliseconds as `f64`, the unit every overhead figure is reported in.
pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
