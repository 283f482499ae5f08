use std::ops::ControlFlow;
use std::sync::Weak;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::timers::TimerSet;

/// What a single sweep reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub items_cleaned: usize,
    /// Estimated bytes of bookkeeping released.
    pub memory_released: u64,
}

/// Bookkeeping of the most recent cleanup. Overwritten every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub last_cleanup_unix_ms: Option<u64>,
    pub items_cleaned: usize,
    pub memory_released: u64,
    pub next_cleanup_unix_ms: Option<u64>,
    pub cycles: u64,
}

impl CleanupStats {
    pub fn record(&mut self, outcome: SweepOutcome, now_unix_ms: u64, period: Duration) {
        self.last_cleanup_unix_ms = Some(now_unix_ms);
        self.items_cleaned = outcome.items_cleaned;
        self.memory_released = outcome.memory_released;
        self.next_cleanup_unix_ms = Some(now_unix_ms + period.as_millis() as u64);
        self.cycles += 1;
    }
}

/// Anything that can reclaim dead entries on a timer.
pub trait Sweep: Send + Sync + 'static {
    fn sweep(&self) -> SweepOutcome;
}

/// Timer-driven sweep.
///
/// Holds only a `Weak` to its target: the cycle never keeps the owner
/// alive and ends on its own once the owner is dropped.
pub struct CleanupCycle;

impl CleanupCycle {
    pub fn spawn<S: Sweep>(timers: &mut TimerSet, period: Duration, target: Weak<S>) {
        timers.spawn_periodic(period, move || match target.upgrade() {
            Some(owner) => {
                owner.sweep();
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        });
    }
}
