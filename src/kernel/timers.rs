use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Owns every background task a component spawns.
///
/// Tasks observe a shared cancellation token; `clear` cancels it, aborts
/// the handles and arms a fresh token so the set can be reused.
/// Spawning needs a tokio runtime, clearing does not.
#[derive(Debug, Default)]
pub struct TimerSet {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a task handed the set's cancellation token.
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handles.retain(|h| !h.is_finished());
        let fut = task(self.token.clone());
        self.handles.push(tokio::spawn(fut));
    }

    /// Runs `tick` every `period` (first run one period from now) until it
    /// breaks or the set is cleared. Missed ticks are skipped, not bunched.
    pub fn spawn_periodic<F>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.spawn(move |token| async move {
            let mut cadence = interval_at(Instant::now() + period, period);
            cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = cadence.tick() => {
                        if tick().is_break() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Cancels and aborts everything. Returns how many handles were held.
    pub fn clear(&mut self) -> usize {
        self.token.cancel();
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        self.token = CancellationToken::new();
        count
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.token.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}
