use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use super::backpressure::{BackpressureQueue, Ticket};
use super::budget::{PerformanceBudgetTracker, PerformanceSample};
use super::load::{SystemLoadSampler, SystemLoadSnapshot};
use super::source::MetricsSource;
use super::types::{
    AdaptiveMetrics, AdaptiveSettings, CollectionStats, CriticalMetrics, ExtendedMetrics,
    MetricsCollection, MetricsMode, MinimalMetrics, OverheadStats,
};
use crate::config::SchedulerConfig;
use crate::error::{Result, VigilError};
use crate::kernel::breaker::{CircuitBreaker, CircuitBreakerStatus, CircuitState};
use crate::kernel::telemetry::{AnalyticsSink, TelemetryEvent};
use crate::kernel::time::{as_millis_f64, Clock};
use crate::kernel::timers::TimerSet;
use crate::memory::pressure::MemoryPressure;

const MINIMAL_LOAD: f64 = 0.9;
const CRITICAL_LOAD: f64 = 0.7;
const IDLE_LOAD: f64 = 0.3;

const MINIMAL_OVERHEAD_FACTOR: f64 = 3.0;
const CRITICAL_OVERHEAD_FACTOR: f64 = 1.5;

const BACKOFF_FACTOR: f64 = 1.5;
const SPEEDUP_FACTOR: f64 = 0.8;
const SAMPLING_CUT: f64 = 0.7;
const SAMPLING_BOOST: f64 = 1.1;
const DEGRADED_SAMPLING_RATE: f64 = 0.1;

/// Picks the collection tier from current load and average overhead.
pub fn select_mode(overall_load: f64, avg_overhead_ms: f64, budget_ms: f64) -> MetricsMode {
    if overall_load > MINIMAL_LOAD || avg_overhead_ms > MINIMAL_OVERHEAD_FACTOR * budget_ms {
        MetricsMode::Minimal
    } else if overall_load > CRITICAL_LOAD || avg_overhead_ms > CRITICAL_OVERHEAD_FACTOR * budget_ms {
        MetricsMode::Critical
    } else {
        MetricsMode::Full
    }
}

/// Retunes interval and sampling rate after a cycle.
///
/// Backs off when the last cycle broke the budget or the host is busy,
/// speeds up when both the average overhead and the load are low.
/// Results are always clamped to the configured bounds.
pub fn adapt_settings(
    settings: &mut AdaptiveSettings,
    config: &SchedulerConfig,
    overhead_ms: f64,
    overall_load: f64,
    avg_overhead_ms: f64,
) {
    let budget = config.budget_ms;
    let mut interval = settings.current_interval_ms as f64;
    let mut rate = settings.sampling_rate;

    if overhead_ms > budget || overall_load > CRITICAL_LOAD {
        interval *= BACKOFF_FACTOR;
        if overhead_ms > 2.0 * budget {
            rate *= SAMPLING_CUT;
        }
    } else if avg_overhead_ms < 0.5 * budget && overall_load < IDLE_LOAD {
        interval *= SPEEDUP_FACTOR;
        if avg_overhead_ms < 0.3 * budget {
            rate *= SAMPLING_BOOST;
        }
    }

    settings.current_interval_ms = clamp_interval(interval.round() as u64, config);
    settings.sampling_rate = clamp_rate(rate, config);
}

fn clamp_interval(ms: u64, config: &SchedulerConfig) -> u64 {
    ms.clamp(config.min_interval_ms, config.max_interval_ms)
}

fn clamp_rate(rate: f64, config: &SchedulerConfig) -> f64 {
    if rate.is_nan() {
        return config.min_sampling_rate;
    }
    rate.clamp(config.min_sampling_rate, 1.0)
}

#[derive(Debug)]
struct SchedulerState {
    collecting: bool,
    queue: BackpressureQueue,
    settings: AdaptiveSettings,
    sampling_credit: f64,
    stats: CollectionStats,
    destroyed: bool,
}

/// Everything the scheduler needs from the outside world.
pub struct SchedulerDeps {
    pub clock: Arc<dyn Clock>,
    pub source: Arc<dyn MetricsSource>,
    pub sampler: SystemLoadSampler,
    pub breaker: CircuitBreaker,
    pub analytics: Arc<dyn AnalyticsSink>,
}

/// Adaptive metrics collector.
///
/// At most one collection runs at a time. Callers that arrive while one
/// is in flight wait in a bounded queue and are handed the slot in arrival
/// order; the rest get `None`. Every cycle's cost is measured against the
/// budget and fed back into the tier, interval and sampling rate.
pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    source: Arc<dyn MetricsSource>,
    sampler: SystemLoadSampler,
    analytics: Arc<dyn AnalyticsSink>,
    breaker: Mutex<CircuitBreaker>,
    tracker: Mutex<PerformanceBudgetTracker>,
    state: Mutex<SchedulerState>,
    timers: Mutex<TimerSet>,
    latest: watch::Sender<Option<MetricsCollection>>,
}

/// Releases the collection slot however the holder exits, including when
/// its future is dropped mid-collection.
struct SlotGuard<'a> {
    scheduler: &'a AdaptiveScheduler,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.release_slot();
    }
}

/// Permission from the breaker. When it carries the half-open slot and is
/// dropped before an outcome was recorded, the slot is handed back.
struct Admission<'a> {
    scheduler: &'a AdaptiveScheduler,
    holds_half_open: bool,
}

impl Admission<'_> {
    fn settle(mut self) {
        self.holds_half_open = false;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.holds_half_open {
            self.scheduler.breaker.lock().release_half_open();
        }
    }
}

/// A caller waiting in the queue. If it is dropped after the slot was
/// granted but before it noticed, the slot is passed on instead of leaking.
struct QueuedTicket<'a> {
    scheduler: &'a AdaptiveScheduler,
    receiver: oneshot::Receiver<Ticket>,
    settled: bool,
}

impl Drop for QueuedTicket<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.receiver.close();
        if let Ok(Ticket::Proceed) = self.receiver.try_recv() {
            self.scheduler.release_slot();
        }
    }
}

impl AdaptiveScheduler {
    /// Fails with `InvalidConfig` when the bounds in `config` are unusable.
    pub fn new(config: SchedulerConfig, deps: SchedulerDeps) -> Result<Self> {
        config.validate()?;
        let settings = AdaptiveSettings {
            current_interval_ms: clamp_interval(config.initial_interval_ms, &config),
            sampling_rate: 1.0,
            metrics_mode: MetricsMode::Full,
        };
        let (latest, _) = watch::channel(None);

        Ok(Self {
            tracker: Mutex::new(PerformanceBudgetTracker::new(config.budget_ms, config.history_size)),
            state: Mutex::new(SchedulerState {
                collecting: false,
                queue: BackpressureQueue::new(config.max_queue_size, config.queue_timeout()),
                settings,
                sampling_credit: 0.0,
                stats: CollectionStats::default(),
                destroyed: false,
            }),
            config,
            clock: deps.clock,
            source: deps.source,
            sampler: deps.sampler,
            analytics: deps.analytics,
            breaker: Mutex::new(deps.breaker),
            timers: Mutex::new(TimerSet::new()),
            latest,
        })
    }

    /// Collects now, waits for the in-flight collection, or sheds the call.
    ///
    /// `Ok(None)` means "temporarily degraded": the breaker is open, the
    /// queue was full, the wait went stale or the scheduler was destroyed.
    /// `Err` only when the metrics source itself failed.
    pub async fn collect_metrics_with_backpressure(&self) -> Result<Option<MetricsCollection>> {
        let Some(mut admission) = self.admit() else {
            self.state.lock().stats.rejected_by_breaker += 1;
            debug!("Collection skipped, performance breaker open");
            return Ok(None);
        };

        let waiter = {
            let mut st = self.state.lock();
            if st.destroyed {
                return Ok(None);
            }
            if st.collecting {
                match st.queue.try_enqueue(self.clock.now()) {
                    Some(receiver) => Some(receiver),
                    None => {
                        st.stats.dropped += 1;
                        let queue_depth = st.queue.len();
                        drop(st);
                        warn!(queue_depth, "Collection queue full, request dropped");
                        self.analytics.track(TelemetryEvent::CollectionDropped { queue_depth });
                        return Ok(None);
                    }
                }
            } else {
                st.collecting = true;
                None
            }
        };

        let queued = waiter.is_some();
        if let Some(receiver) = waiter {
            let mut ticket = QueuedTicket { scheduler: self, receiver, settled: false };
            let outcome = (&mut ticket.receiver).await;
            ticket.settled = true;
            match outcome {
                Ok(Ticket::Proceed) => {}
                Ok(Ticket::Expired) | Err(_) => return Ok(None),
            }
        }

        let _slot = SlotGuard { scheduler: self };

        // The breaker may have tripped while we waited. A half-open holder is
        // already the one call the breaker lets through.
        if queued && !admission.holds_half_open {
            match self.admit() {
                Some(fresh) => admission = fresh,
                None => {
                    self.state.lock().stats.rejected_by_breaker += 1;
                    return Ok(None);
                }
            }
        }

        let outcome = self.collect_in_slot().await;
        admission.settle();
        outcome.map(Some)
    }

    fn admit(&self) -> Option<Admission<'_>> {
        let mut breaker = self.breaker.lock();
        if !breaker.can_execute() {
            return None;
        }
        Some(Admission {
            scheduler: self,
            holds_half_open: breaker.state() == CircuitState::HalfOpen,
        })
    }

    async fn collect_in_slot(&self) -> Result<MetricsCollection> {
        let start = self.clock.now();
        let load = self.sampler.snapshot();
        let (avg_before, budget) = {
            let tracker = self.tracker.lock();
            (tracker.average_ms(), tracker.budget_ms())
        };
        let ceiling = self.state.lock().settings.metrics_mode;
        let selected = select_mode(load.overall_load, avg_before, budget);
        let mode = selected.min(ceiling);

        let gathered = self.gather(mode).await;
        let overhead_ms = as_millis_f64(self.clock.now().saturating_duration_since(start));

        let (minimal, critical, extended) = match gathered {
            Ok(parts) => parts,
            Err(err) => {
                self.state.lock().stats.failed += 1;
                self.record_breaker_failure();
                let message = format!("{err:#}");
                error!(error = %message, ?mode, overhead_ms, "Metrics collection failed");
                return Err(VigilError::CollectionFailed(message));
            }
        };

        let violated = self.tracker.lock().record(PerformanceSample {
            timestamp_unix_ms: self.clock.unix_millis(),
            overhead_ms,
        });

        if violated {
            warn!(overhead_ms, budget_ms = budget, ?mode, "Performance budget exceeded");
            self.analytics.track(TelemetryEvent::BudgetViolation { overhead_ms, budget_ms: budget, mode });
            self.enable_degraded_mode();
            self.record_breaker_failure();
        } else {
            self.breaker.lock().record_success();
        }

        let avg_after = self.tracker.lock().average_ms();
        let (settings, relaxed) = {
            let mut st = self.state.lock();
            adapt_settings(&mut st.settings, &self.config, overhead_ms, load.overall_load, avg_after);

            // A clean cycle at the ceiling earns the next tier up.
            let mut relaxed = None;
            if !violated && mode == ceiling && avg_after < budget && ceiling < MetricsMode::Full {
                let from = st.settings.metrics_mode;
                st.settings.metrics_mode = from.relaxed();
                relaxed = Some((from, st.settings.metrics_mode));
            }

            st.stats.completed += 1;
            (st.settings.clone(), relaxed)
        };

        if let Some((from, to)) = relaxed {
            info!(?from, ?to, "Metrics mode relaxed");
            self.analytics.track(TelemetryEvent::ModeRecovered { from, to });
        }

        debug!(
            ?mode,
            overhead_ms,
            interval_ms = settings.current_interval_ms,
            sampling_rate = settings.sampling_rate,
            "Collection complete"
        );

        let collection = MetricsCollection {
            timestamp_unix_ms: self.clock.unix_millis(),
            mode,
            overhead_ms,
            sampling_rate: settings.sampling_rate,
            minimal,
            critical,
            extended,
        };
        self.latest.send_replace(Some(collection.clone()));
        Ok(collection)
    }

    async fn gather(
        &self,
        mode: MetricsMode,
    ) -> anyhow::Result<(MinimalMetrics, Option<CriticalMetrics>, Option<ExtendedMetrics>)> {
        let minimal = self.source.minimal().await?;
        let critical = match mode {
            MetricsMode::Minimal => None,
            MetricsMode::Critical | MetricsMode::Full => Some(self.source.critical().await?),
        };
        let extended = match mode {
            MetricsMode::Full => Some(self.source.extended().await?),
            _ => None,
        };
        Ok((minimal, critical, extended))
    }

    fn release_slot(&self) {
        let now = self.clock.now();
        let (granted, expired) = {
            let mut st = self.state.lock();
            let (granted, expired) = st.queue.grant_next(now);
            if granted.is_none() {
                st.collecting = false;
            }
            st.stats.expired += expired.len() as u64;
            (granted, expired)
        };

        for waited in expired {
            let waited_ms = waited.as_millis() as u64;
            warn!(waited_ms, "Queued collection request expired");
            self.analytics.track(TelemetryEvent::RequestExpired { waited_ms });
        }
        if let Some(grant) = granted {
            debug!(waited_ms = grant.waited.as_millis() as u64, "Collection slot handed to queued caller");
        }
    }

    fn record_breaker_failure(&self) {
        let (tripped, status) = {
            let mut breaker = self.breaker.lock();
            let tripped = breaker.record_failure();
            (tripped, breaker.status())
        };
        if tripped {
            self.analytics.track(TelemetryEvent::BreakerOpened {
                breaker: status.name,
                failures: status.failure_count,
            });
        }
    }

    /// Slowest interval, lowest sampling, cheapest tier.
    pub fn enable_degraded_mode(&self) {
        let (entered, interval_ms, sampling_rate) = {
            let mut st = self.state.lock();
            let entered = st.settings.metrics_mode != MetricsMode::Minimal;
            st.settings.current_interval_ms = self.config.max_interval_ms;
            st.settings.sampling_rate = clamp_rate(DEGRADED_SAMPLING_RATE, &self.config);
            st.settings.metrics_mode = MetricsMode::Minimal;
            (entered, st.settings.current_interval_ms, st.settings.sampling_rate)
        };

        if entered {
            warn!(interval_ms, sampling_rate, "Degraded mode enabled");
            self.analytics.track(TelemetryEvent::DegradedModeEntered { interval_ms, sampling_rate });
        }
    }

    /// Periodic housekeeping: expire stale waiters and, once the host is
    /// idle and overhead is back under budget, lift minimal mode to critical.
    /// Returns the new mode when it changed.
    pub fn run_adaptation_pass(&self) -> Option<MetricsMode> {
        let load = self.sampler.snapshot();
        let (avg, budget) = {
            let tracker = self.tracker.lock();
            (tracker.average_ms(), tracker.budget_ms())
        };

        let (recovered, expired) = {
            let mut st = self.state.lock();
            if st.destroyed {
                return None;
            }
            let now = self.clock.now();
            let expired = st.queue.expire_stale(now);
            st.stats.expired += expired.len() as u64;

            let recovered = st.settings.metrics_mode == MetricsMode::Minimal
                && load.overall_load < IDLE_LOAD
                && avg < budget;
            if recovered {
                st.settings.metrics_mode = MetricsMode::Critical;
            }
            (recovered, expired)
        };

        for waited in expired {
            self.analytics.track(TelemetryEvent::RequestExpired { waited_ms: waited.as_millis() as u64 });
        }

        if recovered {
            info!(load = load.overall_load, avg_overhead_ms = avg, "Recovered from minimal mode");
            self.analytics.track(TelemetryEvent::ModeRecovered {
                from: MetricsMode::Minimal,
                to: MetricsMode::Critical,
            });
            Some(MetricsMode::Critical)
        } else {
            None
        }
    }

    /// Deterministic sampling: each scheduled tick earns `sampling_rate`
    /// credit and a collection runs whenever a whole credit is available.
    pub fn admit_sample(&self) -> bool {
        let mut st = self.state.lock();
        st.sampling_credit += st.settings.sampling_rate;
        if st.sampling_credit >= 1.0 - 1e-9 {
            st.sampling_credit = (st.sampling_credit - 1.0).max(0.0);
            true
        } else {
            st.stats.skipped_by_sampling += 1;
            false
        }
    }

    /// Launches the collection loop and the adaptation pass.
    /// Needs a tokio runtime. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut timers = self.timers.lock();
        if timers.active() > 0 || self.state.lock().destroyed {
            return;
        }

        let weak = Arc::downgrade(self);
        timers.spawn(move |token| async move {
            loop {
                let delay = match weak.upgrade() {
                    Some(scheduler) => scheduler.current_interval(),
                    None => break,
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                if !scheduler.admit_sample() {
                    continue;
                }
                if let Err(err) = scheduler.collect_metrics_with_backpressure().await {
                    warn!(error = %err, "Scheduled collection failed");
                }
            }
        });

        let weak = Arc::downgrade(self);
        timers.spawn_periodic(self.config.adaptation_interval(), move || match weak.upgrade() {
            Some(scheduler) => {
                scheduler.run_adaptation_pass();
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        });

        info!(
            interval_ms = self.current_interval().as_millis() as u64,
            budget_ms = self.config.budget_ms,
            "Adaptive scheduler started"
        );
    }

    /// Stops timers, resolves every queued caller with `None` and clears
    /// history. Safe to call any number of times.
    pub fn destroy(&self) {
        let timers = self.timers.lock().clear();
        let resolved = {
            let mut st = self.state.lock();
            st.destroyed = true;
            st.sampling_credit = 0.0;
            st.queue.drain()
        };
        self.tracker.lock().clear();
        self.sampler.invalidate();
        self.latest.send_replace(None);
        info!(timers, resolved, "Adaptive scheduler destroyed");
    }

    pub fn adaptive_metrics(&self) -> AdaptiveMetrics {
        let system_load = self.sampler.snapshot();
        let overhead = self.overhead_stats();
        let breaker = self.breaker_status();
        let st = self.state.lock();
        AdaptiveMetrics {
            timestamp_unix_ms: self.clock.unix_millis(),
            system_load,
            overhead,
            settings: st.settings.clone(),
            breaker,
            collections: st.stats.clone(),
            queue_depth: st.queue.len(),
            collecting: st.collecting,
        }
    }

    pub fn is_system_under_pressure(&self) -> bool {
        let load = self.sampler.snapshot();
        load.overall_load > CRITICAL_LOAD
            || load.memory_level == MemoryPressure::Critical
            || self.tracker.lock().is_over_budget()
    }

    /// Latest successful collection, updated after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<Option<MetricsCollection>> {
        self.latest.subscribe()
    }

    pub fn settings(&self) -> AdaptiveSettings {
        self.state.lock().settings.clone()
    }

    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.state.lock().settings.current_interval_ms)
    }

    pub fn breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.lock().status()
    }

    pub fn overhead_stats(&self) -> OverheadStats {
        self.tracker.lock().stats()
    }

    pub fn system_load(&self) -> SystemLoadSnapshot {
        self.sampler.snapshot()
    }

    pub fn collection_stats(&self) -> CollectionStats {
        self.state.lock().stats.clone()
    }

    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_collecting(&self) -> bool {
        self.state.lock().collecting
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    pub fn active_timers(&self) -> usize {
        self.timers.lock().active()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}
