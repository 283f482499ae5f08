#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use vigil::config::{BreakerConfig, LoadConfig, PressureConfig, RegistryConfig, SchedulerConfig};
use vigil::kernel::telemetry::TelemetryRecorder;
use vigil::kernel::{CircuitBreaker, Clock, ManualProbe};
use vigil::memory::{MemoryPressureClassifier, ObservationRegistry, RegistryDeps};
use vigil::monitor::{
    AdaptiveScheduler, CriticalMetrics, ExtendedMetrics, MetricsSource, MinimalMetrics, SchedulerDeps,
    SystemLoadSampler,
};

/// Source whose cost and failure are set by the test. The cost is paid in
/// `minimal`, so every tier pays it exactly once per cycle.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    cost: Mutex<Duration>,
    failing: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn with_cost(cost: Duration) -> Arc<Self> {
        let source = Self::default();
        *source.cost.lock() = cost;
        Arc::new(source)
    }

    pub fn set_cost(&self, cost: Duration) {
        *self.cost.lock() = cost;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn minimal(&self) -> anyhow::Result<MinimalMetrics> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let cost = *self.cost.lock();
        if !cost.is_zero() {
            tokio::time::sleep(cost).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("source unavailable");
        }
        Ok(MinimalMetrics { error_rate: 0.0, uptime_secs: 1.0, heap_used_bytes: 0 })
    }

    async fn critical(&self) -> anyhow::Result<CriticalMetrics> {
        Ok(CriticalMetrics::default())
    }

    async fn extended(&self) -> anyhow::Result<ExtendedMetrics> {
        Ok(ExtendedMetrics::default())
    }
}

pub fn scheduler(
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    probe: &Arc<ManualProbe>,
    source: Arc<ScriptedSource>,
    recorder: &Arc<TelemetryRecorder>,
) -> Arc<AdaptiveScheduler> {
    let classifier = MemoryPressureClassifier::new(&PressureConfig::default(), probe.clone());
    let sampler = SystemLoadSampler::new(&LoadConfig::default(), probe.clone(), classifier, clock.clone());
    Arc::new(AdaptiveScheduler::new(
        config,
        SchedulerDeps {
            breaker: CircuitBreaker::new("performance", &BreakerConfig::performance(), clock.clone()),
            clock,
            source,
            sampler,
            analytics: recorder.clone(),
        },
    )
    .unwrap())
}

pub fn registry(
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    probe: &Arc<ManualProbe>,
    recorder: &Arc<TelemetryRecorder>,
) -> Arc<ObservationRegistry> {
    Arc::new(ObservationRegistry::new(
        config,
        RegistryDeps {
            breaker: CircuitBreaker::new("memory", &BreakerConfig::memory(), clock.clone()),
            clock,
            classifier: MemoryPressureClassifier::new(&PressureConfig::default(), probe.clone()),
            analytics: recorder.clone(),
        },
    ))
}
