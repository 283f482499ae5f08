use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::types::{CriticalMetrics, ExtendedMetrics, MemoryUsage, MinimalMetrics};
use crate::kernel::probe::{HeapProbe, LoadProbe};
use crate::kernel::time::Clock;

/// Supplies the data behind each collection tier.
///
/// The scheduler awaits these calls while it holds the collection slot, so
/// their latency counts against the performance budget. Errors are host
/// errors: the scheduler records them against its breaker and hands them
/// back to the caller.
#[async_trait]
pub trait MetricsSource: Send + Sync + Debug {
    async fn minimal(&self) -> Result<MinimalMetrics>;
    async fn critical(&self) -> Result<CriticalMetrics>;
    async fn extended(&self) -> Result<ExtendedMetrics>;
}

/// Counter-backed source for the host process.
///
/// The host feeds it (`record_request`, `record_critical_error`,
/// `set_active_users`, `set_gauge`); every figure it reports is derived
/// from those counters and the probes. Nothing is synthesised.
#[derive(Debug)]
pub struct ProcessMetricsSource {
    clock: Arc<dyn Clock>,
    heap: Arc<dyn HeapProbe>,
    load: Arc<dyn LoadProbe>,
    started_at: Instant,

    requests: AtomicU64,
    errors: AtomicU64,
    critical_errors: AtomicU64,
    latency_total_us: AtomicU64,
    active_users: AtomicU64,
    peak_heap: AtomicU64,
    gauges: Mutex<BTreeMap<String, f64>>,
}

impl ProcessMetricsSource {
    pub fn new(clock: Arc<dyn Clock>, heap: Arc<dyn HeapProbe>, load: Arc<dyn LoadProbe>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            heap,
            load,
            started_at,
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            critical_errors: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            active_users: AtomicU64::new(0),
            peak_heap: AtomicU64::new(0),
            gauges: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record_request(&self, latency: Duration, ok: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us.fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_critical_error(&self) {
        self.critical_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_users(&self, users: u64) {
        self.active_users.store(users, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: impl Into<String>, value: f64) {
        self.gauges.lock().insert(name.into(), value);
    }

    fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    fn heap_used(&self) -> u64 {
        let used = self.heap.heap_used_bytes();
        self.peak_heap.fetch_max(used, Ordering::Relaxed);
        used
    }

    fn error_rate(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.errors.load(Ordering::Relaxed) as f64 / requests as f64
    }
}

#[async_trait]
impl MetricsSource for ProcessMetricsSource {
    async fn minimal(&self) -> Result<MinimalMetrics> {
        Ok(MinimalMetrics {
            error_rate: self.error_rate(),
            uptime_secs: self.uptime().as_secs_f64(),
            heap_used_bytes: self.heap_used(),
        })
    }

    async fn critical(&self) -> Result<CriticalMetrics> {
        let requests = self.requests.load(Ordering::Relaxed);
        let response_time_ms = if requests == 0 {
            0.0
        } else {
            self.latency_total_us.load(Ordering::Relaxed) as f64 / requests as f64 / 1000.0
        };
        let uptime = self.uptime().as_secs_f64();
        let throughput_per_sec = if uptime > 0.0 { requests as f64 / uptime } else { 0.0 };
        let used = self.heap_used();

        Ok(CriticalMetrics {
            response_time_ms,
            throughput_per_sec,
            active_users: self.active_users.load(Ordering::Relaxed),
            memory: MemoryUsage {
                used_bytes: used,
                peak_bytes: self.peak_heap.load(Ordering::Relaxed),
            },
            critical_errors: self.critical_errors.load(Ordering::Relaxed),
        })
    }

    async fn extended(&self) -> Result<ExtendedMetrics> {
        Ok(ExtendedMetrics {
            cpu_usage: self.load.sample().cpu_usage,
            total_requests: self.requests.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            custom: self.gauges.lock().clone(),
        })
    }
}
