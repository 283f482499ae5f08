use std::time::Duration;

use anyhow::Context;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use vigil::{Supervisor, SupervisorDeps, VigilConfig};

const REPORT_CADENCE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => VigilConfig::load(&path).with_context(|| format!("loading config from {path}"))?,
        None => VigilConfig::default(),
    };

    let supervisor = Supervisor::new(config, SupervisorDeps::host()).context("building supervisor")?;
    supervisor.start();
    tracing::info!("Vigil active. Press Ctrl+C to stop.");

    let mut cadence = tokio::time::interval(REPORT_CADENCE);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick fires immediately; nothing to report yet.
    cadence.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
            _ = cadence.tick() => {
                let metrics = supervisor.scheduler().adaptive_metrics();
                let report = supervisor.registry().detect_leaks();
                tracing::info!(
                    mode = ?metrics.settings.metrics_mode,
                    interval_ms = metrics.settings.current_interval_ms,
                    sampling_rate = metrics.settings.sampling_rate,
                    load = metrics.system_load.overall_load,
                    avg_overhead_ms = metrics.overhead.average_ms,
                    breaker = ?metrics.breaker.state,
                    completed = metrics.collections.completed,
                    leaks = report.total_leaks,
                    observations = report.observations,
                    "Adaptive metrics"
                );
            }
        }
    }

    supervisor.destroy();
    Ok(())
}
