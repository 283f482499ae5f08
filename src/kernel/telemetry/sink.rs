use std::fmt::Debug;

use tracing::{info, warn};

use super::event::TelemetryEvent;

/// Where analytics events go. Implementations must not block.
pub trait AnalyticsSink: Send + Sync + Debug {
    fn track(&self, event: TelemetryEvent);
}

/// Forwards events to the `tracing` pipeline as structured records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn track(&self, event: TelemetryEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "vigil::analytics", event = event.name(), %payload, "analytics"),
            Err(err) => warn!(
                target: "vigil::analytics",
                event = event.name(),
                error = %err,
                "Analytics event could not be serialized"
            ),
        }
    }
}
