//! Analytics events emitted by the kernel about itself.
//!
//! # INVARIANT
//! Telemetry is a write-only side channel. Nothing in the scheduler or the
//! registry reads it back to make a decision.
//!
//! # PRIVACY INVARIANT
//! Events carry labels, counts and durations only. Observed objects are
//! never captured, cloned or formatted into an event.

pub mod event;
pub mod metrics;
pub mod recorder;
pub mod sink;

pub use event::{RejectionReason, TelemetryEvent};
pub use metrics::{compute_snapshot, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
pub use sink::{AnalyticsSink, TracingSink};
