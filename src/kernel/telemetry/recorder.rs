use std::collections::VecDeque;

use parking_lot::Mutex;

use super::event::TelemetryEvent;
use super::metrics::{compute_snapshot, TelemetrySnapshot};
use super::sink::AnalyticsSink;

const MAX_EVENTS: usize = 10_000;

/// Bounded in-memory analytics sink. Oldest events fall off first.
#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: Mutex<VecDeque<TelemetryEvent>>,
    capacity: usize,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(MAX_EVENTS))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, event: TelemetryEvent) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.buffer.lock())
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.buffer.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsSink for TelemetryRecorder {
    fn track(&self, event: TelemetryEvent) {
        self.record(event);
    }
}
