use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::types::OverheadStats;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp_unix_ms: u64,
    pub overhead_ms: f64,
}

/// Rolling window of measured overhead against a fixed budget.
#[derive(Debug, Clone)]
pub struct PerformanceBudgetTracker {
    budget_ms: f64,
    capacity: usize,
    history: VecDeque<PerformanceSample>,
    violations: u64,
}

impl PerformanceBudgetTracker {
    pub fn new(budget_ms: f64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            budget_ms,
            capacity,
            history: VecDeque::with_capacity(capacity),
            violations: 0,
        }
    }

    /// Appends a sample, dropping the oldest past capacity.
    /// Returns `true` when the sample broke the budget.
    pub fn record(&mut self, sample: PerformanceSample) -> bool {
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        let violated = self.exceeds_budget(sample.overhead_ms);
        if violated {
            self.violations += 1;
        }
        violated
    }

    pub fn exceeds_budget(&self, overhead_ms: f64) -> bool {
        overhead_ms > self.budget_ms
    }

    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }

    /// Zero when no sample has been recorded.
    pub fn average_ms(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(|s| s.overhead_ms).sum::<f64>() / self.history.len() as f64
    }

    pub fn p95_ms(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.history.iter().map(|s| s.overhead_ms).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
    }

    pub fn max_ms(&self) -> f64 {
        self.history.iter().map(|s| s.overhead_ms).fold(0.0, f64::max)
    }

    pub fn is_over_budget(&self) -> bool {
        self.exceeds_budget(self.average_ms())
    }

    pub fn stats(&self) -> OverheadStats {
        OverheadStats {
            budget_ms: self.budget_ms,
            average_ms: self.average_ms(),
            p95_ms: self.p95_ms(),
            max_ms: self.max_ms(),
            samples: self.history.len(),
            violations: self.violations,
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.violations = 0;
    }
}
