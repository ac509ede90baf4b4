//! Coverage tracking
//!
//! Counts how often trades printed at or below the fixed-target quantile over
//! the last `backtest` trades. The resulting hit rate is the feedback signal
//! for the quantile controller.

use std::collections::VecDeque;

/// Trailing hit-rate over a fixed number of trades.
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    hits: VecDeque<bool>,
    capacity: usize,
    hit_count: usize,
}

impl CoverageTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            hits: VecDeque::with_capacity(capacity),
            capacity,
            hit_count: 0,
        }
    }

    /// Record one hit indicator, evicting the oldest once full.
    #[inline]
    pub fn record(&mut self, hit: bool) {
        if self.capacity == 0 {
            return;
        }
        if self.hits.len() >= self.capacity {
            if let Some(true) = self.hits.pop_front() {
                self.hit_count -= 1;
            }
        }
        self.hits.push_back(hit);
        if hit {
            self.hit_count += 1;
        }
    }

    /// Hit rate over the samples seen so far, `None` before the first one.
    pub fn coverage(&self) -> Option<f64> {
        if self.hits.is_empty() {
            return None;
        }
        Some(self.hit_count as f64 / self.hits.len() as f64)
    }

    /// Hit rate once a full window has been observed.
    pub fn actionable_coverage(&self) -> Option<f64> {
        if self.is_full() {
            self.coverage()
        } else {
            None
        }
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.hits.len() == self.capacity
    }

    pub fn count(&self) -> usize {
        self.hits.len()
    }

    pub fn hits(&self) -> usize {
        self.hit_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
