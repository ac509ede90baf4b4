//! Causal lookback windows
//!
//! The window for the trade at position `i` holds the log-prices of the
//! `min(i, lookback)` trades before it, oldest first. It never contains the
//! trade itself or anything after it.

use std::collections::VecDeque;

/// Batch form: the window for position `index` of an entity's replayed history.
pub fn lookback_slice(log_prices: &[f64], index: usize, lookback: usize) -> &[f64] {
    let end = index.min(log_prices.len());
    &log_prices[end.saturating_sub(lookback)..end]
}

/// Streaming form: fixed-capacity ring of the most recent log-prices.
///
/// Callers read the window for a trade before pushing that trade's price.
#[derive(Debug, Clone)]
pub struct LookbackWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LookbackWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, log_price: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(log_price);
    }

    /// Contiguous view of the window, oldest first.
    pub fn as_slice(&mut self) -> &[f64] {
        self.samples.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }
}
