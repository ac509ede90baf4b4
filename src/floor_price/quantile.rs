//! Interpolated quantiles over a window of log-prices.
//!
//! Uses the linear interpolation between order statistics that numpy calls
//! `linear`: with `h = p * (n - 1)` the result is
//! `v[floor(h)] + (h - floor(h)) * (v[ceil(h)] - v[floor(h)])`.

/// Values sorted once so several quantiles can be read cheaply.
#[derive(Debug, Clone, Default)]
pub struct SortedSample {
    sorted: Vec<f64>,
}

impl SortedSample {
    pub fn new(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self { sorted }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Quantile at probability `p`, `None` for an empty sample or `p` outside [0, 1].
    pub fn quantile(&self, p: f64) -> Option<f64> {
        quantile_sorted(&self.sorted, p)
    }
}

/// Quantile of unsorted `values` at probability `p`.
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    SortedSample::new(values).quantile(p)
}

/// Quantile of already ascending-sorted values.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }

    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (h.ceil() as usize).min(sorted.len() - 1);
    if lo == hi {
        return Some(sorted[lo]);
    }

    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Median of unsorted values.
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}
