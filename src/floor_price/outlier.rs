//! Outlier suppression for lookback windows
//!
//! Removes wash trades and fat-finger prints before the window is used as an
//! empirical distribution. Filtering never reorders the window and never
//! returns an empty window for a non-empty input.

use super::config::OutlierPolicy;
use super::quantile::{median, SortedSample};

/// Consistency constant that scales MAD to a normal standard deviation.
const MAD_SCALE: f64 = 0.6745;

/// Result of filtering one window.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredWindow {
    pub values: Vec<f64>,
    /// Values dropped by the policy (0 when the fallback was used)
    pub removed: usize,
    /// The policy would have dropped everything, so the input was kept
    pub fell_back: bool,
}

impl OutlierPolicy {
    /// Filtered copy of `window`.
    pub fn filter(&self, window: &[f64]) -> Vec<f64> {
        self.filter_window(window).values
    }

    /// Filtered copy of `window` with bookkeeping for metrics.
    pub fn filter_window(&self, window: &[f64]) -> FilteredWindow {
        if window.len() < 2 {
            return FilteredWindow {
                values: window.to_vec(),
                removed: 0,
                fell_back: false,
            };
        }

        let kept: Vec<f64> = match *self {
            OutlierPolicy::Iqr { multiplier } => iqr_filter(window, multiplier),
            OutlierPolicy::Mad { threshold } => mad_filter(window, threshold),
            OutlierPolicy::Sigma { threshold } => sigma_filter(window, threshold),
            OutlierPolicy::None => window.to_vec(),
        };

        if kept.is_empty() {
            return FilteredWindow {
                values: window.to_vec(),
                removed: 0,
                fell_back: true,
            };
        }

        FilteredWindow {
            removed: window.len() - kept.len(),
            values: kept,
            fell_back: false,
        }
    }
}

fn iqr_filter(window: &[f64], multiplier: f64) -> Vec<f64> {
    let sample = SortedSample::new(window);
    let (Some(q1), Some(q3)) = (sample.quantile(0.25), sample.quantile(0.75)) else {
        return window.to_vec();
    };
    let spread = multiplier * (q3 - q1);
    let (lower, upper) = (q1 - spread, q3 + spread);

    window
        .iter()
        .copied()
        .filter(|&v| v >= lower && v <= upper)
        .collect()
}

fn mad_filter(window: &[f64], threshold: f64) -> Vec<f64> {
    let Some(center) = median(window) else {
        return window.to_vec();
    };
    let deviations: Vec<f64> = window.iter().map(|v| (v - center).abs()).collect();
    let Some(mad) = median(&deviations) else {
        return window.to_vec();
    };

    if mad == 0.0 {
        // Any deviation from a majority-constant window is infinitely far out
        return window.iter().copied().filter(|&v| v == center).collect();
    }

    window
        .iter()
        .copied()
        .filter(|&v| (MAD_SCALE * (v - center) / mad).abs() <= threshold)
        .collect()
}

fn sigma_filter(window: &[f64], threshold: f64) -> Vec<f64> {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev < 1e-10 {
        return window.to_vec();
    }

    window
        .iter()
        .copied()
        .filter(|&v| ((v - mean) / stddev).abs() <= threshold)
        .collect()
}
