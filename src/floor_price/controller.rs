//! Adaptive quantile controller
//!
//! Proportional correction of the quantile used for the floor estimate:
//!
//! ```text
//! error   = base - coverage
//! new_pct = clamp(base + speed * error, min, max)
//! ```
//!
//! In the default memoryless mode `base` is the configured target on every
//! step, so the output depends only on the latest coverage sample.

use tracing::trace;

use super::config::{ControllerMode, FloorPriceConfig};

/// `min(max(x, lo), hi)`.
#[inline]
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// One proportional correction step from `base_pct`.
pub fn step(base_pct: f64, observed_coverage: f64, speed: f64, min_pct: f64, max_pct: f64) -> f64 {
    let error = base_pct - observed_coverage;
    clamp(base_pct + speed * error, min_pct, max_pct)
}

/// Per-entity controller state.
#[derive(Debug, Clone)]
pub struct AdaptiveQuantileController {
    target: f64,
    min_pct: f64,
    max_pct: f64,
    speed: f64,
    mode: ControllerMode,
    current: f64,
    steps: u64,
}

impl AdaptiveQuantileController {
    pub fn new(config: &FloorPriceConfig) -> Self {
        Self {
            target: config.pct_target,
            min_pct: config.pct_target_min,
            max_pct: config.pct_target_max,
            speed: config.speed,
            mode: config.controller_mode,
            current: config.pct_target,
            steps: 0,
        }
    }

    /// Fold in one coverage sample and return the new adjusted quantile.
    pub fn update(&mut self, observed_coverage: f64) -> f64 {
        let next = match self.mode {
            ControllerMode::Memoryless => step(
                self.target,
                observed_coverage,
                self.speed,
                self.min_pct,
                self.max_pct,
            ),
            ControllerMode::Integrating => {
                let error = self.target - observed_coverage;
                clamp(self.current + self.speed * error, self.min_pct, self.max_pct)
            }
        };

        trace!(
            coverage = observed_coverage,
            previous = self.current,
            next,
            "quantile controller step"
        );

        self.current = next;
        self.steps += 1;
        next
    }

    /// Adjusted quantile currently in force (the target before any update).
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}
