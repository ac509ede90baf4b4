//! Trade and estimate records

use serde::{Deserialize, Serialize};

/// Identifier of the traded collection an estimate belongs to.
pub type EntityId = String;

/// A single positive-price trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entity_id: EntityId,
    /// Monotonic ordering key within the entity (block height)
    pub sequence_key: u64,
    pub price: f64,
    pub log_price: f64,
}

impl Trade {
    /// Build a trade, or `None` when the price is not finite and positive.
    pub fn new(entity_id: impl Into<EntityId>, sequence_key: u64, price: f64) -> Option<Self> {
        if !(price.is_finite() && price > 0.0) {
            return None;
        }
        Some(Self {
            entity_id: entity_id.into(),
            sequence_key,
            price,
            log_price: price.ln(),
        })
    }
}

/// Why a trade did or did not receive a floor price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Estimated,
    /// Fewer than `backtest` coverage samples so far
    WarmingUp,
    /// No prior trades to take a quantile of
    EmptyWindow,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateStatus::Estimated => "estimated",
            EstimateStatus::WarmingUp => "warming_up",
            EstimateStatus::EmptyWindow => "empty_window",
        }
    }
}

/// A trade augmented with the estimator's intermediate values and output.
///
/// Field order is the CSV column order of the results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorEstimate {
    pub entity_id: EntityId,
    pub sequence_key: u64,
    pub price: f64,
    pub log_price: f64,
    /// Prior trades in the lookback window
    pub window_len: usize,
    /// Window size after outlier suppression
    pub filtered_len: usize,
    /// Quantile of the filtered window at the configured target
    pub fixed_quantile: Option<f64>,
    /// `log_price <= fixed_quantile` (a missing quantile is a miss)
    pub hit: bool,
    /// Trailing hit rate, present once the coverage window is full
    pub coverage: Option<f64>,
    /// Controller output used for this trade
    pub adjusted_pct: Option<f64>,
    pub log_price_adj: Option<f64>,
    pub floor_price_estimate: Option<f64>,
    pub status: EstimateStatus,
}

impl FloorEstimate {
    pub fn is_estimated(&self) -> bool {
        self.status == EstimateStatus::Estimated
    }
}
