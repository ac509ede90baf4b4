//! Run summary for a batch of floor price estimates

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::FloorPriceConfig;
use super::types::{EstimateStatus, FloorEstimate};

/// Per-entity outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub trades: usize,
    pub estimated: usize,
    pub warming_up: usize,
    pub empty_window: usize,
    /// Fraction of estimated trades that printed at or above their floor
    pub above_floor_rate: Option<f64>,
    pub final_adjusted_pct: Option<f64>,
    pub final_coverage: Option<f64>,
    pub last_floor_price: Option<f64>,
    pub last_sequence_key: Option<u64>,
}

/// Aggregate of one estimator run, written as JSON next to the results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub config: FloorPriceConfig,
    pub total_trades: usize,
    pub total_estimated: usize,
    pub entities: BTreeMap<String, EntitySummary>,
}

impl RunSummary {
    pub fn from_estimates(config: &FloorPriceConfig, estimates: &[FloorEstimate]) -> Self {
        let mut entities: BTreeMap<String, EntitySummary> = BTreeMap::new();
        let mut above_floor: BTreeMap<&str, usize> = BTreeMap::new();

        for estimate in estimates {
            let summary = entities.entry(estimate.entity_id.clone()).or_default();
            summary.trades += 1;
            summary.last_sequence_key = Some(estimate.sequence_key);
            match estimate.status {
                EstimateStatus::Estimated => summary.estimated += 1,
                EstimateStatus::WarmingUp => summary.warming_up += 1,
                EstimateStatus::EmptyWindow => summary.empty_window += 1,
            }

            if let Some(floor) = estimate.floor_price_estimate {
                summary.last_floor_price = Some(floor);
                if estimate.price >= floor {
                    *above_floor.entry(estimate.entity_id.as_str()).or_default() += 1;
                }
            }
            if estimate.adjusted_pct.is_some() {
                summary.final_adjusted_pct = estimate.adjusted_pct;
            }
            if estimate.coverage.is_some() {
                summary.final_coverage = estimate.coverage;
            }
        }

        for (entity, summary) in entities.iter_mut() {
            if summary.estimated > 0 {
                let above = above_floor.get(entity.as_str()).copied().unwrap_or(0);
                summary.above_floor_rate = Some(above as f64 / summary.estimated as f64);
            }
        }

        Self {
            generated_at: Utc::now(),
            config: config.clone(),
            total_trades: estimates.len(),
            total_estimated: entities.values().map(|s| s.estimated).sum(),
            entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entity: &str, seq: u64, price: f64, floor: Option<f64>, status: EstimateStatus) -> FloorEstimate {
        FloorEstimate {
            entity_id: entity.into(),
            sequence_key: seq,
            price,
            log_price: price.ln(),
            window_len: 0,
            filtered_len: 0,
            fixed_quantile: None,
            hit: false,
            coverage: floor.map(|_| 0.5),
            adjusted_pct: floor.map(|_| 0.04),
            log_price_adj: floor.map(f64::ln),
            floor_price_estimate: floor,
            status,
        }
    }

    #[test]
    fn test_summary_counts() {
        let estimates = vec![
            row("a", 1, 2.0, None, EstimateStatus::EmptyWindow),
            row("a", 2, 2.0, None, EstimateStatus::WarmingUp),
            row("a", 3, 2.0, Some(1.5), EstimateStatus::Estimated),
            row("a", 4, 1.0, Some(1.5), EstimateStatus::Estimated),
            row("b", 1, 9.0, None, EstimateStatus::EmptyWindow),
        ];
        let summary = RunSummary::from_estimates(&FloorPriceConfig::default(), &estimates);

        assert_eq!(summary.total_trades, 5);
        assert_eq!(summary.total_estimated, 2);

        let a = &summary.entities["a"];
        assert_eq!((a.trades, a.estimated, a.warming_up, a.empty_window), (4, 2, 1, 1));
        assert_eq!(a.above_floor_rate, Some(0.5));
        assert_eq!(a.last_floor_price, Some(1.5));
        assert_eq!(a.final_adjusted_pct, Some(0.04));
        assert_eq!(a.last_sequence_key, Some(4));

        let b = &summary.entities["b"];
        assert_eq!(b.above_floor_rate, None);
        assert_eq!(b.last_floor_price, None);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = RunSummary::from_estimates(&FloorPriceConfig::default(), &[]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_trades"], 0);
        assert_eq!(json["config"]["lookback"], 140);
    }
}
