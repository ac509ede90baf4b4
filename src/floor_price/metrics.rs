//! Prometheus Metrics for Floor Price Estimation

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{EstimateStatus, FloorEstimate};

/// Floor price metrics registry
///
/// Shared across engine shards; counters are lock-free, per-entity gauges sit
/// behind a single lock taken once per trade.
#[derive(Debug, Default)]
pub struct FloorPriceMetrics {
    /// Trades evaluated
    pub trades_total: AtomicU64,

    /// Trades that received a floor price
    pub estimates_total: AtomicU64,

    /// Trades skipped while the coverage window fills
    pub warming_up_total: AtomicU64,

    /// Trades with no prior history to estimate from
    pub empty_window_total: AtomicU64,

    /// Window values removed by outlier suppression
    pub outliers_removed_total: AtomicU64,

    /// Windows where suppression would have removed everything
    pub filter_fallback_total: AtomicU64,

    /// Trades rejected for arriving out of sequence order
    pub out_of_order_total: AtomicU64,

    /// Latest per-entity state
    pub entities: RwLock<BTreeMap<String, EntityGauges>>,
}

/// Most recent values reported for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityGauges {
    pub adjusted_pct: Option<f64>,
    pub coverage: Option<f64>,
    pub floor_price: Option<f64>,
    pub sequence_key: u64,
}

impl FloorPriceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluated trade
    pub fn record_estimate(&self, estimate: &FloorEstimate, outliers_removed: usize, fell_back: bool) {
        self.trades_total.fetch_add(1, Ordering::Relaxed);
        match estimate.status {
            EstimateStatus::Estimated => self.estimates_total.fetch_add(1, Ordering::Relaxed),
            EstimateStatus::WarmingUp => self.warming_up_total.fetch_add(1, Ordering::Relaxed),
            EstimateStatus::EmptyWindow => self.empty_window_total.fetch_add(1, Ordering::Relaxed),
        };
        self.outliers_removed_total
            .fetch_add(outliers_removed as u64, Ordering::Relaxed);
        if fell_back {
            self.filter_fallback_total.fetch_add(1, Ordering::Relaxed);
        }

        let mut entities = self.entities.write();
        let gauges = entities.entry(estimate.entity_id.clone()).or_default();
        gauges.sequence_key = estimate.sequence_key;
        gauges.coverage = estimate.coverage.or(gauges.coverage);
        gauges.adjusted_pct = estimate.adjusted_pct.or(gauges.adjusted_pct);
        gauges.floor_price = estimate.floor_price_estimate.or(gauges.floor_price);
    }

    /// Record a rejected out-of-order trade
    pub fn record_out_of_order(&self) {
        self.out_of_order_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trades(&self) -> u64 {
        self.trades_total.load(Ordering::Relaxed)
    }

    pub fn estimates(&self) -> u64 {
        self.estimates_total.load(Ordering::Relaxed)
    }

    pub fn entity(&self, entity_id: &str) -> Option<EntityGauges> {
        self.entities.read().get(entity_id).cloned()
    }

    /// Export all metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        for (name, help, counter) in [
            ("floor_price_trades_total", "Trades evaluated", &self.trades_total),
            ("floor_price_estimates_total", "Trades with a floor price estimate", &self.estimates_total),
            ("floor_price_warming_up_total", "Trades skipped while coverage window fills", &self.warming_up_total),
            ("floor_price_empty_window_total", "Trades with an empty lookback window", &self.empty_window_total),
            ("floor_price_outliers_removed_total", "Lookback values removed as outliers", &self.outliers_removed_total),
            ("floor_price_filter_fallback_total", "Windows kept unfiltered because filtering emptied them", &self.filter_fallback_total),
            ("floor_price_out_of_order_total", "Trades rejected for decreasing sequence key", &self.out_of_order_total),
        ] {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n\n", name, counter.load(Ordering::Relaxed)));
        }

        let entities = self.entities.read();

        output.push_str("# HELP floor_price_adjusted_pct Adjusted quantile probability\n");
        output.push_str("# TYPE floor_price_adjusted_pct gauge\n");
        for (entity, gauges) in entities.iter() {
            if let Some(pct) = gauges.adjusted_pct {
                output.push_str(&format!(
                    "floor_price_adjusted_pct{{entity=\"{}\"}} {:.6}\n",
                    entity, pct
                ));
            }
        }

        output.push_str("\n# HELP floor_price_coverage Trailing hit rate at the fixed target\n");
        output.push_str("# TYPE floor_price_coverage gauge\n");
        for (entity, gauges) in entities.iter() {
            if let Some(coverage) = gauges.coverage {
                output.push_str(&format!(
                    "floor_price_coverage{{entity=\"{}\"}} {:.6}\n",
                    entity, coverage
                ));
            }
        }

        output.push_str("\n# HELP floor_price_estimate Latest floor price estimate\n");
        output.push_str("# TYPE floor_price_estimate gauge\n");
        for (entity, gauges) in entities.iter() {
            if let Some(price) = gauges.floor_price {
                output.push_str(&format!(
                    "floor_price_estimate{{entity=\"{}\"}} {}\n",
                    entity, price
                ));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(status: EstimateStatus, floor: Option<f64>) -> FloorEstimate {
        FloorEstimate {
            entity_id: "bayc".into(),
            sequence_key: 7,
            price: 1.0,
            log_price: 0.0,
            window_len: 3,
            filtered_len: 3,
            fixed_quantile: Some(0.0),
            hit: true,
            coverage: floor.map(|_| 0.9),
            adjusted_pct: floor.map(|_| 0.02),
            log_price_adj: floor.map(f64::ln),
            floor_price_estimate: floor,
            status,
        }
    }

    #[test]
    fn test_counters_by_status() {
        let m = FloorPriceMetrics::new();
        m.record_estimate(&estimate(EstimateStatus::WarmingUp, None), 0, false);
        m.record_estimate(&estimate(EstimateStatus::Estimated, Some(1.5)), 2, true);
        m.record_out_of_order();

        assert_eq!(m.trades(), 2);
        assert_eq!(m.estimates(), 1);
        assert_eq!(m.warming_up_total.load(Ordering::Relaxed), 1);
        assert_eq!(m.outliers_removed_total.load(Ordering::Relaxed), 2);
        assert_eq!(m.filter_fallback_total.load(Ordering::Relaxed), 1);
        assert_eq!(m.out_of_order_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_gauges_keep_last_known_values() {
        let m = FloorPriceMetrics::new();
        m.record_estimate(&estimate(EstimateStatus::Estimated, Some(1.5)), 0, false);
        m.record_estimate(&estimate(EstimateStatus::EmptyWindow, None), 0, false);

        let gauges = m.entity("bayc").unwrap();
        assert_eq!(gauges.floor_price, Some(1.5));
        assert_eq!(gauges.adjusted_pct, Some(0.02));
    }

    #[test]
    fn test_metrics_prometheus_export() {
        let m = FloorPriceMetrics::new();
        m.record_estimate(&estimate(EstimateStatus::Estimated, Some(2.0)), 0, false);

        let output = m.to_prometheus();
        assert!(output.contains("floor_price_trades_total 1"));
        assert!(output.contains("floor_price_estimate{entity=\"bayc\"} 2"));
        assert!(output.contains("floor_price_adjusted_pct{entity=\"bayc\"} 0.020000"));
    }
}
