//! Floor price orchestration
//!
//! Wires the per-trade pipeline together:
//!
//! ```text
//! lookback window -> outlier filter -> quantile @ pct_target -> hit -> coverage
//!                                   \-> quantile @ adjusted pct <- controller <-/
//! ```
//!
//! Two drivers share the same per-trade evaluation so they agree bit for bit:
//! [`FloorPriceEngine`] consumes trades one at a time and keeps a context per
//! entity, [`estimate_batch`] replays complete histories with one rayon task
//! per entity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::config::{ConfigError, CoverageAlignment, FloorPriceConfig};
use super::controller::AdaptiveQuantileController;
use super::coverage::CoverageTracker;
use super::metrics::FloorPriceMetrics;
use super::quantile::SortedSample;
use super::types::{EntityId, EstimateStatus, FloorEstimate, Trade};
use super::window::{lookback_slice, LookbackWindow};

/// Errors raised while consuming a trade stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A trade's sequence key is lower than the previous one for its entity
    OutOfOrder {
        entity_id: EntityId,
        previous: u64,
        received: u64,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrder {
                entity_id,
                previous,
                received,
            } => write!(
                f,
                "out-of-order trade for {}: sequence key {} after {}",
                entity_id, received, previous
            ),
        }
    }
}

impl std::error::Error for EngineError {}

/// Coverage and controller state that advances once per trade.
#[derive(Debug, Clone)]
struct FeedbackState {
    coverage: CoverageTracker,
    controller: AdaptiveQuantileController,
}

impl FeedbackState {
    fn new(config: &FloorPriceConfig) -> Self {
        Self {
            coverage: CoverageTracker::new(config.backtest),
            controller: AdaptiveQuantileController::new(config),
        }
    }

    /// Evaluate `trade` against the window of log-prices that preceded it.
    fn evaluate(
        &mut self,
        window: &[f64],
        trade: &Trade,
        config: &FloorPriceConfig,
        metrics: Option<&FloorPriceMetrics>,
    ) -> FloorEstimate {
        let filtered = config.outlier.filter_window(window);
        let sample = SortedSample::new(&filtered.values);

        let fixed_quantile = sample.quantile(config.pct_target);
        let hit = fixed_quantile.map_or(false, |q| trade.log_price <= q);

        // lagged coverage never sees this trade's own hit
        let coverage = match config.coverage_alignment {
            CoverageAlignment::Lagged => {
                let coverage = self.coverage.actionable_coverage();
                self.coverage.record(hit);
                coverage
            }
            CoverageAlignment::Inclusive => {
                self.coverage.record(hit);
                self.coverage.actionable_coverage()
            }
        };

        let adjusted_pct = coverage.map(|c| self.controller.update(c));
        let log_price_adj = adjusted_pct.and_then(|pct| sample.quantile(pct));

        let status = if sample.is_empty() {
            EstimateStatus::EmptyWindow
        } else if adjusted_pct.is_none() {
            EstimateStatus::WarmingUp
        } else {
            EstimateStatus::Estimated
        };

        let estimate = FloorEstimate {
            entity_id: trade.entity_id.clone(),
            sequence_key: trade.sequence_key,
            price: trade.price,
            log_price: trade.log_price,
            window_len: window.len(),
            filtered_len: filtered.values.len(),
            fixed_quantile,
            hit,
            coverage,
            adjusted_pct,
            log_price_adj,
            floor_price_estimate: log_price_adj.map(f64::exp),
            status,
        };

        if let Some(metrics) = metrics {
            metrics.record_estimate(&estimate, filtered.removed, filtered.fell_back);
        }

        estimate
    }
}

/// Everything the estimator remembers about one entity.
#[derive(Debug, Clone)]
pub struct EntityContext {
    lookback: LookbackWindow,
    feedback: FeedbackState,
    last_sequence: Option<u64>,
    trades_seen: u64,
    estimates: u64,
}

impl EntityContext {
    pub fn new(config: &FloorPriceConfig) -> Self {
        Self {
            lookback: LookbackWindow::new(config.lookback),
            feedback: FeedbackState::new(config),
            last_sequence: None,
            trades_seen: 0,
            estimates: 0,
        }
    }

    /// Evaluate one trade, then admit it into the lookback window.
    pub fn observe(
        &mut self,
        trade: &Trade,
        config: &FloorPriceConfig,
        metrics: Option<&FloorPriceMetrics>,
    ) -> Result<FloorEstimate, EngineError> {
        if let Some(previous) = self.last_sequence {
            if trade.sequence_key < previous {
                return Err(EngineError::OutOfOrder {
                    entity_id: trade.entity_id.clone(),
                    previous,
                    received: trade.sequence_key,
                });
            }
        }

        let was_full = self.feedback.coverage.is_full();
        let window = self.lookback.as_slice();
        let estimate = self.feedback.evaluate(window, trade, config, metrics);
        self.lookback.push(trade.log_price);

        if !was_full && self.feedback.coverage.is_full() {
            debug!(
                entity = %trade.entity_id,
                sequence_key = trade.sequence_key,
                lookback = self.lookback.capacity(),
                backtest = self.feedback.coverage.capacity(),
                coverage = ?self.coverage(),
                adjusted_pct = self.adjusted_pct(),
                "coverage window full, floor estimates active"
            );
        }

        self.last_sequence = Some(trade.sequence_key);
        self.trades_seen += 1;
        if estimate.is_estimated() {
            self.estimates += 1;
        }
        Ok(estimate)
    }

    pub fn trades_seen(&self) -> u64 {
        self.trades_seen
    }

    pub fn estimates(&self) -> u64 {
        self.estimates
    }

    /// Adjusted quantile currently held by the controller.
    pub fn adjusted_pct(&self) -> f64 {
        self.feedback.controller.current()
    }

    /// Trailing hit rate, whether or not the window is full yet.
    pub fn coverage(&self) -> Option<f64> {
        self.feedback.coverage.coverage()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn window_len(&self) -> usize {
        self.lookback.len()
    }
}

/// Incremental estimator over an interleaved multi-entity trade stream.
pub struct FloorPriceEngine {
    config: Arc<FloorPriceConfig>,
    entities: HashMap<EntityId, EntityContext>,
    metrics: Arc<FloorPriceMetrics>,
}

impl FloorPriceEngine {
    pub fn new(config: FloorPriceConfig) -> Result<Self, ConfigError> {
        Self::with_metrics(Arc::new(config), Arc::new(FloorPriceMetrics::new()))
    }

    /// Engine reporting into a shared metrics registry.
    pub fn with_metrics(
        config: Arc<FloorPriceConfig>,
        metrics: Arc<FloorPriceMetrics>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            entities: HashMap::new(),
            metrics,
        })
    }

    /// Evaluate the next trade of its entity.
    pub fn observe(&mut self, trade: &Trade) -> Result<FloorEstimate, EngineError> {
        let config = &self.config;
        let context = self
            .entities
            .entry(trade.entity_id.clone())
            .or_insert_with(|| EntityContext::new(config));

        context
            .observe(trade, config, Some(self.metrics.as_ref()))
            .map_err(|e| {
                warn!("{}", e);
                self.metrics.record_out_of_order();
                e
            })
    }

    pub fn entity(&self, entity_id: &str) -> Option<&EntityContext> {
        self.entities.get(entity_id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn config(&self) -> &FloorPriceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<FloorPriceMetrics> {
        &self.metrics
    }
}

/// Replay complete histories, one parallel task per entity.
///
/// Trades are grouped by entity and stably sorted by sequence key, so ties keep
/// their input order. Output is ordered by entity id, then sequence key.
pub fn estimate_batch(
    config: &FloorPriceConfig,
    trades: &[Trade],
) -> Result<Vec<FloorEstimate>, ConfigError> {
    estimate_batch_with_metrics(config, trades, None)
}

pub fn estimate_batch_with_metrics(
    config: &FloorPriceConfig,
    trades: &[Trade],
    metrics: Option<&FloorPriceMetrics>,
) -> Result<Vec<FloorEstimate>, ConfigError> {
    config.validate()?;

    let mut groups: BTreeMap<&str, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        groups.entry(trade.entity_id.as_str()).or_default().push(trade);
    }
    for history in groups.values_mut() {
        history.sort_by_key(|t| t.sequence_key);
    }

    info!(
        "Replaying {} trades across {} entities",
        trades.len(),
        groups.len()
    );

    let groups: Vec<(&str, Vec<&Trade>)> = groups.into_iter().collect();
    let per_entity: Vec<Vec<FloorEstimate>> = groups
        .into_par_iter()
        .map(|(entity, history)| {
            let estimates = replay_entity(config, &history, metrics);
            debug!(
                entity,
                trades = history.len(),
                estimated = estimates.iter().filter(|e| e.is_estimated()).count(),
                "entity replay complete"
            );
            estimates
        })
        .collect();

    Ok(per_entity.into_iter().flatten().collect())
}

/// Replay one entity's sorted history.
fn replay_entity(
    config: &FloorPriceConfig,
    history: &[&Trade],
    metrics: Option<&FloorPriceMetrics>,
) -> Vec<FloorEstimate> {
    let log_prices: Vec<f64> = history.iter().map(|t| t.log_price).collect();
    let mut feedback = FeedbackState::new(config);

    history
        .iter()
        .enumerate()
        .map(|(i, trade)| {
            let window = lookback_slice(&log_prices, i, config.lookback);
            feedback.evaluate(window, trade, config, metrics)
        })
        .collect()
}
