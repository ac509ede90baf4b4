//! Partitioned streaming pipeline
//!
//! Entities are routed to a fixed set of worker tasks by a stable hash of the
//! entity id. Each worker owns a [`FloorPriceEngine`] for its shard, so
//! per-entity state is never shared and never locked; only the metrics
//! registry is common to all shards.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{ConfigError, FloorPriceConfig};
use super::engine::{EngineError, FloorPriceEngine};
use super::metrics::FloorPriceMetrics;
use super::types::{FloorEstimate, Trade};

/// Outcome for the trade submitted at position `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEstimate {
    pub index: u64,
    pub result: Result<FloorEstimate, EngineError>,
}

/// Shard owning `entity_id` among `shards` workers.
pub fn shard_for(entity_id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    entity_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// Running pipeline: submit trades, then `finish` to collect results.
pub struct FloorPricePipeline {
    shards: Vec<mpsc::Sender<(u64, Trade)>>,
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<Vec<IndexedEstimate>>,
    metrics: Arc<FloorPriceMetrics>,
    next_index: u64,
}

impl FloorPricePipeline {
    /// Start `workers` shard tasks with bounded queues of `capacity` trades.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: FloorPriceConfig, workers: usize, capacity: usize) -> Result<Self, ConfigError> {
        Self::spawn_with_metrics(config, workers, capacity, Arc::new(FloorPriceMetrics::new()))
    }

    pub fn spawn_with_metrics(
        config: FloorPriceConfig,
        workers: usize,
        capacity: usize,
        metrics: Arc<FloorPriceMetrics>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let workers = workers.max(1);
        let capacity = capacity.max(1);

        let (result_tx, mut result_rx) = mpsc::channel::<IndexedEstimate>(capacity);
        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        });

        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for shard in 0..workers {
            let (tx, rx) = mpsc::channel::<(u64, Trade)>(capacity);
            let engine = FloorPriceEngine::with_metrics(config.clone(), metrics.clone())?;
            handles.push(tokio::spawn(run_shard(shard, engine, rx, result_tx.clone())));
            shards.push(tx);
        }

        info!("Floor price pipeline started with {} shards", workers);

        Ok(Self {
            shards,
            workers: handles,
            collector,
            metrics,
            next_index: 0,
        })
    }

    /// Queue a trade; waits while its shard is saturated. Returns the trade's index.
    pub async fn submit(&mut self, trade: Trade) -> Result<u64> {
        let index = self.next_index;
        let shard = shard_for(&trade.entity_id, self.shards.len());
        self.shards[shard]
            .send((index, trade))
            .await
            .map_err(|_| anyhow!("floor price shard {} stopped", shard))?;
        self.next_index += 1;
        Ok(index)
    }

    pub fn metrics(&self) -> &Arc<FloorPriceMetrics> {
        &self.metrics
    }

    /// Close the input, wait for every shard, and return results in submission order.
    pub async fn finish(self) -> Result<Vec<IndexedEstimate>> {
        drop(self.shards);
        for worker in self.workers {
            worker.await?;
        }
        let mut results = self.collector.await?;
        results.sort_by_key(|r| r.index);
        info!("Floor price pipeline finished: {} results", results.len());
        Ok(results)
    }
}

async fn run_shard(
    shard: usize,
    mut engine: FloorPriceEngine,
    mut trades: mpsc::Receiver<(u64, Trade)>,
    results: mpsc::Sender<IndexedEstimate>,
) {
    while let Some((index, trade)) = trades.recv().await {
        let result = engine.observe(&trade);
        if results.send(IndexedEstimate { index, result }).await.is_err() {
            warn!(shard, "result channel closed, stopping shard");
            break;
        }
    }
    debug!(shard, entities = engine.entity_count(), "shard drained");
}
