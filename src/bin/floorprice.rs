//! Floor Price Estimator
//!
//! Reads NFT trades from CSV, estimates an adaptive floor price for every
//! trade, and writes the augmented rows back to CSV.
//!
//! Usage:
//!   floorprice --input nft_trades_v2.csv
//!   floorprice --input trades.csv --contract 0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d
//!   floorprice --input trades.csv --config floorprice.toml --mode stream --workers 8
//!
//! Environment Variables:
//!   FLOORPRICE_INPUT - Trades CSV path
//!   FLOORPRICE_CONFIG - Path to TOML config file
//!   FLOORPRICE_CONTRACT - Contract address filter
//!   RUST_LOG - Log filter (default: floorprice=info)

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use floorprice_backend::floor_price::{
    estimate_batch_with_metrics, load_trades, write_estimates, FloorEstimate, FloorPriceConfig,
    FloorPriceMetrics, FloorPricePipeline, RunSummary, Trade,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Replay each collection's full history in parallel
    Batch,
    /// Feed trades one at a time through sharded workers
    Stream,
}

#[derive(Parser, Debug)]
#[command(name = "floorprice")]
#[command(about = "Adaptive quantile floor price estimation for NFT collections")]
struct Args {
    /// Trades CSV file
    #[arg(short, long, env = "FLOORPRICE_INPUT")]
    input: PathBuf,

    /// Results CSV file (default: <input>_results.csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(short, long, env = "FLOORPRICE_CONFIG")]
    config: Option<PathBuf>,

    /// Only keep trades for this contract address
    #[arg(long, env = "FLOORPRICE_CONTRACT")]
    contract: Option<String>,

    /// Only keep trades for this collection
    #[arg(long)]
    collection: Option<String>,

    /// Lookback window length (trades)
    #[arg(long)]
    lookback: Option<usize>,

    /// Coverage window length (trades)
    #[arg(long)]
    backtest: Option<usize>,

    /// Target quantile
    #[arg(long)]
    pct_target: Option<f64>,

    /// Lower bound on the adjusted quantile
    #[arg(long)]
    pct_target_min: Option<f64>,

    /// Upper bound on the adjusted quantile
    #[arg(long)]
    pct_target_max: Option<f64>,

    /// Controller gain
    #[arg(long)]
    speed: Option<f64>,

    /// Execution mode
    #[arg(long, value_enum, default_value = "batch")]
    mode: Mode,

    /// Shard count for stream mode
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Per-shard queue capacity for stream mode
    #[arg(long, default_value = "1024")]
    queue_capacity: usize,

    /// Write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write a Prometheus metrics snapshot here
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn resolve_config(&self) -> Result<FloorPriceConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading config from {}", path.display());
                FloorPriceConfig::from_toml_file(path)?
            }
            None => {
                info!("Using default configuration");
                FloorPriceConfig::default()
            }
        };

        if let Some(v) = self.lookback {
            config.lookback = v;
        }
        if let Some(v) = self.backtest {
            config.backtest = v;
        }
        if let Some(v) = self.pct_target {
            config.pct_target = v;
        }
        if let Some(v) = self.pct_target_min {
            config.pct_target_min = v;
        }
        if let Some(v) = self.pct_target_max {
            config.pct_target_max = v;
        }
        if let Some(v) = self.speed {
            config.speed = v;
        }
        if self.contract.is_some() {
            config.input.contract_address = self.contract.clone();
        }
        if self.collection.is_some() {
            config.input.collection = self.collection.clone();
        }

        config.validate().context("Invalid floor price configuration")?;
        Ok(config)
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "trades".into());
    input.with_file_name(format!("{}_results.csv", stem))
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("floorprice={0},floorprice_backend={0}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = args.resolve_config()?;
    info!(
        "lookback={} backtest={} pct_target={} bounds=[{}, {}] speed={} outlier={:?}",
        config.lookback,
        config.backtest,
        config.pct_target,
        config.pct_target_min,
        config.pct_target_max,
        config.speed,
        config.outlier
    );

    info!("Reading trades from {}", args.input.display());
    let (trades, stats) = load_trades(&args.input, &config.input)?;
    info!(
        "Loaded {} trades ({} rows, {} other contracts, {} other collections, {} non-positive prices)",
        stats.trades,
        stats.rows_read,
        stats.filtered_contract,
        stats.filtered_collection,
        stats.dropped_non_positive
    );

    let started = Instant::now();
    let metrics = std::sync::Arc::new(FloorPriceMetrics::new());
    let estimates = match args.mode {
        Mode::Batch => estimate_batch_with_metrics(&config, &trades, Some(metrics.as_ref()))?,
        Mode::Stream => {
            run_stream(&config, trades, args.workers, args.queue_capacity, metrics.clone()).await?
        }
    };
    info!(
        "Estimated {} of {} trades in {:.2?}",
        estimates.iter().filter(|e| e.is_estimated()).count(),
        estimates.len(),
        started.elapsed()
    );

    let output = args.output_path();
    write_estimates(&output, &estimates)?;
    info!("Wrote results to {}", output.display());

    if let Some(path) = &args.summary {
        let summary = RunSummary::from_estimates(&config, &estimates);
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote run summary to {}", path.display());
    }

    if let Some(path) = &args.metrics_file {
        std::fs::write(path, metrics.to_prometheus())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote metrics snapshot to {}", path.display());
    }

    Ok(())
}

/// Stream trades in input order; estimates come back in the same order.
async fn run_stream(
    config: &FloorPriceConfig,
    trades: Vec<Trade>,
    workers: usize,
    capacity: usize,
    metrics: std::sync::Arc<FloorPriceMetrics>,
) -> Result<Vec<FloorEstimate>> {
    let mut pipeline = FloorPricePipeline::spawn_with_metrics(config.clone(), workers, capacity, metrics)?;
    for trade in trades {
        pipeline.submit(trade).await?;
    }

    let mut estimates = Vec::new();
    for indexed in pipeline.finish().await? {
        match indexed.result {
            Ok(estimate) => estimates.push(estimate),
            // already reported by the engine
            Err(e) => debug!("Skipping trade #{}: {}", indexed.index, e),
        }
    }
    Ok(estimates)
}
