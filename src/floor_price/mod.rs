//! Adaptive Floor Price Estimator
//!
//! Estimates a robust floor price for each traded collection from its stream
//! of trade prices. The floor is a low quantile of recent log-prices, and the
//! quantile itself is corrected by a feedback controller so that the share of
//! trades printing below the fixed-target estimate tracks the target.
//!
//! Features:
//! - Causal lookback windows (batch slices or streaming ring buffers)
//! - Outlier suppression (IQR, MAD, sigma) against wash trades and fat fingers
//! - Interpolated quantiles, coverage tracking, bounded proportional control
//! - Entity-parallel batch replay (rayon) and sharded streaming (tokio)
//! - CSV ingestion/output, Prometheus-text metrics, JSON run summaries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use floorprice_backend::floor_price::{FloorPriceConfig, FloorPriceEngine, Trade};
//!
//! let mut engine = FloorPriceEngine::new(FloorPriceConfig::default())?;
//! for trade in trades {
//!     let estimate = engine.observe(&trade)?;
//!     if let Some(floor) = estimate.floor_price_estimate {
//!         println!("{} floor at block {}: {}", trade.entity_id, trade.sequence_key, floor);
//!     }
//! }
//! ```

pub mod config;
pub mod controller;
pub mod coverage;
pub mod engine;
pub mod io;
pub mod metrics;
pub mod outlier;
pub mod pipeline;
pub mod quantile;
pub mod summary;
pub mod types;
pub mod window;

pub use config::*;
pub use controller::AdaptiveQuantileController;
pub use coverage::CoverageTracker;
pub use engine::*;
pub use io::{load_trades, read_trades, write_estimates, LoadStats};
pub use metrics::*;
pub use outlier::FilteredWindow;
pub use pipeline::*;
pub use quantile::{quantile, SortedSample};
pub use summary::*;
pub use types::*;
pub use window::{lookback_slice, LookbackWindow};
