//! CSV trade ingestion and result writing
//!
//! Input files are header-driven: the entity, sequence and price columns are
//! located by name (see [`InputConfig`]), every other column is ignored.
//! Rows for other contracts/collections and rows without a positive price are
//! dropped and counted here, so the estimator only ever sees valid trades.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use super::config::InputConfig;
use super::types::{FloorEstimate, Trade};

/// Row accounting for one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub rows_read: usize,
    pub filtered_contract: usize,
    pub filtered_collection: usize,
    pub dropped_non_positive: usize,
    pub trades: usize,
}

/// Load trades from a CSV file.
pub fn load_trades(path: impl AsRef<Path>, input: &InputConfig) -> Result<(Vec<Trade>, LoadStats)> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open trades file {}", path.display()))?;
    read_trades(file, input).with_context(|| format!("Failed to load trades from {}", path.display()))
}

/// Load trades from any CSV reader.
pub fn read_trades<R: Read>(reader: R, input: &InputConfig) -> Result<(Vec<Trade>, LoadStats)> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader.headers().context("Failed to read CSV header")?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("missing column '{}'", name))
    };

    let entity_idx = column(&input.entity_column)?;
    let sequence_idx = column(&input.sequence_column)?;
    let price_idx = column(&input.price_column)?;
    let contract_filter = input.contract_address.as_ref().map(|c| c.to_lowercase());
    let contract_idx = match contract_filter {
        Some(_) => Some(column(&input.contract_column)?),
        None => None,
    };

    let mut stats = LoadStats::default();
    let mut trades = Vec::new();

    for (row, record) in csv_reader.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = record.with_context(|| format!("malformed CSV record at line {}", line))?;
        stats.rows_read += 1;

        let field = |idx: usize| record.get(idx).unwrap_or("");

        if let (Some(expected), Some(idx)) = (&contract_filter, contract_idx) {
            if field(idx).to_lowercase() != *expected {
                stats.filtered_contract += 1;
                continue;
            }
        }

        let entity = field(entity_idx);
        if let Some(collection) = &input.collection {
            if entity != collection {
                stats.filtered_collection += 1;
                continue;
            }
        }

        let sequence_key = parse_sequence_key(field(sequence_idx))
            .with_context(|| format!("invalid {} at line {}", input.sequence_column, line))?;

        let price = field(price_idx);
        let parsed = if price.is_empty() {
            None
        } else {
            Some(
                price
                    .parse::<f64>()
                    .with_context(|| format!("invalid {} at line {}", input.price_column, line))?,
            )
        };

        match parsed.and_then(|p| Trade::new(entity, sequence_key, p)) {
            Some(trade) => trades.push(trade),
            None => {
                debug!(line, price, "dropping trade without a positive price");
                stats.dropped_non_positive += 1;
            }
        }
    }

    stats.trades = trades.len();
    if stats.dropped_non_positive > 0 {
        warn!(
            "Dropped {} trades without a positive price",
            stats.dropped_non_positive
        );
    }

    Ok((trades, stats))
}

/// Block numbers may be exported as integers or as integral floats ("123.0").
fn parse_sequence_key(raw: &str) -> Result<u64> {
    if let Ok(key) = raw.parse::<u64>() {
        return Ok(key);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| anyhow!("'{}' is not a sequence key", raw))?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64 {
        Ok(value as u64)
    } else {
        Err(anyhow!("'{}' is not a non-negative integer", raw))
    }
}

/// Write estimates as CSV; absent values become empty cells.
pub fn write_estimates(path: impl AsRef<Path>, estimates: &[FloorEstimate]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_estimates_to(file, estimates).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_estimates_to<W: Write>(writer: W, estimates: &[FloorEstimate]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for estimate in estimates {
        csv_writer.serialize(estimate)?;
    }
    csv_writer.flush()?;
    Ok(())
}
