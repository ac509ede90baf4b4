//! Floor Price Estimator Configuration

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Main configuration for floor price estimation.
///
/// Defaults match the production tuning of the continuous floor price job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorPriceConfig {
    /// Number of prior trades in the lookback window
    pub lookback: usize,

    /// Number of trades in the trailing coverage window
    pub backtest: usize,

    /// Target quantile probability (also the fixed coverage reference)
    pub pct_target: f64,

    /// Lower bound for the adjusted quantile
    pub pct_target_min: f64,

    /// Upper bound for the adjusted quantile
    pub pct_target_max: f64,

    /// Proportional gain of the quantile controller
    pub speed: f64,

    /// Outlier suppression applied to each lookback window
    pub outlier: OutlierPolicy,

    /// Whether the current trade's hit counts toward its own coverage
    pub coverage_alignment: CoverageAlignment,

    /// Base used by each controller step
    pub controller_mode: ControllerMode,

    /// CSV ingestion settings (ignored by the library core)
    pub input: InputConfig,
}

impl Default for FloorPriceConfig {
    fn default() -> Self {
        Self {
            lookback: 140,
            backtest: 800,
            pct_target: 0.05,
            pct_target_min: 0.02,
            pct_target_max: 0.1,
            speed: 0.5,
            outlier: OutlierPolicy::default(),
            coverage_alignment: CoverageAlignment::default(),
            controller_mode: ControllerMode::default(),
            input: InputConfig::default(),
        }
    }
}

impl FloorPriceConfig {
    /// Load a TOML config file and validate it.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range parameters before any trade is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback == 0 {
            return Err(ConfigError::NonPositiveWindow { field: "lookback" });
        }
        if self.backtest == 0 {
            return Err(ConfigError::NonPositiveWindow { field: "backtest" });
        }

        for (field, value) in [
            ("pct_target", self.pct_target),
            ("pct_target_min", self.pct_target_min),
            ("pct_target_max", self.pct_target_max),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::ProbabilityOutOfRange { field, value });
            }
        }

        if !(self.pct_target_min <= self.pct_target && self.pct_target <= self.pct_target_max) {
            return Err(ConfigError::TargetOutsideBounds {
                min: self.pct_target_min,
                target: self.pct_target,
                max: self.pct_target_max,
            });
        }

        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(ConfigError::InvalidSpeed(self.speed));
        }

        self.outlier.validate()
    }
}

/// Outlier suppression policy for lookback windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Tukey fences: keep `Q1 - k*IQR <= v <= Q3 + k*IQR`
    Iqr { multiplier: f64 },
    /// Robust z-score from median and median absolute deviation
    Mad { threshold: f64 },
    /// Classic z-score from mean and sample standard deviation
    Sigma { threshold: f64 },
    /// Keep every value
    None,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Iqr { multiplier: 1.5 }
    }
}

impl OutlierPolicy {
    fn validate(&self) -> Result<(), ConfigError> {
        let (field, value) = match *self {
            OutlierPolicy::Iqr { multiplier } => ("outlier.multiplier", multiplier),
            OutlierPolicy::Mad { threshold } | OutlierPolicy::Sigma { threshold } => {
                ("outlier.threshold", threshold)
            }
            OutlierPolicy::None => return Ok(()),
        };
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidOutlierBound { field, value })
        }
    }
}

/// Which hits feed the coverage used for a trade's own estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageAlignment {
    /// Trailing window ends at the previous trade
    #[default]
    Lagged,
    /// Trailing window ends at (and includes) the current trade, so a
    /// trade's own price feeds its adjusted quantile
    Inclusive,
}

/// Base value the controller corrects from on each step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// Always correct from the configured target (no error accumulation)
    #[default]
    Memoryless,
    /// Correct from the previous adjusted quantile
    Integrating,
}

/// CSV column mapping and row filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Column holding the entity (collection) identifier
    pub entity_column: String,
    /// Column holding the ordering key (block number)
    pub sequence_column: String,
    /// Column holding the trade price
    pub price_column: String,
    /// Column holding the contract address, used by `contract_address`
    pub contract_column: String,
    /// Only keep rows for this contract (case-insensitive)
    pub contract_address: Option<String>,
    /// Only keep rows for this collection
    pub collection: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            entity_column: "collection".into(),
            sequence_column: "block_number".into(),
            price_column: "price_eth".into(),
            contract_column: "contract_address".into(),
            contract_address: None,
            collection: None,
        }
    }
}

/// Configuration rejected at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// lookback or backtest is zero
    NonPositiveWindow { field: &'static str },
    /// A probability is outside (0, 1)
    ProbabilityOutOfRange { field: &'static str, value: f64 },
    /// pct_target is not within [pct_target_min, pct_target_max]
    TargetOutsideBounds { min: f64, target: f64, max: f64 },
    /// speed is negative or not finite
    InvalidSpeed(f64),
    /// Outlier multiplier/threshold is negative or not finite
    InvalidOutlierBound { field: &'static str, value: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveWindow { field } => write!(f, "{} must be a positive integer", field),
            Self::ProbabilityOutOfRange { field, value } => {
                write!(f, "{} must be in (0, 1), got {}", field, value)
            }
            Self::TargetOutsideBounds { min, target, max } => write!(
                f,
                "pct_target ({}) must satisfy pct_target_min ({}) <= pct_target <= pct_target_max ({})",
                target, min, max
            ),
            Self::InvalidSpeed(speed) => {
                write!(f, "speed must be a finite non-negative number, got {}", speed)
            }
            Self::InvalidOutlierBound { field, value } => {
                write!(f, "{} must be a finite non-negative number, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
