//! Configuration management
//!
//! Handles loading and validation of the regime configuration.

use crate::error::{RegimeError, Result};
use crate::models::CovarianceType;
use crate::weights::BiasTable;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for feature building, HMM fitting, classification and weighting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Number of hidden states (regimes). Never inferred.
    #[serde(default = "default_n_regimes")]
    pub n_regimes: usize,

    /// Rows used by `classify`
    #[serde(default = "default_lookback_period")]
    pub lookback_period: usize,

    /// Rolling window for volatility, momentum, correlation
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,

    /// Minimum rows accepted by the feature builder and `fit`; `None` means 2 × volatility window
    #[serde(default)]
    pub min_history: Option<usize>,

    /// Short SMA for trend strength
    #[serde(default = "default_trend_short_window")]
    pub trend_short_window: usize,

    /// Long SMA for trend strength
    #[serde(default = "default_trend_long_window")]
    pub trend_long_window: usize,

    /// RSI period (Wilder smoothing)
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Absolute market correlation above which the asset is considered coupled
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,

    /// Posterior confidence below which weights fall back to uniform
    #[serde(default = "default_confidence_threshold")]
    pub regime_confidence_threshold: f64,

    /// Cumulative macro change that counts as rising/falling
    #[serde(default = "default_macro_change_threshold")]
    pub macro_change_threshold: f64,

    /// EM iteration cap
    #[serde(default = "default_max_em_iterations")]
    pub max_em_iterations: usize,

    /// EM convergence tolerance on the log-likelihood delta
    #[serde(default = "default_em_tol")]
    pub em_tol: f64,

    /// Diagonal covariance regularization
    #[serde(default = "default_min_covar")]
    pub min_covar: f64,

    /// Emission covariance structure
    #[serde(default)]
    pub covariance_type: CovarianceType,

    /// k-means restarts used for initialization
    #[serde(default = "default_kmeans_restarts")]
    pub kmeans_restarts: usize,

    /// Seed for EM initialization
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Per-regime model bias rules
    #[serde(default)]
    pub bias_table: BiasTable,
}

fn default_n_regimes() -> usize {
    3
}

fn default_lookback_period() -> usize {
    252
}

fn default_volatility_window() -> usize {
    20
}

fn default_trend_short_window() -> usize {
    10
}

fn default_trend_long_window() -> usize {
    40
}

fn default_rsi_period() -> usize {
    14
}

fn default_correlation_threshold() -> f64 {
    0.7
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_macro_change_threshold() -> f64 {
    0.01
}

fn default_max_em_iterations() -> usize {
    1000
}

fn default_em_tol() -> f64 {
    1e-2
}

fn default_min_covar() -> f64 {
    1e-3
}

fn default_kmeans_restarts() -> usize {
    10
}

fn default_random_seed() -> u64 {
    42
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            n_regimes: default_n_regimes(),
            lookback_period: default_lookback_period(),
            volatility_window: default_volatility_window(),
            min_history: None,
            trend_short_window: default_trend_short_window(),
            trend_long_window: default_trend_long_window(),
            rsi_period: default_rsi_period(),
            correlation_threshold: default_correlation_threshold(),
            regime_confidence_threshold: default_confidence_threshold(),
            macro_change_threshold: default_macro_change_threshold(),
            max_em_iterations: default_max_em_iterations(),
            em_tol: default_em_tol(),
            min_covar: default_min_covar(),
            covariance_type: CovarianceType::default(),
            kmeans_restarts: default_kmeans_restarts(),
            random_seed: default_random_seed(),
            bias_table: BiasTable::default(),
        }
    }
}

impl RegimeConfig {
    /// Effective minimum history
    pub fn min_history(&self) -> usize {
        self.min_history.unwrap_or(2 * self.volatility_window)
    }

    /// Set number of regimes
    pub fn with_n_regimes(mut self, n: usize) -> Self {
        self.n_regimes = n;
        self
    }

    /// Set lookback period
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback_period = lookback;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Set covariance structure
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.covariance_type = covariance_type;
        self
    }

    /// Load configuration from a TOML or JSON file (chosen by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config: RegimeConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if self.n_regimes < 2 {
            return Err(RegimeError::Config(format!(
                "n_regimes must be at least 2, got {}",
                self.n_regimes
            )));
        }
        if self.lookback_period == 0 {
            return Err(RegimeError::Config("lookback_period must be positive".into()));
        }
        if self.volatility_window < 2 {
            return Err(RegimeError::Config(
                "volatility_window must be at least 2".into(),
            ));
        }
        if self.trend_short_window == 0 || self.trend_long_window == 0 || self.rsi_period == 0 {
            return Err(RegimeError::Config("indicator windows must be positive".into()));
        }
        if self.trend_short_window >= self.trend_long_window {
            return Err(RegimeError::Config(format!(
                "trend_short_window ({}) must be below trend_long_window ({})",
                self.trend_short_window, self.trend_long_window
            )));
        }
        for (name, value) in [
            ("correlation_threshold", self.correlation_threshold),
            ("regime_confidence_threshold", self.regime_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RegimeError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_em_iterations == 0 {
            return Err(RegimeError::Config("max_em_iterations must be positive".into()));
        }
        if !(self.em_tol > 0.0) || !(self.min_covar > 0.0) {
            return Err(RegimeError::Config(
                "em_tol and min_covar must be positive".into(),
            ));
        }
        if self.min_history() < 2 {
            return Err(RegimeError::Config("min_history must be at least 2".into()));
        }
        self.bias_table.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegimeConfig::default();
        assert_eq!(config.n_regimes, 3);
        assert_eq!(config.lookback_period, 252);
        assert_eq!(config.min_history(), 40);
        assert!((config.regime_confidence_threshold - 0.8).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: RegimeConfig = toml::from_str(
            r#"
            n_regimes = 4
            covariance_type = "diagonal"
            random_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.n_regimes, 4);
        assert_eq!(config.covariance_type, CovarianceType::Diagonal);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.volatility_window, 20);
    }

    #[test]
    fn test_config_serialization() {
        let config = RegimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RegimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.n_regimes, config.n_regimes);
        assert_eq!(parsed.bias_table, config.bias_table);
    }

    #[test]
    fn test_validation_rejects_single_state() {
        let config = RegimeConfig::default().with_n_regimes(1);
        assert!(matches!(config.validate(), Err(RegimeError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_threshold() {
        let mut config = RegimeConfig::default();
        config.regime_confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
