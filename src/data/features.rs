//! Feature engineering for regime detection
//!
//! Builds a fixed-order feature matrix from OHLCV data plus optional market
//! and macro series. HMM parameters are positional, so the column order is
//! part of the contract.

use super::indicators::{
    pct_change, rolling_beta, rolling_correlation, rolling_mean, rolling_rms, rolling_std,
    rsi_wilder, simple_returns,
};
use super::types::{Dataset, MacroSeries};
use crate::config::RegimeConfig;
use crate::error::{RegimeError, Result};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const RETURN: &str = "return";
pub const VOLATILITY: &str = "volatility";
pub const GARCH_VOLATILITY: &str = "garch_volatility";
pub const VOL_OF_VOL: &str = "vol_of_vol";
pub const VOLUME_RATIO: &str = "volume_ratio";
pub const MOMENTUM: &str = "momentum";
pub const TREND_STRENGTH: &str = "trend_strength";
pub const RSI: &str = "rsi";
pub const MARKET_CORRELATION: &str = "market_correlation";
pub const MARKET_BETA: &str = "market_beta";

/// Columns present in every frame, in order
pub const BASE_COLUMNS: [&str; 8] = [
    RETURN,
    VOLATILITY,
    GARCH_VOLATILITY,
    VOL_OF_VOL,
    VOLUME_RATIO,
    MOMENTUM,
    TREND_STRENGTH,
    RSI,
];

/// Column name for a macro series
pub fn macro_column(name: &str) -> String {
    format!("macro_{}_delta", name)
}

/// Cells repaired by the sanitization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationReport {
    /// Cells filled from the previous valid value
    pub forward_filled: usize,
    /// Leading cells filled from the first valid value
    pub back_filled: usize,
    /// Cells with no valid value in their column, set to 0
    pub zeroed: usize,
}

impl SanitizationReport {
    /// Total sanitized cells
    pub fn total(&self) -> usize {
        self.forward_filled + self.back_filled + self.zeroed
    }
}

/// Feature matrix with named columns
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    /// Feature matrix (rows = observations, cols = features)
    pub data: Array2<f64>,
    /// Feature names
    pub names: Vec<String>,
    /// Timestamps corresponding to each row
    pub timestamps: Vec<u64>,
    /// What the sanitization pass repaired across the whole frame
    pub diagnostics: SanitizationReport,
    /// Sanitized cells per row
    pub sanitized_rows: Vec<usize>,
}

impl FeatureFrame {
    /// Number of observations
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Column index by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Get feature by name
    pub fn column(&self, name: &str) -> Option<Array1<f64>> {
        self.column_index(name)
            .map(|idx| self.data.column(idx).to_owned())
    }

    /// Whether the frame carries a column
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Sanitized cells in this frame's rows
    pub fn sanitized_cells(&self) -> usize {
        self.sanitized_rows.iter().sum()
    }

    /// Share of cells in this frame that were sanitized
    pub fn sanitized_fraction(&self) -> f64 {
        let cells = self.n_samples() * self.n_features();
        if cells == 0 {
            return 0.0;
        }
        (self.sanitized_cells() as f64 / cells as f64).min(1.0)
    }

    /// Last `n` rows (all rows if fewer are available)
    pub fn tail(&self, n: usize) -> FeatureFrame {
        let start = self.n_samples().saturating_sub(n);
        self.slice(start, self.n_samples())
    }

    /// Get a slice of features
    pub fn slice(&self, start: usize, end: usize) -> FeatureFrame {
        FeatureFrame {
            data: self.data.slice(s![start..end, ..]).to_owned(),
            names: self.names.clone(),
            timestamps: self.timestamps[start..end].to_vec(),
            diagnostics: self.diagnostics,
            sanitized_rows: self.sanitized_rows[start..end].to_vec(),
        }
    }
}

/// Feature builder for constructing the feature frame
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    /// Rolling window for volatility, momentum and market statistics
    pub volatility_window: usize,
    /// Short SMA for trend strength
    pub trend_short_window: usize,
    /// Long SMA for trend strength
    pub trend_long_window: usize,
    /// RSI period
    pub rsi_period: usize,
    /// Minimum rows accepted
    pub min_history: usize,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::from_config(&RegimeConfig::default())
    }
}

impl FeatureBuilder {
    /// Create builder from configuration
    pub fn from_config(config: &RegimeConfig) -> Self {
        Self {
            volatility_window: config.volatility_window,
            trend_short_window: config.trend_short_window,
            trend_long_window: config.trend_long_window,
            rsi_period: config.rsi_period,
            min_history: config.min_history(),
        }
    }

    /// Set volatility window
    pub fn with_volatility_window(mut self, window: usize) -> Self {
        self.volatility_window = window;
        self
    }

    /// Set minimum history
    pub fn with_min_history(mut self, rows: usize) -> Self {
        self.min_history = rows;
        self
    }

    /// Build features from OHLCV plus optional market and macro series
    pub fn build(
        &self,
        ohlcv: &Dataset,
        market: Option<&Dataset>,
        macros: &[MacroSeries],
    ) -> Result<FeatureFrame> {
        let n = ohlcv.len();
        if n < self.min_history {
            return Err(RegimeError::InsufficientData {
                required: self.min_history,
                available: n,
            });
        }
        if !ohlcv.is_ascending() {
            return Err(RegimeError::InvalidInput(
                "OHLCV timestamps must be strictly ascending".into(),
            ));
        }

        let w = self.volatility_window;
        let closes = ohlcv.closes();
        let volumes = ohlcv.volumes();
        let timestamps = ohlcv.timestamps();

        let returns = simple_returns(&closes);
        let volatility = rolling_std(&returns, w);
        let garch = rolling_rms(&returns, w);
        let vol_of_vol = rolling_std(&garch, w);

        let volume_mean = rolling_mean(&volumes, w);
        let volume_ratio: Vec<f64> = volumes
            .iter()
            .zip(&volume_mean)
            .map(|(v, m)| {
                if m.is_nan() {
                    f64::NAN
                } else if *m > 1e-12 {
                    v / m
                } else {
                    1.0
                }
            })
            .collect();

        let sma = rolling_mean(&closes, w);
        let momentum: Vec<f64> = closes
            .iter()
            .zip(&sma)
            .map(|(c, m)| c / m - 1.0)
            .collect();

        let sma_short = rolling_mean(&closes, self.trend_short_window);
        let sma_long = rolling_mean(&closes, self.trend_long_window);
        let trend_strength: Vec<f64> = sma_short
            .iter()
            .zip(&sma_long)
            .map(|(s, l)| (s - l) / l)
            .collect();

        let rsi = rsi_wilder(&closes, self.rsi_period);

        let mut columns: Vec<(String, Vec<f64>)> = vec![
            (RETURN.to_string(), returns.clone()),
            (VOLATILITY.to_string(), volatility),
            (GARCH_VOLATILITY.to_string(), garch),
            (VOL_OF_VOL.to_string(), vol_of_vol),
            (VOLUME_RATIO.to_string(), volume_ratio),
            (MOMENTUM.to_string(), momentum),
            (TREND_STRENGTH.to_string(), trend_strength),
            (RSI.to_string(), rsi),
        ];

        if let Some(market) = market {
            let lookup: HashMap<u64, f64> = market
                .candles
                .iter()
                .map(|c| (c.timestamp, c.close))
                .collect();
            let market_closes: Vec<f64> = timestamps
                .iter()
                .map(|ts| lookup.get(ts).copied().unwrap_or(f64::NAN))
                .collect();
            let market_returns = simple_returns(&market_closes);

            columns.push((
                MARKET_CORRELATION.to_string(),
                rolling_correlation(&returns, &market_returns, w),
            ));
            columns.push((
                MARKET_BETA.to_string(),
                rolling_beta(&returns, &market_returns, w),
            ));
        }

        for series in macros {
            let aligned = series.align(&timestamps);
            columns.push((macro_column(&series.name), pct_change(&aligned)));
        }

        let mut diagnostics = SanitizationReport::default();
        let mut sanitized_rows = vec![0usize; n];
        for (_, values) in columns.iter_mut() {
            sanitize_column(values, &mut diagnostics, &mut sanitized_rows);
        }

        if diagnostics.total() > 0 {
            tracing::warn!(
                forward_filled = diagnostics.forward_filled,
                back_filled = diagnostics.back_filled,
                zeroed = diagnostics.zeroed,
                "Sanitized {} feature cells",
                diagnostics.total()
            );
        }

        let n_cols = columns.len();
        let mut data = Array2::zeros((n, n_cols));
        for (j, (_, values)) in columns.iter().enumerate() {
            for (i, v) in values.iter().enumerate() {
                data[[i, j]] = *v;
            }
        }

        Ok(FeatureFrame {
            data,
            names: columns.into_iter().map(|(name, _)| name).collect(),
            timestamps,
            diagnostics,
            sanitized_rows,
        })
    }
}

/// Forward-fill, then back-fill, then zero whatever is left
///
/// `rows` gets one count per repaired cell, indexed like `values`.
fn sanitize_column(values: &mut [f64], report: &mut SanitizationReport, rows: &mut [usize]) {
    let mut last_valid: Option<f64> = None;
    for (i, v) in values.iter_mut().enumerate() {
        if v.is_finite() {
            last_valid = Some(*v);
        } else if let Some(prev) = last_valid {
            *v = prev;
            report.forward_filled += 1;
            rows[i] += 1;
        }
    }

    match values.iter().position(|v| v.is_finite()) {
        Some(first) => {
            let fill = values[first];
            for (i, v) in values[..first].iter_mut().enumerate() {
                *v = fill;
                report.back_filled += 1;
                rows[i] += 1;
            }
        }
        None => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = 0.0;
                report.zeroed += 1;
                rows[i] += 1;
            }
        }
    }
}
