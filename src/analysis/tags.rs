//! Coarse descriptive tags attached to every analysis

use crate::data::features::{MARKET_CORRELATION, VOLATILITY};
use crate::data::FeatureFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the latest volatility sits within the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
    Extreme,
}

impl VolatilityRegime {
    /// Tag from a percentile rank in `[0, 1]`
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile >= 0.95 {
            VolatilityRegime::Extreme
        } else if percentile >= 0.75 {
            VolatilityRegime::High
        } else if percentile < 0.25 {
            VolatilityRegime::Low
        } else {
            VolatilityRegime::Normal
        }
    }

    /// Tag the last `volatility` value of the frame against the whole frame
    pub fn from_frame(frame: &FeatureFrame) -> Self {
        match frame.column(VOLATILITY) {
            Some(values) if !values.is_empty() => {
                let latest = values[values.len() - 1];
                Self::from_percentile(percentile_rank(values.as_slice().unwrap_or(&[]), latest))
            }
            _ => VolatilityRegime::Normal,
        }
    }
}

/// Mid-rank percentile: ties count half
fn percentile_rank(values: &[f64], x: f64) -> f64 {
    if values.is_empty() {
        return 0.5;
    }
    let below = values.iter().filter(|v| **v < x).count() as f64;
    let equal = values.iter().filter(|v| **v == x).count() as f64;
    (below + 0.5 * equal) / values.len() as f64
}

/// Co-movement with the market series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationRegime {
    Coupled,
    Decoupled,
    Inverse,
    /// No market series supplied
    Unavailable,
}

impl CorrelationRegime {
    pub fn from_correlation(correlation: f64, threshold: f64) -> Self {
        if correlation >= threshold {
            CorrelationRegime::Coupled
        } else if correlation <= -threshold {
            CorrelationRegime::Inverse
        } else {
            CorrelationRegime::Decoupled
        }
    }

    pub fn from_frame(frame: &FeatureFrame, threshold: f64) -> Self {
        match frame.column(MARKET_CORRELATION) {
            Some(values) if !values.is_empty() => {
                Self::from_correlation(values[values.len() - 1], threshold)
            }
            _ => CorrelationRegime::Unavailable,
        }
    }
}

/// Direction of the macro series over the recent rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroRegime {
    Rising,
    Falling,
    Stable,
    /// No macro series supplied
    Unavailable,
}

impl MacroRegime {
    /// Average over macro columns of the summed deltas in the last `window` rows
    pub fn from_frame(frame: &FeatureFrame, window: usize, threshold: f64) -> Self {
        let columns: Vec<usize> = frame
            .names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with("macro_") && name.ends_with("_delta"))
            .map(|(i, _)| i)
            .collect();
        if columns.is_empty() || frame.is_empty() {
            return MacroRegime::Unavailable;
        }

        let start = frame.n_samples().saturating_sub(window.max(1));
        let change = columns
            .iter()
            .map(|&c| {
                frame
                    .data
                    .column(c)
                    .iter()
                    .skip(start)
                    .sum::<f64>()
            })
            .sum::<f64>()
            / columns.len() as f64;

        if change > threshold {
            MacroRegime::Rising
        } else if change < -threshold {
            MacroRegime::Falling
        } else {
            MacroRegime::Stable
        }
    }
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for CorrelationRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for MacroRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn frame(names: &[&str], columns: &[Vec<f64>]) -> FeatureFrame {
        let rows = columns[0].len();
        let mut data = Array2::zeros((rows, columns.len()));
        for (j, col) in columns.iter().enumerate() {
            for (i, v) in col.iter().enumerate() {
                data[[i, j]] = *v;
            }
        }
        FeatureFrame {
            data,
            names: names.iter().map(|s| s.to_string()).collect(),
            timestamps: (0..rows as u64).collect(),
            diagnostics: Default::default(),
            sanitized_rows: vec![0; rows],
        }
    }

    #[test]
    fn test_volatility_percentile() {
        assert_eq!(VolatilityRegime::from_percentile(0.1), VolatilityRegime::Low);
        assert_eq!(VolatilityRegime::from_percentile(0.5), VolatilityRegime::Normal);
        assert_eq!(VolatilityRegime::from_percentile(0.75), VolatilityRegime::High);
        assert_eq!(VolatilityRegime::from_percentile(0.95), VolatilityRegime::Extreme);

        let rising: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let frame = frame(&[VOLATILITY], &[rising]);
        assert_eq!(VolatilityRegime::from_frame(&frame), VolatilityRegime::Extreme);
    }

    #[test]
    fn test_flat_volatility_is_normal() {
        let frame = frame(&[VOLATILITY], &[vec![0.0; 50]]);
        assert_eq!(VolatilityRegime::from_frame(&frame), VolatilityRegime::Normal);
    }

    #[test]
    fn test_correlation() {
        assert_eq!(CorrelationRegime::from_correlation(0.8, 0.7), CorrelationRegime::Coupled);
        assert_eq!(CorrelationRegime::from_correlation(-0.9, 0.7), CorrelationRegime::Inverse);
        assert_eq!(CorrelationRegime::from_correlation(0.1, 0.7), CorrelationRegime::Decoupled);

        let no_market = frame(&[VOLATILITY], &[vec![0.0; 5]]);
        assert_eq!(
            CorrelationRegime::from_frame(&no_market, 0.7),
            CorrelationRegime::Unavailable
        );
    }

    #[test]
    fn test_macro_direction() {
        let frame = frame(
            &[VOLATILITY, "macro_rates_delta", "macro_cpi_delta"],
            &[vec![0.0; 10], vec![0.01; 10], vec![0.0; 10]],
        );
        // Last 5 rows: (0.05 + 0.0) / 2
        assert_eq!(MacroRegime::from_frame(&frame, 5, 0.01), MacroRegime::Rising);
        assert_eq!(MacroRegime::from_frame(&frame, 5, 0.03), MacroRegime::Stable);

        let no_macro = frame_without_macro();
        assert_eq!(MacroRegime::from_frame(&no_macro, 5, 0.01), MacroRegime::Unavailable);
    }

    fn frame_without_macro() -> FeatureFrame {
        frame(&[VOLATILITY], &[vec![0.0; 3]])
    }
}
