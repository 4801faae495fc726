//! Data types for market data

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// Opening price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Trading volume
    pub volume: f64,
    /// Turnover (quote volume)
    #[serde(default)]
    pub turnover: f64,
}

/// OHLCV type alias
pub type OHLCV = Candle;

/// Ascending series of candles for one instrument
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Raw candle data
    pub candles: Vec<Candle>,
    /// Symbol name
    pub symbol: String,
    /// Interval string
    pub interval: String,
}

impl Dataset {
    /// Create new dataset from candles
    pub fn new(candles: Vec<Candle>, symbol: &str, interval: &str) -> Self {
        Self {
            candles,
            symbol: symbol.to_string(),
            interval: interval.to_string(),
        }
    }

    /// Get closing prices
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Get volumes
    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Simple returns; the first element is NaN
    pub fn returns(&self) -> Vec<f64> {
        super::indicators::simple_returns(&self.closes())
    }

    /// Get timestamps
    pub fn timestamps(&self) -> Vec<u64> {
        self.candles.iter().map(|c| c.timestamp).collect()
    }

    /// Number of candles
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Whether timestamps are strictly increasing
    pub fn is_ascending(&self) -> bool {
        self.candles
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp)
    }

    /// Get slice of candles
    pub fn slice(&self, start: usize, end: usize) -> Dataset {
        Dataset {
            candles: self.candles[start..end].to_vec(),
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
        }
    }

    /// Save dataset to CSV
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        for candle in &self.candles {
            writer.serialize(candle)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load dataset from CSV with a `timestamp,open,high,low,close,volume[,turnover]` header
    pub fn from_csv<P: AsRef<Path>>(path: P, symbol: &str, interval: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut candles = Vec::new();

        for record in reader.deserialize() {
            let candle: Candle = record?;
            candles.push(candle);
        }

        Ok(Self::new(candles, symbol, interval))
    }
}

/// Named macro-economic series, aligned to candles by timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroSeries {
    /// Series name, used in the feature column name
    pub name: String,
    /// (timestamp ms, value) points
    pub points: Vec<(u64, f64)>,
}

impl MacroSeries {
    /// Create new macro series
    pub fn new(name: &str, points: Vec<(u64, f64)>) -> Self {
        Self {
            name: name.to_string(),
            points,
        }
    }

    /// Values at the given timestamps; NaN where the series has no point
    pub fn align(&self, timestamps: &[u64]) -> Vec<f64> {
        let lookup: std::collections::HashMap<u64, f64> = self.points.iter().copied().collect();
        timestamps
            .iter()
            .map(|ts| lookup.get(ts).copied().unwrap_or(f64::NAN))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(timestamp: u64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1000.0,
            turnover: close * 1000.0,
        }
    }

    #[test]
    fn test_dataset_accessors() {
        let dataset = Dataset::new(
            vec![sample_candle(1, 100.0), sample_candle(2, 101.0)],
            "TEST",
            "1d",
        );
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.closes(), vec![100.0, 101.0]);
        assert_eq!(dataset.timestamps(), vec![1, 2]);
        assert!(dataset.is_ascending());
        assert_eq!(dataset.slice(1, 2).closes(), vec![101.0]);
    }

    #[test]
    fn test_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.csv");
        let dataset = Dataset::new(
            vec![sample_candle(1, 100.0), sample_candle(2, 101.0)],
            "TEST",
            "1d",
        );
        dataset.to_csv(&path).unwrap();

        let loaded = Dataset::from_csv(&path, "TEST", "1d").unwrap();
        assert_eq!(loaded.candles, dataset.candles);
    }

    #[test]
    fn test_macro_align() {
        let series = MacroSeries::new("rates", vec![(1, 4.0), (3, 4.5)]);
        let aligned = series.align(&[1, 2, 3]);
        assert_eq!(aligned[0], 4.0);
        assert!(aligned[1].is_nan());
        assert_eq!(aligned[2], 4.5);
    }
}
