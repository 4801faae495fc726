//! Market data types, indicators and feature engineering
//!
//! Provides types for market data and the feature frame consumed by the HMM.

pub mod features;
pub mod indicators;
pub mod synthetic;
mod types;

pub use features::{FeatureBuilder, FeatureFrame, SanitizationReport};
pub use types::{Candle, Dataset, MacroSeries, OHLCV};
