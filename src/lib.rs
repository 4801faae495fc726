//! # HMM Regime
//!
//! Market-regime classification with a Gaussian Hidden Markov Model and
//! regime-aware weighting of downstream forecasting models.
//!
//! ## Pipeline
//!
//! - **Features**: OHLCV (plus optional market and macro series) to a
//!   sanitized feature frame with a fixed column order
//! - **Model**: Gaussian HMM over standardized features, with states named
//!   Bear / Bull / Volatile / Sideways after every fit
//! - **Classification**: current regime, confidence and per-state profile
//!   over a lookback window
//! - **Weights**: per-regime bias table applied to caller-supplied model
//!   weights, gated on confidence
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hmm_regime::{RegimeAnalysisFacade, RegimeConfig};
//! use hmm_regime::data::synthetic::{generate, three_regime_segments};
//! use std::collections::BTreeMap;
//!
//! fn main() -> hmm_regime::Result<()> {
//!     let data = generate(&three_regime_segments(), 100.0, 42)?;
//!     let facade = RegimeAnalysisFacade::new(RegimeConfig::default())?;
//!
//!     let base: BTreeMap<String, f64> = ["technical", "lstm", "transformer", "ensemble"]
//!         .iter()
//!         .map(|m| (m.to_string(), 0.25))
//!         .collect();
//!
//!     let (analysis, weights) = facade.analyze_with_weights(&data, None, &[], true, &base)?;
//!     println!("{analysis}\n{weights}");
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod regime;
pub mod weights;

// Re-export main types for convenience
pub use analysis::{RegimeAnalysis, RegimeAnalysisFacade};
pub use config::RegimeConfig;
pub use data::{Dataset, FeatureBuilder, FeatureFrame, MacroSeries};
pub use error::{RegimeError, Result};
pub use models::{CovarianceType, FitReport, RegimeModel};
pub use regime::{RegimeClassification, RegimeClassifier, RegimeLabel, SnapshotStore};
pub use weights::{BiasTable, WeightMapper, WeightVector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
