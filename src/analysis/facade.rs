//! Single entry point: features, classification, tags and weights

use super::tags::{CorrelationRegime, MacroRegime, VolatilityRegime};
use crate::config::RegimeConfig;
use crate::data::{Dataset, FeatureBuilder, FeatureFrame, MacroSeries};
use crate::error::Result;
use crate::models::FitReport;
use crate::regime::{RegimeClassification, RegimeClassifier};
use crate::weights::{WeightMapper, WeightVector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Full result of one analysis call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeAnalysis {
    pub classification: RegimeClassification,
    pub volatility_regime: VolatilityRegime,
    pub correlation_regime: CorrelationRegime,
    pub macro_regime: MacroRegime,
    /// Classification confidence discounted for repaired cells and short windows
    pub overall_confidence: f64,
    /// Timestamp of the last candle
    pub timestamp: u64,
    pub generated_at: DateTime<Utc>,
    /// Repaired feature cells inside the classified window
    pub sanitized_cells: usize,
}

impl fmt::Display for RegimeAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.classification)?;
        writeln!(f, "  Volatility:  {}", self.volatility_regime)?;
        writeln!(f, "  Correlation: {}", self.correlation_regime)?;
        writeln!(f, "  Macro:       {}", self.macro_regime)?;
        write!(f, "  Overall confidence: {:.1}%", self.overall_confidence * 100.0)
    }
}

/// Orchestrates feature building, classification and weighting
///
/// Every error propagates. On failure callers should keep their last good
/// weight vector rather than fall back to defaults.
pub struct RegimeAnalysisFacade {
    config: RegimeConfig,
    builder: FeatureBuilder,
    classifier: RegimeClassifier,
    mapper: WeightMapper,
}

impl RegimeAnalysisFacade {
    pub fn new(config: RegimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            builder: FeatureBuilder::from_config(&config),
            classifier: RegimeClassifier::new(config.clone()),
            mapper: WeightMapper::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Classifier holding the published model
    pub fn classifier(&self) -> &RegimeClassifier {
        &self.classifier
    }

    pub fn mapper(&self) -> &WeightMapper {
        &self.mapper
    }

    /// Build features and train a new model
    pub fn fit(
        &self,
        ohlcv: &Dataset,
        market: Option<&Dataset>,
        macros: &[MacroSeries],
    ) -> Result<FitReport> {
        let frame = self.builder.build(ohlcv, market, macros)?;
        self.classifier.fit(&frame)
    }

    /// Classify the latest candle, training first when `force_retrain` is set
    ///
    /// Without `force_retrain` an untrained facade fails with `ModelNotTrained`.
    pub fn analyze(
        &self,
        ohlcv: &Dataset,
        market: Option<&Dataset>,
        macros: &[MacroSeries],
        force_retrain: bool,
    ) -> Result<RegimeAnalysis> {
        let frame = self.builder.build(ohlcv, market, macros)?;
        if force_retrain {
            self.classifier.fit(&frame)?;
        }
        self.analyze_frame(&frame)
    }

    /// Analyze and weight `base_weights` in one call
    pub fn analyze_with_weights(
        &self,
        ohlcv: &Dataset,
        market: Option<&Dataset>,
        macros: &[MacroSeries],
        force_retrain: bool,
        base_weights: &BTreeMap<String, f64>,
    ) -> Result<(RegimeAnalysis, WeightVector)> {
        let analysis = self.analyze(ohlcv, market, macros, force_retrain)?;
        let weights = self.model_weights(&analysis, base_weights);
        Ok((analysis, weights))
    }

    /// Weights for the regime and confidence of an earlier analysis
    pub fn model_weights(
        &self,
        analysis: &RegimeAnalysis,
        base_weights: &BTreeMap<String, f64>,
    ) -> WeightVector {
        let c = &analysis.classification;
        self.mapper
            .map(c.regime_id, c.regime_name, c.confidence, base_weights)
    }

    /// Analyze an already built feature frame
    pub fn analyze_frame(&self, frame: &FeatureFrame) -> Result<RegimeAnalysis> {
        let classification = self.classifier.classify(frame)?;
        let window = frame.tail(self.config.lookback_period);

        // Only the classified window counts against confidence
        let sanitized_cells = window.sanitized_cells();
        let clean_share = 1.0 - window.sanitized_fraction();
        let coverage =
            (classification.window_len as f64 / self.config.lookback_period as f64).min(1.0);
        let overall_confidence = (classification.confidence * clean_share * coverage).clamp(0.0, 1.0);

        let analysis = RegimeAnalysis {
            volatility_regime: VolatilityRegime::from_frame(&window),
            correlation_regime: CorrelationRegime::from_frame(
                &window,
                self.config.correlation_threshold,
            ),
            macro_regime: MacroRegime::from_frame(
                &window,
                self.config.volatility_window,
                self.config.macro_change_threshold,
            ),
            overall_confidence,
            timestamp: frame.timestamps.last().copied().unwrap_or_default(),
            generated_at: Utc::now(),
            sanitized_cells,
            classification,
        };

        tracing::info!(
            regime = %analysis.classification.regime_name,
            confidence = analysis.classification.confidence,
            overall_confidence,
            "Regime analysis complete"
        );

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, three_regime_segments};
    use crate::error::RegimeError;

    fn dataset() -> Dataset {
        generate(&three_regime_segments(), 100.0, 42).unwrap()
    }

    #[test]
    fn test_untrained_without_retrain() {
        let facade = RegimeAnalysisFacade::new(RegimeConfig::default()).unwrap();
        assert!(matches!(
            facade.analyze(&dataset(), None, &[], false),
            Err(RegimeError::ModelNotTrained)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RegimeConfig::default().with_n_regimes(1);
        assert!(RegimeAnalysisFacade::new(config).is_err());
    }

    #[test]
    fn test_analyze_with_retrain() {
        let facade = RegimeAnalysisFacade::new(RegimeConfig::default()).unwrap();
        let data = dataset();
        let analysis = facade.analyze(&data, None, &[], true).unwrap();

        assert_eq!(analysis.timestamp, data.candles[499].timestamp);
        assert_eq!(analysis.correlation_regime, CorrelationRegime::Unavailable);
        assert_eq!(analysis.macro_regime, MacroRegime::Unavailable);
        assert!(analysis.overall_confidence <= analysis.classification.confidence);
        assert!(analysis.overall_confidence >= 0.0);

        // The model stays published for later calls
        let again = facade.analyze(&data, None, &[], false).unwrap();
        assert_eq!(again.classification, analysis.classification);
    }

    #[test]
    fn test_market_and_macro_tags() {
        let facade = RegimeAnalysisFacade::new(RegimeConfig::default()).unwrap();
        let data = dataset();
        let rates = MacroSeries::new(
            "rates",
            data.candles
                .iter()
                .enumerate()
                .map(|(i, c)| (c.timestamp, 1.0 + 0.01 * i as f64))
                .collect(),
        );

        let market = generate(&three_regime_segments(), 50.0, 7).unwrap();

        let analysis = facade.analyze(&data, Some(&market), &[rates], true).unwrap();
        assert_ne!(analysis.correlation_regime, CorrelationRegime::Unavailable);
        // About +0.17% per row over the last 20 rows
        assert_eq!(analysis.macro_regime, MacroRegime::Rising);
    }

    #[test]
    fn test_warm_up_outside_window_keeps_confidence() {
        let data = dataset();

        // 500 rows against a 252-row window: warm-up cells fall outside it
        let facade = RegimeAnalysisFacade::new(RegimeConfig::default()).unwrap();
        let analysis = facade.analyze(&data, None, &[], true).unwrap();
        assert_eq!(analysis.sanitized_cells, 0);
        assert_eq!(analysis.classification.window_len, 252);
        assert!((analysis.overall_confidence - analysis.classification.confidence).abs() < 1e-12);

        // A window over the whole frame includes them
        let wide = RegimeAnalysisFacade::new(RegimeConfig::default().with_lookback(500)).unwrap();
        let analysis = wide.analyze(&data, None, &[], true).unwrap();
        assert!(analysis.sanitized_cells > 0);
        assert!(analysis.overall_confidence < analysis.classification.confidence);
    }

    #[test]
    fn test_market_aware_fit_serves_market_aware_analysis() {
        let data = dataset();
        let market = generate(&three_regime_segments(), 50.0, 7).unwrap();

        let facade = RegimeAnalysisFacade::new(RegimeConfig::default()).unwrap();
        facade.fit(&data, Some(&market), &[]).unwrap();

        let analysis = facade.analyze(&data, Some(&market), &[], false).unwrap();
        assert_eq!(analysis.classification.model_version, 1);
        assert!(matches!(
            facade.analyze(&data, None, &[], false),
            Err(RegimeError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_weights_follow_classification() {
        let facade = RegimeAnalysisFacade::new(RegimeConfig::default()).unwrap();
        let base: BTreeMap<String, f64> = ["technical", "lstm", "transformer", "ensemble"]
            .iter()
            .map(|m| (m.to_string(), 0.25))
            .collect();

        let (analysis, weights) = facade
            .analyze_with_weights(&dataset(), None, &[], true, &base)
            .unwrap();
        assert!((weights.total() - 1.0).abs() < 1e-9);
        assert_eq!(weights, facade.model_weights(&analysis, &base));
    }
}
