//! Regime-aware model weighting

use super::table::BiasTable;
use super::vector::WeightVector;
use crate::config::RegimeConfig;
use crate::error::{RegimeError, Result};
use crate::regime::RegimeLabel;
use std::collections::BTreeMap;

/// Maps (regime, confidence, base weights) to a normalized weight vector.
///
/// Stateless: the same inputs always give the same output. Below the
/// confidence threshold the result is uniform over the base models.
#[derive(Debug, Clone)]
pub struct WeightMapper {
    table: BiasTable,
    confidence_threshold: f64,
}

impl Default for WeightMapper {
    fn default() -> Self {
        Self::new(BiasTable::default(), 0.8)
    }
}

impl WeightMapper {
    pub fn new(table: BiasTable, confidence_threshold: f64) -> Self {
        Self {
            table,
            confidence_threshold,
        }
    }

    pub fn from_config(config: &RegimeConfig) -> Self {
        Self::new(config.bias_table.clone(), config.regime_confidence_threshold)
    }

    pub fn table(&self) -> &BiasTable {
        &self.table
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Bias, gate and normalize `base_weights`
    pub fn map(
        &self,
        regime_id: usize,
        regime_name: RegimeLabel,
        confidence: f64,
        base_weights: &BTreeMap<String, f64>,
    ) -> WeightVector {
        if base_weights.is_empty() {
            return WeightVector::default();
        }

        if !(confidence >= self.confidence_threshold) {
            tracing::debug!(
                regime_id,
                confidence,
                threshold = self.confidence_threshold,
                "Confidence below threshold, using uniform weights"
            );
            return WeightVector::uniform(base_weights.keys().cloned());
        }

        let mut weights: BTreeMap<String, f64> = base_weights
            .iter()
            .map(|(model, w)| {
                let w = if w.is_finite() { w.max(0.0) } else { 0.0 };
                (model.clone(), w)
            })
            .collect();

        for rule in self.table.rules(regime_name) {
            if let Some(w) = weights.get_mut(&rule.model) {
                *w = rule.apply(*w).max(0.0);
            }
        }

        match normalize(weights) {
            Ok(weights) => {
                tracing::debug!(regime_id, regime = %regime_name, "Applied regime bias");
                weights
            }
            Err(e) => {
                tracing::warn!("{e}, falling back to uniform weights");
                WeightVector::uniform(base_weights.keys().cloned())
            }
        }
    }
}

fn normalize(mut weights: BTreeMap<String, f64>) -> Result<WeightVector> {
    let total: f64 = weights.values().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(RegimeError::DegenerateWeights);
    }
    for w in weights.values_mut() {
        *w /= total;
    }
    Ok(WeightVector::from_map(weights))
}
