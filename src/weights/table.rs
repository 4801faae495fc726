//! Declarative per-regime bias rules

use crate::error::{RegimeError, Result};
use crate::regime::RegimeLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scale one model's weight and cap the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasRule {
    pub model: String,
    pub multiplier: f64,
    pub cap: f64,
}

impl BiasRule {
    pub fn new(model: &str, multiplier: f64, cap: f64) -> Self {
        Self {
            model: model.to_string(),
            multiplier,
            cap,
        }
    }

    /// `min(weight * multiplier, cap)`
    pub fn apply(&self, weight: f64) -> f64 {
        (weight * self.multiplier).min(self.cap)
    }
}

/// Regime name to the rules applied in that regime
///
/// Keys are regime names as displayed (`Bear`, `Bull`, ...) so the table
/// reads the same in TOML and JSON configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiasTable(BTreeMap<String, Vec<BiasRule>>);

impl Default for BiasTable {
    fn default() -> Self {
        Self::empty()
            .with_rules(
                RegimeLabel::Bear,
                vec![
                    BiasRule::new("technical", 1.5, 0.4),
                    BiasRule::new("lstm", 1.3, 0.35),
                ],
            )
            .with_rules(
                RegimeLabel::Bull,
                vec![
                    BiasRule::new("transformer", 1.5, 0.4),
                    BiasRule::new("ensemble", 1.2, 0.4),
                ],
            )
            .with_rules(
                RegimeLabel::Volatile,
                vec![
                    BiasRule::new("ensemble", 1.3, 0.4),
                    BiasRule::new("lstm", 1.2, 0.35),
                ],
            )
    }
}

impl BiasTable {
    /// Table with no rules
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Replace the rules for one regime
    pub fn with_rules(mut self, regime: RegimeLabel, rules: Vec<BiasRule>) -> Self {
        self.0.insert(regime.to_string(), rules);
        self
    }

    /// Rules for a regime; empty when the regime has none
    pub fn rules(&self, regime: RegimeLabel) -> &[BiasRule] {
        self.0
            .get(&regime.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reject unknown regime names and non-finite or negative factors
    pub fn validate(&self) -> Result<()> {
        for (regime, rules) in &self.0 {
            regime.parse::<RegimeLabel>().map_err(|_| {
                RegimeError::Config(format!("bias table names unknown regime '{regime}'"))
            })?;
            for rule in rules {
                if !rule.multiplier.is_finite() || rule.multiplier < 0.0 {
                    return Err(RegimeError::Config(format!(
                        "{regime}/{}: multiplier must be finite and non-negative",
                        rule.model
                    )));
                }
                if !rule.cap.is_finite() || rule.cap < 0.0 {
                    return Err(RegimeError::Config(format!(
                        "{regime}/{}: cap must be finite and non-negative",
                        rule.model
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let table = BiasTable::default();
        assert_eq!(table.rules(RegimeLabel::Bear)[0], BiasRule::new("technical", 1.5, 0.4));
        assert_eq!(table.rules(RegimeLabel::Volatile).len(), 2);
        assert!(table.rules(RegimeLabel::Sideways).is_empty());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_rule_caps() {
        let rule = BiasRule::new("lstm", 1.3, 0.35);
        assert!((rule.apply(0.25) - 0.325).abs() < 1e-12);
        assert_eq!(rule.apply(0.5), 0.35);
    }

    #[test]
    fn test_from_toml() {
        let table: BiasTable = toml::from_str(
            r#"
            [[Sideways]]
            model = "arima"
            multiplier = 2.0
            cap = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(table.rules(RegimeLabel::Sideways)[0].model, "arima");
        assert!(table.rules(RegimeLabel::Bear).is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let negative = BiasTable::empty()
            .with_rules(RegimeLabel::Bull, vec![BiasRule::new("x", -1.0, 0.4)]);
        assert!(negative.validate().is_err());

        let unknown: BiasTable =
            serde_json::from_str(r#"{"Crab": [{"model": "x", "multiplier": 1.0, "cap": 1.0}]}"#)
                .unwrap();
        assert!(matches!(unknown.validate(), Err(RegimeError::Config(_))));
    }
}
