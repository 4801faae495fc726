//! Normalized model weights

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Model name to weight, ordered by name
///
/// Built by the mapper; weights are non-negative and sum to 1 unless empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<String, f64>);

impl WeightVector {
    /// Equal weight for every name
    pub fn uniform<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let n = names.len();
        Self(names.into_iter().map(|name| (name, 1.0 / n as f64)).collect())
    }

    pub(crate) fn from_map(weights: BTreeMap<String, f64>) -> Self {
        Self(weights)
    }

    /// Weight of a model, `None` if unknown
    pub fn get(&self, model: &str) -> Option<f64> {
        self.0.get(model).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all weights
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy out as a plain map
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.0.clone()
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(model, weight)| format!("{model}={weight:.3}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
