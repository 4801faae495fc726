//! Z-score standardization fitted once and persisted with the model

use crate::error::{RegimeError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column mean and standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population std; 1.0 for flat columns
    pub scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on training rows
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(RegimeError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| RegimeError::InvalidInput("empty feature matrix".into()))?;
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 && s.is_finite() { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    /// Number of columns the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Apply the stored transform; never refits
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.n_features() {
            return Err(RegimeError::InvalidInput(format!(
                "scaler fitted on {} columns, got {}",
                self.n_features(),
                data.ncols()
            )));
        }
        Ok((data - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_fit_transform() {
        let data = arr2(&[[1.0, 10.0], [3.0, 10.0]]);
        let scaler = StandardScaler::fit(&data).unwrap();

        assert_eq!(scaler.mean[0], 2.0);
        assert_eq!(scaler.scale[0], 1.0);
        // Flat column keeps unit scale
        assert_eq!(scaler.scale[1], 1.0);

        let z = scaler.transform(&data).unwrap();
        assert_eq!(z[[0, 0]], -1.0);
        assert_eq!(z[[1, 0]], 1.0);
        assert_eq!(z[[0, 1]], 0.0);
    }

    #[test]
    fn test_transform_reuses_fitted_parameters() {
        let train = arr2(&[[0.0], [2.0], [4.0]]);
        let scaler = StandardScaler::fit(&train).unwrap();

        let shifted = arr2(&[[100.0], [102.0]]);
        let z = scaler.transform(&shifted).unwrap();
        // A refit would centre these at zero
        assert!(z[[0, 0]] > 10.0);
    }

    #[test]
    fn test_column_mismatch() {
        let scaler = StandardScaler::fit(&arr2(&[[1.0, 2.0]])).unwrap();
        assert!(scaler.transform(&arr2(&[[1.0]])).is_err());
    }
}
