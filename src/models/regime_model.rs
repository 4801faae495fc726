//! Trained regime model: scaler, HMM, feature schema and state labels

use super::hmm::{FitReport, GaussianHMM, HmmSettings};
use super::scaler::StandardScaler;
use crate::config::RegimeConfig;
use crate::data::features::{RETURN, VOLATILITY};
use crate::data::FeatureFrame;
use crate::error::{RegimeError, Result};
use crate::regime::{rank_states, RegimeLabel};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Decoded state path with posteriors
#[derive(Debug, Clone)]
pub struct DecodedSequence {
    /// Viterbi state per row
    pub states: Vec<usize>,
    /// Forward-backward posteriors (T x K)
    pub posteriors: Array2<f64>,
    /// Log-likelihood of the window
    pub log_likelihood: f64,
}

impl DecodedSequence {
    /// Number of decoded rows
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when nothing was decoded
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Gaussian HMM over standardized features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeModel {
    hmm: GaussianHMM,
    scaler: Option<StandardScaler>,
    feature_names: Vec<String>,
    labels: Vec<RegimeLabel>,
    report: Option<FitReport>,
    min_history: usize,
    version: u64,
    trained: bool,
}

impl RegimeModel {
    /// Create an untrained model
    pub fn new(settings: HmmSettings, min_history: usize) -> Self {
        Self {
            hmm: GaussianHMM::new(settings),
            scaler: None,
            feature_names: Vec::new(),
            labels: Vec::new(),
            report: None,
            min_history,
            version: 0,
            trained: false,
        }
    }

    /// Create an untrained model from configuration
    pub fn from_config(config: &RegimeConfig) -> Self {
        let settings = HmmSettings {
            n_states: config.n_regimes,
            covariance_type: config.covariance_type,
            max_iter: config.max_em_iterations,
            tol: config.em_tol,
            min_covar: config.min_covar,
            kmeans_restarts: config.kmeans_restarts,
            seed: config.random_seed,
        };
        Self::new(settings, config.min_history())
    }

    /// Continue numbering after an earlier model
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Fit scaler, HMM and labels on a feature frame
    pub fn fit(&mut self, frame: &FeatureFrame) -> Result<FitReport> {
        let k = self.hmm.n_states();
        if k < 2 {
            return Err(RegimeError::Config(format!(
                "n_regimes must be at least 2, got {k}"
            )));
        }
        if frame.n_samples() < self.min_history {
            return Err(RegimeError::InsufficientData {
                required: self.min_history,
                available: frame.n_samples(),
            });
        }
        let return_idx = required_column(frame, RETURN)?;
        let volatility_idx = required_column(frame, VOLATILITY)?;

        self.trained = false;
        let scaler = StandardScaler::fit(&frame.data)?;
        let observations = scaler.transform(&frame.data)?;
        let report = self.hmm.fit(&observations)?;

        // Scaling is monotone per column, so standardized means rank the same
        let means = self.hmm.emission_means();
        let mean_returns: Vec<f64> = means.iter().map(|m| m[return_idx]).collect();
        let mean_vols: Vec<f64> = means.iter().map(|m| m[volatility_idx]).collect();
        self.labels = rank_states(&mean_returns, &mean_vols);

        self.scaler = Some(scaler);
        self.feature_names = frame.names.clone();
        self.report = Some(report.clone());
        self.version += 1;
        self.trained = true;

        tracing::info!(
            version = self.version,
            iterations = report.iterations,
            "Regime model fitted, labels {:?}",
            self.labels
        );

        Ok(report)
    }

    /// Decode a frame with the fit-time scaler
    pub fn predict(&self, frame: &FeatureFrame) -> Result<DecodedSequence> {
        let scaler = match (&self.scaler, self.trained) {
            (Some(scaler), true) => scaler,
            _ => return Err(RegimeError::ModelNotTrained),
        };
        self.check_schema(frame)?;
        if frame.is_empty() {
            return Err(RegimeError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let observations = scaler.transform(&frame.data)?;
        let (states, posteriors, log_likelihood) = self.hmm.decode(&observations)?;

        Ok(DecodedSequence {
            states,
            posteriors,
            log_likelihood,
        })
    }

    /// Log-likelihood of a frame under the model
    pub fn score(&self, frame: &FeatureFrame) -> Result<f64> {
        Ok(self.predict(frame)?.log_likelihood)
    }

    /// Akaike information criterion on a frame
    pub fn aic(&self, frame: &FeatureFrame) -> Result<f64> {
        self.hmm.aic(&self.standardize(frame)?)
    }

    /// Bayesian information criterion on a frame
    pub fn bic(&self, frame: &FeatureFrame) -> Result<f64> {
        self.hmm.bic(&self.standardize(frame)?)
    }

    fn standardize(&self, frame: &FeatureFrame) -> Result<Array2<f64>> {
        let scaler = match (&self.scaler, self.trained) {
            (Some(scaler), true) => scaler,
            _ => return Err(RegimeError::ModelNotTrained),
        };
        self.check_schema(frame)?;
        scaler.transform(&frame.data)
    }

    fn check_schema(&self, frame: &FeatureFrame) -> Result<()> {
        if frame.names != self.feature_names {
            return Err(RegimeError::SchemaMismatch {
                expected: self.feature_names.clone(),
                found: frame.names.clone(),
            });
        }
        Ok(())
    }

    /// Whether `predict` may be called
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Number of hidden states
    pub fn n_regimes(&self) -> usize {
        self.hmm.n_states()
    }

    /// Label of every state, indexed by state id
    pub fn labels(&self) -> &[RegimeLabel] {
        &self.labels
    }

    /// Label of one state
    pub fn label(&self, state_id: usize) -> Option<RegimeLabel> {
        self.labels.get(state_id).copied()
    }

    /// Fit-time feature schema
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Persisted scaler
    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    /// Last fit report
    pub fn fit_report(&self) -> Option<&FitReport> {
        self.report.as_ref()
    }

    /// Increments on every successful fit
    pub fn version(&self) -> u64 {
        self.version
    }

    /// State transition matrix
    pub fn transition_matrix(&self) -> &Array2<f64> {
        self.hmm.transition_matrix()
    }

    /// Emission means in original feature units
    pub fn emission_means(&self) -> Vec<Array1<f64>> {
        let means = self.hmm.emission_means();
        match &self.scaler {
            Some(scaler) => means
                .into_iter()
                .map(|m| &m * &scaler.scale + &scaler.mean)
                .collect(),
            None => means,
        }
    }

    /// Expected dwell time per state in rows
    pub fn expected_durations(&self) -> Vec<f64> {
        self.hmm.expected_durations()
    }

    /// Encode the model as opaque bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a model produced by `to_bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn required_column(frame: &FeatureFrame, name: &str) -> Result<usize> {
    frame
        .column_index(name)
        .ok_or_else(|| RegimeError::InvalidInput(format!("feature frame has no '{name}' column")))
}
