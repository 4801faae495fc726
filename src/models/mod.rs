//! HMM models module
//!
//! Provides the Gaussian HMM (Viterbi, Forward-Backward, Baum-Welch), the
//! persisted feature scaler and the trained `RegimeModel` built from both.

mod algorithms;
mod gaussian;
mod hmm;
mod regime_model;
mod scaler;

pub use algorithms::{baum_welch_step, forward_backward, log_emissions, viterbi};
pub use gaussian::{CovarianceType, MultivariateGaussian};
pub use hmm::{FitReport, GaussianHMM, HMMParams, HmmSettings};
pub use regime_model::{DecodedSequence, RegimeModel};
pub use scaler::StandardScaler;
