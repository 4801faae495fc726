//! Gaussian Hidden Markov Model implementation

use super::algorithms::{baum_welch_step, forward_backward, log_emissions, viterbi};
use super::gaussian::{CovarianceType, MultivariateGaussian};
use crate::error::{RegimeError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Fitting hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmmSettings {
    /// Number of hidden states
    pub n_states: usize,
    /// Emission covariance structure
    pub covariance_type: CovarianceType,
    /// EM iteration cap
    pub max_iter: usize,
    /// Convergence tolerance on the log-likelihood gain
    pub tol: f64,
    /// Diagonal covariance regularization
    pub min_covar: f64,
    /// k-means restarts for initialization
    pub kmeans_restarts: usize,
    /// Seed for initialization
    pub seed: u64,
}

impl HmmSettings {
    pub fn new(n_states: usize) -> Self {
        Self {
            n_states,
            covariance_type: CovarianceType::Full,
            max_iter: 1000,
            tol: 1e-2,
            min_covar: 1e-3,
            kmeans_restarts: 10,
            seed: 42,
        }
    }
}

/// HMM parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HMMParams {
    /// Number of hidden states
    pub n_states: usize,
    /// Number of features
    pub n_features: usize,
    /// Initial state probabilities
    pub initial_probs: Array1<f64>,
    /// State transition matrix
    pub transition_matrix: Array2<f64>,
    /// Emission distributions (one per state)
    pub emissions: Vec<MultivariateGaussian>,
}

impl HMMParams {
    /// Seeded initial probabilities and a diagonally dominant transition matrix
    pub fn random<R: Rng>(n_states: usize, n_features: usize, rng: &mut R) -> Self {
        let mut initial_probs = Array1::<f64>::zeros(n_states);
        for i in 0..n_states {
            initial_probs[i] = rng.gen::<f64>() + 0.1;
        }
        let sum = initial_probs.sum();
        initial_probs /= sum;

        let mut transition_matrix = Array2::<f64>::zeros((n_states, n_states));
        for i in 0..n_states {
            for j in 0..n_states {
                transition_matrix[[i, j]] = if i == j {
                    0.8 + rng.gen::<f64>() * 0.15
                } else {
                    rng.gen::<f64>() * 0.1 + 1e-3
                };
            }
            let row_sum: f64 = transition_matrix.row(i).sum();
            transition_matrix.row_mut(i).mapv_inplace(|p| p / row_sum);
        }

        let emissions = (0..n_states)
            .map(|_| MultivariateGaussian::with_identity(Array1::zeros(n_features)))
            .collect();

        Self {
            n_states,
            n_features,
            initial_probs,
            transition_matrix,
            emissions,
        }
    }
}

/// Summary of an EM run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// EM iterations performed
    pub iterations: usize,
    /// Final log-likelihood
    pub log_likelihood: f64,
    /// Whether the tolerance was reached
    pub converged: bool,
    /// Log-likelihood per iteration
    pub history: Vec<f64>,
}

/// Gaussian Hidden Markov Model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianHMM {
    /// Model parameters
    pub params: HMMParams,
    /// Fitting hyperparameters
    pub settings: HmmSettings,
    /// Whether the model is trained
    is_fitted: bool,
}

impl GaussianHMM {
    /// Create new untrained HMM
    pub fn new(settings: HmmSettings) -> Self {
        Self {
            params: HMMParams {
                n_states: settings.n_states,
                n_features: 0,
                initial_probs: Array1::zeros(0),
                transition_matrix: Array2::zeros((0, 0)),
                emissions: vec![],
            },
            settings,
            is_fitted: false,
        }
    }

    /// Create with specified parameters
    pub fn with_params(params: HMMParams, settings: HmmSettings) -> Self {
        Self {
            params,
            settings,
            is_fitted: true,
        }
    }

    /// Number of states
    pub fn n_states(&self) -> usize {
        self.settings.n_states
    }

    /// Whether the model is trained
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fit the model to (already standardized) observations with Baum-Welch
    ///
    /// Fails with `Convergence` when the log-likelihood gain is still above
    /// `tol` after `max_iter` iterations, or when it stops being finite.
    pub fn fit(&mut self, observations: &Array2<f64>) -> Result<FitReport> {
        let n_states = self.settings.n_states;
        let n_features = observations.ncols();
        if n_states < 2 {
            return Err(RegimeError::Config(format!(
                "an HMM needs at least 2 states, got {n_states}"
            )));
        }
        let required = 2 * n_states;

        if observations.nrows() < required {
            return Err(RegimeError::InsufficientData {
                required,
                available: observations.nrows(),
            });
        }

        self.is_fitted = false;
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        self.params = HMMParams::random(n_states, n_features, &mut rng);
        self.initialize_emissions_kmeans(observations, &mut rng);

        let mut history = Vec::new();
        let mut prev_ll = f64::NEG_INFINITY;
        let mut last_delta = f64::INFINITY;

        tracing::info!(
            "Fitting {}-state HMM on {} x {} observations",
            n_states,
            observations.nrows(),
            n_features
        );

        for iter in 0..self.settings.max_iter {
            let step = baum_welch_step(
                observations,
                &self.params.initial_probs,
                &self.params.transition_matrix,
                &self.params.emissions,
            );

            if !step.log_likelihood.is_finite() {
                return Err(RegimeError::Convergence {
                    iterations: iter + 1,
                    last_delta: f64::NAN,
                });
            }

            self.params.initial_probs = step.initial_probs;
            self.params.transition_matrix = step.transition_matrix;

            for j in 0..n_states {
                self.params.emissions[j].update_weighted(
                    observations.view(),
                    step.gamma.column(j),
                    self.settings.covariance_type,
                    self.settings.min_covar,
                );
            }

            history.push(step.log_likelihood);
            last_delta = step.log_likelihood - prev_ll;
            prev_ll = step.log_likelihood;

            if (iter + 1) % 10 == 0 {
                tracing::debug!(
                    "Iteration {}: log-likelihood = {:.4}",
                    iter + 1,
                    step.log_likelihood
                );
            }

            if last_delta < self.settings.tol {
                tracing::info!(
                    "Converged after {} iterations (log-likelihood {:.4})",
                    iter + 1,
                    step.log_likelihood
                );
                self.is_fitted = true;
                return Ok(FitReport {
                    iterations: iter + 1,
                    log_likelihood: step.log_likelihood,
                    converged: true,
                    history,
                });
            }
        }

        Err(RegimeError::Convergence {
            iterations: self.settings.max_iter,
            last_delta,
        })
    }

    /// Initialize emissions from the best of several seeded k-means++ runs
    fn initialize_emissions_kmeans(&mut self, observations: &Array2<f64>, rng: &mut StdRng) {
        let k = self.settings.n_states;
        let mut best: Option<(f64, Vec<usize>, Vec<Array1<f64>>)> = None;

        for _ in 0..self.settings.kmeans_restarts.max(1) {
            let (assignments, centers, inertia) = kmeans(observations, k, rng);
            if best.as_ref().map_or(true, |(b, _, _)| inertia < *b) {
                best = Some((inertia, assignments, centers));
            }
        }

        let Some((_, assignments, centers)) = best else {
            return;
        };

        let global = MultivariateGaussian::from_samples(
            observations.view(),
            self.settings.covariance_type,
            self.settings.min_covar,
        );

        for (j, center) in centers.into_iter().enumerate() {
            let members: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(_, &a)| a == j)
                .map(|(i, _)| i)
                .collect();

            self.params.emissions[j] = if members.len() > observations.ncols() {
                let rows = observations.select(Axis(0), &members);
                MultivariateGaussian::from_samples(
                    rows.view(),
                    self.settings.covariance_type,
                    self.settings.min_covar,
                )
            } else {
                MultivariateGaussian::new(center, global.covariance.clone())
            };
        }
    }

    fn ensure_fitted(&self, observations: &Array2<f64>) -> Result<()> {
        if !self.is_fitted {
            return Err(RegimeError::ModelNotTrained);
        }
        if observations.ncols() != self.params.n_features {
            return Err(RegimeError::InvalidInput(format!(
                "model expects {} features, got {}",
                self.params.n_features,
                observations.ncols()
            )));
        }
        Ok(())
    }

    /// Most likely state sequence (Viterbi)
    pub fn predict(&self, observations: &Array2<f64>) -> Result<Vec<usize>> {
        self.ensure_fitted(observations)?;
        let log_b = log_emissions(observations, &self.params.emissions);
        let (path, _) = viterbi(
            &log_b,
            &self.params.initial_probs,
            &self.params.transition_matrix,
        );
        Ok(path)
    }

    /// Posterior state probabilities (forward-backward)
    pub fn predict_proba(&self, observations: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.decode(observations)?.1)
    }

    /// Viterbi path, posteriors and log-likelihood from one emission pass
    pub fn decode(&self, observations: &Array2<f64>) -> Result<(Vec<usize>, Array2<f64>, f64)> {
        self.ensure_fitted(observations)?;
        let log_b = log_emissions(observations, &self.params.emissions);
        let (path, _) = viterbi(
            &log_b,
            &self.params.initial_probs,
            &self.params.transition_matrix,
        );
        let fb = forward_backward(
            &log_b,
            &self.params.initial_probs,
            &self.params.transition_matrix,
        );
        Ok((path, fb.gamma, fb.log_likelihood))
    }

    /// Get log-likelihood of observations
    pub fn score(&self, observations: &Array2<f64>) -> Result<f64> {
        Ok(self.decode(observations)?.2)
    }

    /// Seeded sample of states and observations
    pub fn sample(&self, length: usize, seed: u64) -> Result<(Vec<usize>, Array2<f64>)> {
        if !self.is_fitted {
            return Err(RegimeError::ModelNotTrained);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut states = Vec::with_capacity(length);
        let mut observations = Array2::<f64>::zeros((length, self.params.n_features));

        let mut current_state = sample_discrete(self.params.initial_probs.iter(), &mut rng);
        for t in 0..length {
            if t > 0 {
                current_state = sample_discrete(
                    self.params.transition_matrix.row(current_state).iter(),
                    &mut rng,
                );
            }
            states.push(current_state);
            observations
                .row_mut(t)
                .assign(&self.params.emissions[current_state].sample(&mut rng));
        }

        Ok((states, observations))
    }

    /// Get the transition matrix
    pub fn transition_matrix(&self) -> &Array2<f64> {
        &self.params.transition_matrix
    }

    /// Get emission means for each state
    pub fn emission_means(&self) -> Vec<Array1<f64>> {
        self.params.emissions.iter().map(|e| e.mean.clone()).collect()
    }

    /// Expected dwell time per state, `1 / (1 - A_ii)`
    pub fn expected_durations(&self) -> Vec<f64> {
        (0..self.params.transition_matrix.nrows())
            .map(|i| {
                let stay = self.params.transition_matrix[[i, i]];
                if stay < 1.0 {
                    1.0 / (1.0 - stay)
                } else {
                    f64::INFINITY
                }
            })
            .collect()
    }

    /// Calculate AIC (Akaike Information Criterion)
    pub fn aic(&self, observations: &Array2<f64>) -> Result<f64> {
        let log_ll = self.score(observations)?;
        Ok(2.0 * self.count_parameters() as f64 - 2.0 * log_ll)
    }

    /// Calculate BIC (Bayesian Information Criterion)
    pub fn bic(&self, observations: &Array2<f64>) -> Result<f64> {
        let log_ll = self.score(observations)?;
        let n_samples = observations.nrows() as f64;
        Ok(self.count_parameters() as f64 * n_samples.ln() - 2.0 * log_ll)
    }

    /// Count number of free parameters
    fn count_parameters(&self) -> usize {
        let n = self.params.n_states;
        let d = self.params.n_features;

        let covariance = match self.settings.covariance_type {
            CovarianceType::Full => n * d * (d + 1) / 2,
            CovarianceType::Diagonal => n * d,
        };

        n.saturating_sub(1) + n * n.saturating_sub(1) + n * d + covariance
    }
}

/// k-means++ seeding followed by Lloyd iterations
///
/// Returns assignments, centers and inertia.
fn kmeans<R: Rng>(observations: &Array2<f64>, k: usize, rng: &mut R) -> (Vec<usize>, Vec<Array1<f64>>, f64) {
    let n = observations.nrows();
    let sq_dist = |i: usize, c: &Array1<f64>| -> f64 {
        observations
            .row(i)
            .iter()
            .zip(c.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum()
    };

    let mut centers: Vec<Array1<f64>> = vec![observations.row(rng.gen_range(0..n)).to_owned()];
    while centers.len() < k {
        let d2: Vec<f64> = (0..n)
            .map(|i| centers.iter().map(|c| sq_dist(i, c)).fold(f64::INFINITY, f64::min))
            .collect();
        let total: f64 = d2.iter().sum();
        let idx = if total > 0.0 {
            sample_discrete(d2.iter().map(|d| d / total).collect::<Vec<_>>().iter(), rng)
        } else {
            rng.gen_range(0..n)
        };
        centers.push(observations.row(idx).to_owned());
    }

    let mut assignments = vec![0; n];
    for _ in 0..100 {
        let mut changed = false;
        for (i, slot) in assignments.iter_mut().enumerate() {
            let mut best = *slot;
            let mut best_dist = f64::INFINITY;
            for (j, c) in centers.iter().enumerate() {
                let dist = sq_dist(i, c);
                if dist < best_dist {
                    best_dist = dist;
                    best = j;
                }
            }
            if best != *slot {
                *slot = best;
                changed = true;
            }
        }

        for (j, center) in centers.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| assignments[i] == j).collect();
            if !members.is_empty() {
                *center = observations
                    .select(Axis(0), &members)
                    .mean_axis(Axis(0))
                    .unwrap_or_else(|| center.clone());
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = (0..n).map(|i| sq_dist(i, &centers[assignments[i]])).sum();
    (assignments, centers, inertia)
}

/// Sample from discrete distribution
fn sample_discrete<'a, I, R>(probs: I, rng: &mut R) -> usize
where
    I: ExactSizeIterator<Item = &'a f64>,
    R: Rng,
{
    let len = probs.len();
    let u: f64 = rng.gen();
    let mut cumsum = 0.0;
    for (i, &p) in probs.enumerate() {
        cumsum += p;
        if u < cumsum {
            return i;
        }
    }
    len.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};

    fn two_state_truth() -> GaussianHMM {
        let params = HMMParams {
            n_states: 2,
            n_features: 2,
            initial_probs: array![0.5, 0.5],
            transition_matrix: arr2(&[[0.95, 0.05], [0.05, 0.95]]),
            emissions: vec![
                MultivariateGaussian::new(array![-2.0, 0.0], Array2::eye(2) * 0.5),
                MultivariateGaussian::new(array![2.0, 1.0], Array2::eye(2) * 0.5),
            ],
        };
        GaussianHMM::with_params(params, HmmSettings::new(2))
    }

    #[test]
    fn test_hmm_creation() {
        let hmm = GaussianHMM::new(HmmSettings::new(3));
        assert_eq!(hmm.n_states(), 3);
        assert!(!hmm.is_fitted());
    }

    #[test]
    fn test_hmm_params_random() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = HMMParams::random(3, 5, &mut rng);
        assert_eq!(params.n_states, 3);
        assert_eq!(params.n_features, 5);

        assert!((params.initial_probs.sum() - 1.0).abs() < 1e-9);
        for i in 0..3 {
            assert!((params.transition_matrix.row(i).sum() - 1.0).abs() < 1e-9);
            assert!(params.transition_matrix[[i, i]] > 0.5);
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let hmm = GaussianHMM::new(HmmSettings::new(2));
        let obs = Array2::zeros((5, 2));
        assert!(matches!(hmm.predict(&obs), Err(RegimeError::ModelNotTrained)));
    }

    #[test]
    fn test_fit_recovers_sampled_states() {
        let truth = two_state_truth();
        let (states, observations) = truth.sample(400, 11).unwrap();

        let mut hmm = GaussianHMM::new(HmmSettings::new(2));
        let report = hmm.fit(&observations).unwrap();
        assert!(report.converged);
        assert!(report.iterations >= 1);

        let decoded = hmm.predict(&observations).unwrap();
        let agree = decoded.iter().zip(&states).filter(|(a, b)| a == b).count();
        // Labels may be permuted
        let accuracy = agree.max(states.len() - agree) as f64 / states.len() as f64;
        assert!(accuracy > 0.95, "accuracy {accuracy}");
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let (_, observations) = two_state_truth().sample(200, 5).unwrap();

        let mut a = GaussianHMM::new(HmmSettings::new(2));
        let mut b = GaussianHMM::new(HmmSettings::new(2));
        let ra = a.fit(&observations).unwrap();
        let rb = b.fit(&observations).unwrap();

        assert_eq!(ra, rb);
        assert_eq!(a.predict_proba(&observations).unwrap(), b.predict_proba(&observations).unwrap());
    }

    #[test]
    fn test_log_likelihood_non_decreasing() {
        let (_, observations) = two_state_truth().sample(300, 9).unwrap();
        let mut hmm = GaussianHMM::new(HmmSettings::new(2));
        let report = hmm.fit(&observations).unwrap();

        for w in report.history.windows(2) {
            assert!(w[1] >= w[0] - 1e-6);
        }
    }

    #[test]
    fn test_convergence_error_on_iteration_cap() {
        let (_, observations) = two_state_truth().sample(300, 9).unwrap();
        let mut settings = HmmSettings::new(2);
        settings.max_iter = 1;
        let mut hmm = GaussianHMM::new(settings);

        let err = hmm.fit(&observations).unwrap_err();
        assert!(matches!(err, RegimeError::Convergence { iterations: 1, .. }));
        assert!(!hmm.is_fitted());
    }

    #[test]
    fn test_too_few_rows() {
        let mut hmm = GaussianHMM::new(HmmSettings::new(3));
        let err = hmm.fit(&Array2::zeros((4, 2))).unwrap_err();
        assert!(matches!(err, RegimeError::InsufficientData { required: 6, .. }));
    }

    #[test]
    fn test_fit_with_diagonal_covariance() {
        let truth = two_state_truth();
        let (states, observations) = truth.sample(400, 11).unwrap();

        let mut settings = HmmSettings::new(2);
        settings.covariance_type = CovarianceType::Diagonal;
        let mut hmm = GaussianHMM::new(settings);
        let report = hmm.fit(&observations).unwrap();
        assert!(report.converged);

        for emission in &hmm.params.emissions {
            assert_eq!(emission.covariance[[0, 1]], 0.0);
            assert_eq!(emission.covariance[[1, 0]], 0.0);
        }

        let decoded = hmm.predict(&observations).unwrap();
        let agree = decoded.iter().zip(&states).filter(|(a, b)| a == b).count();
        let accuracy = agree.max(states.len() - agree) as f64 / states.len() as f64;
        assert!(accuracy > 0.95, "accuracy {accuracy}");
    }

    #[test]
    fn test_fewer_than_two_states_rejected() {
        let (_, observations) = two_state_truth().sample(50, 3).unwrap();
        for n_states in [0, 1] {
            let mut hmm = GaussianHMM::new(HmmSettings::new(n_states));
            assert!(matches!(hmm.fit(&observations), Err(RegimeError::Config(_))));
            assert!(!hmm.is_fitted());
        }
    }

    #[test]
    fn test_expected_durations() {
        let durations = two_state_truth().expected_durations();
        assert!((durations[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_bic_penalizes_more_than_aic() {
        let truth = two_state_truth();
        let (_, observations) = truth.sample(100, 2).unwrap();
        assert!(truth.bic(&observations).unwrap() > truth.aic(&observations).unwrap());
    }

    #[test]
    fn test_sample_discrete() {
        let mut rng = StdRng::seed_from_u64(0);
        let probs = [0.0, 1.0, 0.0];
        assert_eq!(sample_discrete(probs.iter(), &mut rng), 1);
    }
}
