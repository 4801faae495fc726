//! Multivariate Gaussian distribution for HMM emissions

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Covariance structure of the emission distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    /// Full covariance matrix per state
    #[default]
    Full,
    /// Independent features per state
    Diagonal,
}

/// Multivariate Gaussian distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultivariateGaussian {
    /// Mean vector
    pub mean: Array1<f64>,
    /// Covariance matrix
    pub covariance: Array2<f64>,
    /// Lower Cholesky factor of the covariance
    cholesky: Array2<f64>,
    /// Log determinant of the covariance
    log_det: f64,
}

impl MultivariateGaussian {
    /// Create new multivariate Gaussian
    pub fn new(mean: Array1<f64>, covariance: Array2<f64>) -> Self {
        let d = mean.len();
        let mut gaussian = Self {
            mean,
            covariance,
            cholesky: Array2::eye(d),
            log_det: 0.0,
        };
        gaussian.update_cache();
        gaussian
    }

    /// Create with identity covariance
    pub fn with_identity(mean: Array1<f64>) -> Self {
        let d = mean.len();
        Self::new(mean, Array2::eye(d))
    }

    /// Maximum likelihood estimate from samples
    pub fn from_samples(
        samples: ArrayView2<f64>,
        covariance_type: CovarianceType,
        min_covar: f64,
    ) -> Self {
        let weights = Array1::<f64>::ones(samples.nrows());
        let mut gaussian = Self::with_identity(Array1::zeros(samples.ncols()));
        gaussian.update_weighted(samples, weights.view(), covariance_type, min_covar);
        gaussian
    }

    /// Dimension of the distribution
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Log determinant of the covariance
    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    /// Recompute the Cholesky factor after parameter changes
    ///
    /// Adds increasing diagonal jitter when the matrix is not positive
    /// definite, and falls back to the diagonal as a last resort.
    pub fn update_cache(&mut self) {
        let d = self.dim();
        let mut jitter = 0.0;

        for _ in 0..8 {
            let mut candidate = self.covariance.clone();
            for i in 0..d {
                candidate[[i, i]] += jitter;
            }
            if let Some(l) = cholesky(&candidate) {
                self.log_det = 2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>();
                self.cholesky = l;
                self.covariance = candidate;
                return;
            }
            jitter = if jitter == 0.0 { 1e-6 } else { jitter * 10.0 };
        }

        tracing::warn!("Covariance not positive definite, falling back to diagonal");
        let mut diagonal = Array2::zeros((d, d));
        for i in 0..d {
            diagonal[[i, i]] = self.covariance[[i, i]].abs().max(1e-6);
        }
        let l = diagonal.mapv(f64::sqrt);
        self.log_det = diagonal.diag().iter().map(|v| v.ln()).sum();
        self.cholesky = l;
        self.covariance = diagonal;
    }

    /// Compute log probability density at a point
    pub fn log_pdf(&self, x: ArrayView1<f64>) -> f64 {
        let d = self.dim();

        // Solve L y = (x - mu); the quadratic form is |y|^2
        let mut y = vec![0.0; d];
        for i in 0..d {
            let mut acc = x[i] - self.mean[i];
            for k in 0..i {
                acc -= self.cholesky[[i, k]] * y[k];
            }
            y[i] = acc / self.cholesky[[i, i]];
        }
        let quad_form: f64 = y.iter().map(|v| v * v).sum();

        -0.5 * (d as f64 * (2.0 * PI).ln() + self.log_det + quad_form)
    }

    /// Compute probability density at a point
    pub fn pdf(&self, x: ArrayView1<f64>) -> f64 {
        self.log_pdf(x).exp()
    }

    /// Draw a sample as `mu + L z` with `z ~ N(0, I)`
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        let z: Array1<f64> = (0..self.dim()).map(|_| rng.sample(StandardNormal)).collect();
        &self.mean + &self.cholesky.dot(&z)
    }

    /// Update parameters with weighted samples (M-step)
    ///
    /// Leaves the distribution unchanged when the weights carry no mass.
    pub fn update_weighted(
        &mut self,
        samples: ArrayView2<f64>,
        weights: ArrayView1<f64>,
        covariance_type: CovarianceType,
        min_covar: f64,
    ) {
        let d = samples.ncols();
        let weight_sum = weights.sum();

        if weight_sum < 1e-10 {
            return;
        }

        let weighted = &samples * &weights.insert_axis(Axis(1));
        let new_mean = weighted.sum_axis(Axis(0)) / weight_sum;

        let centered = &samples - &new_mean;
        let mut new_cov = match covariance_type {
            CovarianceType::Full => {
                let scaled = &centered * &weights.insert_axis(Axis(1));
                scaled.t().dot(&centered) / weight_sum
            }
            CovarianceType::Diagonal => {
                let var = (&centered * &centered * &weights.insert_axis(Axis(1)))
                    .sum_axis(Axis(0))
                    / weight_sum;
                Array2::from_diag(&var)
            }
        };

        for i in 0..d {
            new_cov[[i, i]] += min_covar;
        }

        self.mean = new_mean;
        self.covariance = new_cov;
        self.update_cache();
    }
}

/// Lower Cholesky factor, `None` if the matrix is not positive definite
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(sum > 1e-12) || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    Some(l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, array};

    #[test]
    fn test_gaussian_creation() {
        let g = MultivariateGaussian::new(array![0.0, 0.0], Array2::eye(2));
        assert_eq!(g.dim(), 2);
        assert!(g.log_det().abs() < 1e-12);
    }

    #[test]
    fn test_standard_normal_log_pdf() {
        let g = MultivariateGaussian::with_identity(array![0.0]);
        let expected = -0.5 * (2.0 * PI).ln();
        assert!((g.log_pdf(array![0.0].view()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_pdf_at_mean() {
        let mean = array![0.0, 0.0];
        let g = MultivariateGaussian::new(mean.clone(), Array2::eye(2));
        assert!(g.pdf(mean.view()) > g.pdf(array![1.0, 1.0].view()));
    }

    #[test]
    fn test_full_covariance_log_pdf() {
        // det = 0.75, inverse = [[4/3, -2/3], [-2/3, 4/3]]
        let cov = arr2(&[[1.0, 0.5], [0.5, 1.0]]);
        let g = MultivariateGaussian::new(array![0.0, 0.0], cov);
        let x = array![1.0, 0.0];
        let quad = 4.0 / 3.0;
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + 0.75f64.ln() + quad);
        assert!((g.log_pdf(x.view()) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        assert!(cholesky(&arr2(&[[1.0, 2.0], [2.0, 1.0]])).is_none());
        let l = cholesky(&arr2(&[[4.0, 2.0], [2.0, 3.0]])).unwrap();
        assert!((l[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((l[[1, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_covariance_recovers() {
        let g = MultivariateGaussian::new(array![0.0, 0.0], arr2(&[[1.0, 1.0], [1.0, 1.0]]));
        assert!(g.log_pdf(array![0.5, 0.5].view()).is_finite());
    }

    #[test]
    fn test_from_samples() {
        let samples = arr2(&[[1.0, 2.0], [1.5, 2.5], [0.5, 1.5], [1.0, 2.0]]);
        let g = MultivariateGaussian::from_samples(samples.view(), CovarianceType::Full, 1e-6);
        assert!((g.mean[0] - 1.0).abs() < 1e-12);
        assert!((g.mean[1] - 2.0).abs() < 1e-12);
        assert!((g.covariance[[0, 1]] - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_update_has_no_cross_terms() {
        let samples = arr2(&[[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]]);
        let g = MultivariateGaussian::from_samples(samples.view(), CovarianceType::Diagonal, 1e-3);
        assert_eq!(g.covariance[[0, 1]], 0.0);
        assert!(g.covariance[[0, 0]] > 0.6);
    }

    #[test]
    fn test_sample_moments() {
        use rand::SeedableRng;

        let cov = arr2(&[[4.0, 1.0], [1.0, 1.0]]);
        let g = MultivariateGaussian::new(array![1.0, -1.0], cov);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);

        let n = 20_000;
        let mut samples = Array2::<f64>::zeros((n, 2));
        for i in 0..n {
            samples.row_mut(i).assign(&g.sample(&mut rng));
        }
        let fitted = MultivariateGaussian::from_samples(samples.view(), CovarianceType::Full, 1e-9);

        assert!((fitted.mean[0] - 1.0).abs() < 0.1);
        assert!((fitted.mean[1] + 1.0).abs() < 0.05);
        assert!((fitted.covariance[[0, 0]] - 4.0).abs() < 0.2);
        assert!((fitted.covariance[[0, 1]] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_zero_weights_keep_parameters() {
        let samples = arr2(&[[1.0], [2.0]]);
        let mut g = MultivariateGaussian::with_identity(array![5.0]);
        g.update_weighted(samples.view(), array![0.0, 0.0].view(), CovarianceType::Full, 1e-3);
        assert_eq!(g.mean[0], 5.0);
    }
}
