//! HMM algorithms: Viterbi, Forward-Backward, Baum-Welch
//!
//! Emission likelihoods are kept in log space. Forward-backward shifts every
//! row by its maximum before exponentiating and adds the shift back into the
//! log-likelihood, so long or high-dimensional sequences do not underflow.

use super::gaussian::MultivariateGaussian;
use ndarray::{Array1, Array2};

const TINY: f64 = 1e-300;

/// Log emission densities (T x N)
pub fn log_emissions(observations: &Array2<f64>, emissions: &[MultivariateGaussian]) -> Array2<f64> {
    let t = observations.nrows();
    let n = emissions.len();
    let mut log_b = Array2::<f64>::zeros((t, n));

    for (t_idx, obs) in observations.rows().into_iter().enumerate() {
        for (j, emission) in emissions.iter().enumerate() {
            log_b[[t_idx, j]] = emission.log_pdf(obs);
        }
    }

    log_b
}

/// Viterbi algorithm - finds most likely state sequence
///
/// # Arguments
/// * `log_b` - Log emission densities (T x N)
/// * `initial_probs` - Initial state probabilities (N)
/// * `transition_matrix` - State transition probabilities (N x N)
///
/// # Returns
/// Most likely state sequence and its log probability
pub fn viterbi(
    log_b: &Array2<f64>,
    initial_probs: &Array1<f64>,
    transition_matrix: &Array2<f64>,
) -> (Vec<usize>, f64) {
    let t = log_b.nrows();
    let n = initial_probs.len();

    if t == 0 {
        return (vec![], 0.0);
    }

    let log_initial: Array1<f64> = initial_probs.mapv(|p| (p + TINY).ln());
    let log_trans: Array2<f64> = transition_matrix.mapv(|p| (p + TINY).ln());

    // Delta: best path log probability ending in state j at time t
    let mut delta = Array2::<f64>::zeros((t, n));
    // Psi: backpointers for path reconstruction
    let mut psi = Array2::<usize>::zeros((t, n));

    for j in 0..n {
        delta[[0, j]] = log_initial[j] + log_b[[0, j]];
    }

    for t_idx in 1..t {
        for j in 0..n {
            let mut best_val = f64::NEG_INFINITY;
            let mut best_state = 0;

            for i in 0..n {
                let val = delta[[t_idx - 1, i]] + log_trans[[i, j]];
                if val > best_val {
                    best_val = val;
                    best_state = i;
                }
            }

            delta[[t_idx, j]] = best_val + log_b[[t_idx, j]];
            psi[[t_idx, j]] = best_state;
        }
    }

    // Termination; ties resolve to the lowest index
    let mut best_final_state = 0;
    let mut best_final_prob = f64::NEG_INFINITY;
    for j in 0..n {
        if delta[[t - 1, j]] > best_final_prob {
            best_final_prob = delta[[t - 1, j]];
            best_final_state = j;
        }
    }

    let mut path = vec![0; t];
    path[t - 1] = best_final_state;
    for t_idx in (0..t - 1).rev() {
        path[t_idx] = psi[[t_idx + 1, path[t_idx + 1]]];
    }

    (path, best_final_prob)
}

/// Output of the forward-backward pass
#[derive(Debug, Clone)]
pub struct ForwardBackward {
    /// Posterior state probabilities (T x N)
    pub gamma: Array2<f64>,
    /// Expected transition counts summed over time (N x N)
    pub xi_sum: Array2<f64>,
    /// log P(observations | model)
    pub log_likelihood: f64,
}

/// Forward-Backward algorithm - computes state posteriors and expected transitions
pub fn forward_backward(
    log_b: &Array2<f64>,
    initial_probs: &Array1<f64>,
    transition_matrix: &Array2<f64>,
) -> ForwardBackward {
    let t = log_b.nrows();
    let n = initial_probs.len();

    if t == 0 {
        return ForwardBackward {
            gamma: Array2::zeros((0, n)),
            xi_sum: Array2::zeros((n, n)),
            log_likelihood: 0.0,
        };
    }

    // Row-shifted emission likelihoods
    let mut shift = Array1::<f64>::zeros(t);
    let mut b = Array2::<f64>::zeros((t, n));
    for t_idx in 0..t {
        let row_max = log_b
            .row(t_idx)
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let row_max = if row_max.is_finite() { row_max } else { 0.0 };
        shift[t_idx] = row_max;
        for j in 0..n {
            b[[t_idx, j]] = (log_b[[t_idx, j]] - row_max).exp();
        }
    }

    // Forward pass with per-step scaling
    let mut alpha = Array2::<f64>::zeros((t, n));
    let mut scale = Array1::<f64>::zeros(t);

    for j in 0..n {
        alpha[[0, j]] = initial_probs[j] * b[[0, j]];
    }
    scale[0] = alpha.row(0).sum();
    normalize_row(&mut alpha, 0, scale[0]);

    for t_idx in 1..t {
        for j in 0..n {
            let mut sum = 0.0;
            for i in 0..n {
                sum += alpha[[t_idx - 1, i]] * transition_matrix[[i, j]];
            }
            alpha[[t_idx, j]] = sum * b[[t_idx, j]];
        }
        scale[t_idx] = alpha.row(t_idx).sum();
        normalize_row(&mut alpha, t_idx, scale[t_idx]);
    }

    let log_likelihood: f64 = scale
        .iter()
        .zip(shift.iter())
        .map(|(s, m)| (s + TINY).ln() + m)
        .sum();

    // Backward pass, scaled with the forward constants
    let mut beta = Array2::<f64>::zeros((t, n));
    for j in 0..n {
        beta[[t - 1, j]] = 1.0;
    }

    for t_idx in (0..t - 1).rev() {
        let c = scale[t_idx + 1].max(TINY);
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += transition_matrix[[i, j]] * b[[t_idx + 1, j]] * beta[[t_idx + 1, j]];
            }
            beta[[t_idx, i]] = sum / c;
        }
    }

    // Posteriors
    let mut gamma = &alpha * &beta;
    for t_idx in 0..t {
        let sum = gamma.row(t_idx).sum();
        if sum > TINY {
            gamma.row_mut(t_idx).mapv_inplace(|g| g / sum);
        } else {
            gamma.row_mut(t_idx).fill(1.0 / n as f64);
        }
    }

    // Expected transitions, each xi_t normalized to one
    let mut xi_sum = Array2::<f64>::zeros((n, n));
    let mut xi_t = Array2::<f64>::zeros((n, n));
    for t_idx in 0..t - 1 {
        let mut total = 0.0;
        for i in 0..n {
            for j in 0..n {
                let v = alpha[[t_idx, i]]
                    * transition_matrix[[i, j]]
                    * b[[t_idx + 1, j]]
                    * beta[[t_idx + 1, j]];
                xi_t[[i, j]] = v;
                total += v;
            }
        }
        if total > TINY {
            xi_sum.scaled_add(1.0 / total, &xi_t);
        }
    }

    ForwardBackward {
        gamma,
        xi_sum,
        log_likelihood,
    }
}

fn normalize_row(matrix: &mut Array2<f64>, row: usize, sum: f64) {
    if sum > TINY {
        matrix.row_mut(row).mapv_inplace(|v| v / sum);
    } else {
        let n = matrix.ncols();
        matrix.row_mut(row).fill(1.0 / n as f64);
    }
}

/// Result of one Baum-Welch iteration
#[derive(Debug, Clone)]
pub struct BaumWelchStep {
    pub initial_probs: Array1<f64>,
    pub transition_matrix: Array2<f64>,
    /// Posteriors used to re-estimate the emissions
    pub gamma: Array2<f64>,
    /// Log-likelihood under the parameters *before* the update
    pub log_likelihood: f64,
}

/// Single Baum-Welch (EM) step: E-step plus initial/transition M-step
pub fn baum_welch_step(
    observations: &Array2<f64>,
    initial_probs: &Array1<f64>,
    transition_matrix: &Array2<f64>,
    emissions: &[MultivariateGaussian],
) -> BaumWelchStep {
    let n = initial_probs.len();
    let log_b = log_emissions(observations, emissions);
    let fb = forward_backward(&log_b, initial_probs, transition_matrix);

    let new_initial = if fb.gamma.nrows() > 0 {
        fb.gamma.row(0).to_owned()
    } else {
        initial_probs.clone()
    };

    let mut new_transition = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        let row_sum: f64 = fb.xi_sum.row(i).sum();
        if row_sum > 1e-10 {
            for j in 0..n {
                new_transition[[i, j]] = fb.xi_sum[[i, j]] / row_sum;
            }
        } else {
            // No expected departures from this state; keep the old row
            new_transition.row_mut(i).assign(&transition_matrix.row(i));
        }
    }

    BaumWelchStep {
        initial_probs: new_initial,
        transition_matrix: new_transition,
        gamma: fb.gamma,
        log_likelihood: fb.log_likelihood,
    }
}
