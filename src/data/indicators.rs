//! Rolling-window indicators
//!
//! Every function returns a vector with the same length as its input.
//! Positions without a full window are NaN and are filled later by the
//! feature builder's sanitization pass.

use statrs::statistics::Statistics;

/// Simple returns: `x[t] / x[t-1] - 1`
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(prices.len());
    if prices.is_empty() {
        return result;
    }
    result.push(f64::NAN);
    result.extend(prices.windows(2).map(|w| {
        if w[0].abs() > 1e-12 {
            w[1] / w[0] - 1.0
        } else {
            f64::NAN
        }
    }));
    result
}

/// Percent change of a level series (same as simple returns)
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    simple_returns(values)
}

fn rolling<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    for end in window..=n {
        let slice = &values[end - window..end];
        if slice.iter().all(|v| v.is_finite()) {
            result[end - 1] = f(slice);
        }
    }
    result
}

/// Rolling mean
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().mean())
}

/// Rolling sample standard deviation
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        if w.len() < 2 {
            0.0
        } else {
            w.iter().std_dev()
        }
    })
}

/// `sqrt(mean(r^2))` over the window, a GARCH-like volatility proxy
pub fn rolling_rms(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        (w.iter().map(|r| r * r).sum::<f64>() / w.len() as f64).sqrt()
    })
}

fn paired<F>(x: &[f64], y: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    let n = x.len().min(y.len());
    let mut result = vec![f64::NAN; x.len()];
    if window < 2 || n < window {
        return result;
    }

    for end in window..=n {
        let xs = &x[end - window..end];
        let ys = &y[end - window..end];
        if xs.iter().chain(ys.iter()).all(|v| v.is_finite()) {
            result[end - 1] = f(xs, ys);
        }
    }
    result
}

/// Rolling Pearson correlation; NaN when either side is flat
pub fn rolling_correlation(x: &[f64], y: &[f64], window: usize) -> Vec<f64> {
    paired(x, y, window, |xs, ys| {
        let cov = xs.iter().covariance(ys.iter());
        let sx = xs.iter().std_dev();
        let sy = ys.iter().std_dev();
        if sx > 1e-12 && sy > 1e-12 {
            (cov / (sx * sy)).clamp(-1.0, 1.0)
        } else {
            f64::NAN
        }
    })
}

/// Rolling beta of `x` on `y`: cov(x, y) / var(y)
pub fn rolling_beta(x: &[f64], y: &[f64], window: usize) -> Vec<f64> {
    paired(x, y, window, |xs, ys| {
        let cov = xs.iter().covariance(ys.iter());
        let var = ys.iter().variance();
        if var > 1e-18 {
            cov / var
        } else {
            f64::NAN
        }
    })
}

/// RSI with Wilder smoothing. A window with neither gains nor losses reads 50.
pub fn rsi_wilder(prices: &[f64], period: usize) -> Vec<f64> {
    let n = prices.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / p;
    result[period] = rsi_from_averages(avg_gain, avg_loss);

    for (i, change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        result[i + 1] = rsi_from_averages(avg_gain, avg_loss);
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 1e-12 && avg_gain <= 1e-12 {
        50.0
    } else if avg_loss <= 1e-12 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
