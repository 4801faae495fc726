//! Per-state descriptive statistics over a decoded window

use super::labels::RegimeLabel;
use crate::data::features::{RETURN, RSI, TREND_STRENGTH, VOLATILITY, VOLUME_RATIO};
use crate::data::FeatureFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Statistics for one hidden state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeProfile {
    /// HMM state index
    pub state_id: usize,
    /// Name assigned at fit time
    pub label: Option<RegimeLabel>,
    /// Mean `return`
    pub mean_return: f64,
    /// Mean `volatility`
    pub volatility: f64,
    /// Mean `volume_ratio`
    pub volume_ratio: f64,
    /// Mean `rsi`
    pub rsi: f64,
    /// Mean `trend_strength`
    pub trend_strength: f64,
    /// Rows decoded into this state
    pub sample_count: usize,
    /// Share of the window spent in this state
    pub frequency: f64,
    /// Mean run length in rows
    pub avg_duration: f64,
}

impl RegimeProfile {
    /// Neutral profile for a state that never occurs in the window
    pub fn neutral(state_id: usize, label: Option<RegimeLabel>) -> Self {
        Self {
            state_id,
            label,
            mean_return: 0.0,
            volatility: 0.0,
            volume_ratio: 1.0,
            rsi: 50.0,
            trend_strength: 0.0,
            sample_count: 0,
            frequency: 0.0,
            avg_duration: 0.0,
        }
    }
}

impl fmt::Display for RegimeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .label
            .map(|l| l.to_string())
            .unwrap_or_else(|| format!("State_{}", self.state_id));
        write!(
            f,
            "{} (state {}): return {:+.4}, vol {:.4}, rsi {:.1}, {} rows, avg run {:.1}",
            name,
            self.state_id,
            self.mean_return,
            self.volatility,
            self.rsi,
            self.sample_count,
            self.avg_duration
        )
    }
}

/// Exactly one profile per configured state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeProfiles(Vec<RegimeProfile>);

impl RegimeProfiles {
    /// Number of states
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-state model
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Profile of a state, `None` outside `[0, K)`
    pub fn get(&self, state_id: usize) -> Option<&RegimeProfile> {
        self.0.get(state_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegimeProfile> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<RegimeProfile> {
        self.0
    }
}

impl Index<usize> for RegimeProfiles {
    type Output = RegimeProfile;

    fn index(&self, state_id: usize) -> &RegimeProfile {
        &self.0[state_id]
    }
}

/// Aggregates unstandardized features per decoded state
#[derive(Debug, Clone, Copy)]
pub struct RegimeProfiler {
    n_regimes: usize,
}

impl RegimeProfiler {
    pub fn new(n_regimes: usize) -> Self {
        Self { n_regimes }
    }

    /// Profile every state id in `[0, K)`
    ///
    /// `states` is aligned with the rows of `frame`; extra rows on either
    /// side are ignored. Out-of-range ids are skipped.
    pub fn profile(
        &self,
        states: &[usize],
        frame: &FeatureFrame,
        labels: &[RegimeLabel],
    ) -> RegimeProfiles {
        let k = self.n_regimes;
        let rows = states.len().min(frame.n_samples());
        let columns = [RETURN, VOLATILITY, VOLUME_RATIO, RSI, TREND_STRENGTH]
            .map(|name| frame.column_index(name));

        let mut sums = vec![[0.0f64; 5]; k];
        let mut counts = vec![0usize; k];
        let mut runs = vec![0usize; k];

        for (t, &state) in states.iter().take(rows).enumerate() {
            if state >= k {
                continue;
            }
            counts[state] += 1;
            if t == 0 || states[t - 1] != state {
                runs[state] += 1;
            }
            for (c, idx) in columns.iter().enumerate() {
                if let Some(idx) = idx {
                    sums[state][c] += frame.data[[t, *idx]];
                }
            }
        }

        let profiles = (0..k)
            .map(|id| {
                let label = labels.get(id).copied();
                let n = counts[id];
                if n == 0 {
                    return RegimeProfile::neutral(id, label);
                }

                let neutral = RegimeProfile::neutral(id, label);
                let mean = |c: usize, default: f64| {
                    if columns[c].is_some() {
                        sums[id][c] / n as f64
                    } else {
                        default
                    }
                };

                RegimeProfile {
                    state_id: id,
                    label,
                    mean_return: mean(0, neutral.mean_return),
                    volatility: mean(1, neutral.volatility),
                    volume_ratio: mean(2, neutral.volume_ratio),
                    rsi: mean(3, neutral.rsi),
                    trend_strength: mean(4, neutral.trend_strength),
                    sample_count: n,
                    frequency: n as f64 / rows as f64,
                    avg_duration: n as f64 / runs[id] as f64,
                }
            })
            .collect();

        RegimeProfiles(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn frame(rows: &[[f64; 5]]) -> FeatureFrame {
        let mut data = Array2::zeros((rows.len(), 5));
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                data[[i, j]] = *v;
            }
        }
        FeatureFrame {
            data,
            names: [RETURN, VOLATILITY, VOLUME_RATIO, RSI, TREND_STRENGTH]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timestamps: (0..rows.len() as u64).collect(),
            diagnostics: Default::default(),
            sanitized_rows: vec![0; rows.len()],
        }
    }

    #[test]
    fn test_all_states_present() {
        let frame = frame(&[
            [0.01, 0.1, 1.0, 60.0, 0.1],
            [0.03, 0.3, 1.0, 70.0, 0.3],
            [-0.02, 0.2, 2.0, 30.0, -0.1],
        ]);
        let profiles = RegimeProfiler::new(4).profile(&[0, 0, 2], &frame, &[]);

        assert_eq!(profiles.len(), 4);
        assert!((profiles[0].mean_return - 0.02).abs() < 1e-12);
        assert!((profiles[0].rsi - 65.0).abs() < 1e-12);
        assert_eq!(profiles[0].sample_count, 2);
        assert!((profiles[0].frequency - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(profiles[2].volume_ratio, 2.0);

        // Never visited
        assert_eq!(profiles[1].sample_count, 0);
        assert_eq!(profiles[1].rsi, 50.0);
        assert_eq!(profiles[3].volume_ratio, 1.0);
    }

    #[test]
    fn test_average_duration() {
        let frame = frame(&[[0.0; 5]; 6]);
        let profiles = RegimeProfiler::new(2).profile(&[0, 0, 1, 0, 0, 0], &frame, &[]);
        // Runs of 2 and 3
        assert!((profiles[0].avg_duration - 2.5).abs() < 1e-12);
        assert!((profiles[1].avg_duration - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_labels_attached() {
        let frame = frame(&[[0.0; 5]; 2]);
        let labels = [RegimeLabel::Bull, RegimeLabel::Bear];
        let profiles = RegimeProfiler::new(2).profile(&[1, 1], &frame, &labels);
        assert_eq!(profiles[0].label, Some(RegimeLabel::Bull));
        assert_eq!(profiles[1].label, Some(RegimeLabel::Bear));
        assert!(profiles.get(2).is_none());
    }
}
