//! Regime names and the fit-time ranking that assigns them to HMM states

use crate::error::RegimeError;
use colored::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market regime types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegimeLabel {
    /// Lowest mean return
    Bear,
    /// Highest mean return
    Bull,
    /// Most volatile of the middle states
    Volatile,
    /// Any other middle state
    Sideways,
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimeLabel::Bear => write!(f, "Bear"),
            RegimeLabel::Bull => write!(f, "Bull"),
            RegimeLabel::Volatile => write!(f, "Volatile"),
            RegimeLabel::Sideways => write!(f, "Sideways"),
        }
    }
}

impl FromStr for RegimeLabel {
    type Err = RegimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bear" => Ok(RegimeLabel::Bear),
            "bull" => Ok(RegimeLabel::Bull),
            "volatile" => Ok(RegimeLabel::Volatile),
            "sideways" => Ok(RegimeLabel::Sideways),
            _ => Err(RegimeError::InvalidInput(format!("unknown regime '{s}'"))),
        }
    }
}

impl RegimeLabel {
    /// All labels in ranking order
    pub const ALL: [RegimeLabel; 4] = [
        RegimeLabel::Bear,
        RegimeLabel::Bull,
        RegimeLabel::Volatile,
        RegimeLabel::Sideways,
    ];

    /// Get emoji representation
    pub fn emoji(&self) -> &'static str {
        match self {
            RegimeLabel::Bull => "🐂",
            RegimeLabel::Bear => "🐻",
            RegimeLabel::Volatile => "⚡",
            RegimeLabel::Sideways => "↔️",
        }
    }

    /// Get color for terminal output
    pub fn color(&self) -> Color {
        match self {
            RegimeLabel::Bull => Color::Green,
            RegimeLabel::Bear => Color::Red,
            RegimeLabel::Volatile => Color::Magenta,
            RegimeLabel::Sideways => Color::Yellow,
        }
    }
}

/// Name every state from its mean return and mean volatility.
///
/// Lowest return is Bear, highest is Bull. Of the remaining states the one
/// with the highest volatility is Volatile and the rest are Sideways. Ties
/// break on the lower state id. Any monotone rescaling of either column
/// gives the same labels.
pub fn rank_states(mean_returns: &[f64], mean_volatilities: &[f64]) -> Vec<RegimeLabel> {
    let k = mean_returns.len();
    let mut labels = vec![RegimeLabel::Sideways; k];
    if k == 0 {
        return labels;
    }

    let mut by_return: Vec<usize> = (0..k).collect();
    by_return.sort_by(|&a, &b| mean_returns[a].total_cmp(&mean_returns[b]).then(a.cmp(&b)));

    let bear = by_return[0];
    labels[bear] = RegimeLabel::Bear;
    if k == 1 {
        return labels;
    }
    let bull = by_return[k - 1];
    labels[bull] = RegimeLabel::Bull;

    let volatile = by_return[1..k - 1].iter().copied().max_by(|&a, &b| {
        let va = mean_volatilities.get(a).copied().unwrap_or(f64::NEG_INFINITY);
        let vb = mean_volatilities.get(b).copied().unwrap_or(f64::NEG_INFINITY);
        va.total_cmp(&vb).then(b.cmp(&a))
    });
    if let Some(id) = volatile {
        labels[id] = RegimeLabel::Volatile;
    }

    labels
}
