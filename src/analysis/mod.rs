//! Regime analysis entry point and descriptive tags

mod facade;
mod tags;

pub use facade::{RegimeAnalysis, RegimeAnalysisFacade};
pub use tags::{CorrelationRegime, MacroRegime, VolatilityRegime};
