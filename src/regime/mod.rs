//! Regime naming, profiling and classification on top of the HMM

mod classifier;
mod labels;
mod profiler;

pub use classifier::{RegimeClassification, RegimeClassifier, SnapshotStore};
pub use labels::{rank_states, RegimeLabel};
pub use profiler::{RegimeProfile, RegimeProfiler, RegimeProfiles};
