//! Regime-conditioned weighting of downstream forecasting models

mod mapper;
mod table;
mod vector;

pub use mapper::WeightMapper;
pub use table::{BiasRule, BiasTable};
pub use vector::WeightVector;
