//! Example: Regime classification and model weighting
//!
//! Trains on a synthetic bear / volatile / bull series, then walks forward
//! through the bull leg and shows how the model weights react.
//!
//! Run with: cargo run --example regime_weights

use hmm_regime::data::synthetic::{generate, three_regime_segments};
use hmm_regime::{RegimeAnalysisFacade, RegimeConfig};
use std::collections::BTreeMap;

fn main() -> anyhow::Result<()> {
    println!("=== Regime-Aware Model Weights ===\n");

    let dataset = generate(&three_regime_segments(), 100.0, 42)?;
    let facade = RegimeAnalysisFacade::new(RegimeConfig::default().with_lookback(500))?;

    let report = facade.fit(&dataset, None, &[])?;
    println!(
        "Trained in {} iterations (log-likelihood {:.2})",
        report.iterations, report.log_likelihood
    );

    if let Some(model) = facade.classifier().snapshot() {
        for (state, label) in model.labels().iter().enumerate() {
            println!("  State {} -> {} {}", state, label.emoji(), label);
        }
    }

    let base: BTreeMap<String, f64> = ["technical", "lstm", "transformer", "ensemble"]
        .iter()
        .map(|m| (m.to_string(), 0.25))
        .collect();

    println!("\n  {:>4}  {:<10} {:>6}   weights", "day", "regime", "conf");
    println!("  ─────────────────────────────────────────────────────────────");
    for end in (60..=dataset.len()).step_by(40) {
        let window = dataset.slice(0, end);
        let (analysis, weights) = facade.analyze_with_weights(&window, None, &[], false, &base)?;
        let c = &analysis.classification;
        println!(
            "  {:>4}  {:<10} {:>5.1}%   {}",
            end,
            c.regime_name.to_string(),
            c.confidence * 100.0,
            weights
        );
    }

    Ok(())
}
