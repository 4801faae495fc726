//! HMM Regime CLI
//!
//! Command-line interface for training regime models and analyzing series

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hmm_regime::{
    data::synthetic::{generate, three_regime_segments},
    Dataset, FeatureBuilder, RegimeAnalysisFacade, RegimeConfig, SnapshotStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hmm_regime")]
#[command(about = "HMM-based market regime classification and model weighting")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a seeded bear / volatile / bull synthetic series
    Synthetic {
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Starting price
        #[arg(long, default_value = "100")]
        start_price: f64,
    },

    /// Train a regime model on a CSV
    Train {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Market benchmark CSV file; analyze with the same file
        #[arg(short, long)]
        market: Option<PathBuf>,

        /// Number of states (regimes)
        #[arg(short = 'n', long)]
        n_states: Option<usize>,

        /// Write the trained snapshot here
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Classify the latest candle and weight models
    Analyze {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Market benchmark CSV file
        #[arg(short, long)]
        market: Option<PathBuf>,

        /// Load the model from this snapshot
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Retrain before classifying
        #[arg(long)]
        retrain: bool,

        /// Downstream models to weight
        #[arg(long, value_delimiter = ',', default_value = "technical,lstm,transformer,ensemble")]
        models: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Snapshot bytes in a single file
struct FileStore {
    path: PathBuf,
}

impl SnapshotStore for FileStore {
    fn save(&mut self, bytes: &[u8]) -> hmm_regime::Result<()> {
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn load(&self) -> hmm_regime::Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(&self.path)?))
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hmm_regime=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RegimeConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RegimeConfig::default(),
    };

    match cli.command {
        Commands::Synthetic {
            output,
            seed,
            start_price,
        } => {
            write_synthetic(&output, seed, start_price)?;
        }
        Commands::Train {
            input,
            market,
            n_states,
            snapshot,
        } => {
            let config = match n_states {
                Some(n) => config.with_n_regimes(n),
                None => config,
            };
            train_model(config, &input, market, snapshot)?;
        }
        Commands::Analyze {
            input,
            market,
            snapshot,
            retrain,
            models,
            json,
        } => {
            analyze(config, &input, market, snapshot, retrain, &models, json)?;
        }
    }

    Ok(())
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let symbol = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_uppercase();
    Dataset::from_csv(path, &symbol, "unknown")
        .with_context(|| format!("reading candles from {}", path.display()))
}

fn write_synthetic(output: &Path, seed: u64, start_price: f64) -> Result<()> {
    println!("{}", "Generating synthetic series...".cyan());

    let dataset = generate(&three_regime_segments(), start_price, seed)?;
    dataset.to_csv(output)?;

    println!(
        "{}",
        format!(
            "Saved {} candles (bear 0-99, volatile 100-299, bull 300-499) to {}",
            dataset.len(),
            output.display()
        )
        .green()
    );

    Ok(())
}

fn train_model(
    config: RegimeConfig,
    input: &Path,
    market: Option<PathBuf>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    println!("{}", "Loading data...".cyan());
    let dataset = load_dataset(input)?;
    let market = market.as_deref().map(load_dataset).transpose()?;
    println!("Loaded {} candles", dataset.len());

    println!("{}", "Building features...".cyan());
    let frame = FeatureBuilder::from_config(&config).build(&dataset, market.as_ref(), &[])?;
    println!(
        "Built {} features for {} samples ({} cells sanitized)",
        frame.n_features(),
        frame.n_samples(),
        frame.diagnostics.total()
    );

    let n_states = config.n_regimes;
    println!(
        "{}",
        format!(
            "Training {}-state HMM (max {} iterations)...",
            n_states, config.max_em_iterations
        )
        .cyan()
    );

    let facade = RegimeAnalysisFacade::new(config)?;
    let report = facade.classifier().fit(&frame)?;

    println!(
        "{}",
        format!(
            "Training complete after {} iterations! Log-likelihood: {:.4}",
            report.iterations, report.log_likelihood
        )
        .green()
    );

    let Some(model) = facade.classifier().snapshot() else {
        bail!("model was not published after training");
    };

    // Show transition matrix
    println!("\nTransition Matrix:");
    let trans = model.transition_matrix();
    for i in 0..n_states {
        print!("  State {}: ", i);
        for j in 0..n_states {
            print!("{:.2}  ", trans[[i, j]]);
        }
        println!();
    }

    println!("\n{}", "=== Regimes ===".bold());
    let durations = model.expected_durations();
    for (state, label) in model.labels().iter().enumerate() {
        println!(
            "  State {}: {} {} (expected duration {:.1} bars)",
            state,
            label.emoji(),
            label.to_string().color(label.color()).bold(),
            durations[state]
        );
    }

    if let Some(path) = snapshot {
        let mut store = FileStore { path: path.clone() };
        facade.classifier().persist(&mut store)?;
        println!("{}", format!("Snapshot saved to {}", path.display()).green());
    }

    Ok(())
}

fn analyze(
    config: RegimeConfig,
    input: &Path,
    market: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    retrain: bool,
    models: &[String],
    json: bool,
) -> Result<()> {
    let dataset = load_dataset(input)?;
    let market = market.as_deref().map(load_dataset).transpose()?;

    let facade = RegimeAnalysisFacade::new(config)?;
    if let Some(path) = &snapshot {
        let store = FileStore { path: path.clone() };
        if !facade.classifier().restore(&store)? && !retrain {
            bail!("no snapshot at {}; pass --retrain to train one", path.display());
        }
    }

    let base: BTreeMap<String, f64> = models
        .iter()
        .map(|m| (m.clone(), 1.0 / models.len() as f64))
        .collect();

    let (analysis, weights) =
        facade.analyze_with_weights(&dataset, market.as_ref(), &[], retrain, &base)?;

    if json {
        let output = serde_json::json!({ "analysis": analysis, "weights": weights });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let c = &analysis.classification;
    println!("\n{}", "=== Current Regime ===".bold());
    println!(
        "  {} {}",
        c.regime_name.emoji(),
        c.regime_name.to_string().color(c.regime_name.color()).bold()
    );
    println!("  Probability: {:.1}%", c.confidence * 100.0);
    println!(
        "  Confident: {}",
        if c.confidence >= facade.config().regime_confidence_threshold {
            "Yes".green()
        } else {
            "No".yellow()
        }
    );
    println!("  Profile: {}", c.profile);
    println!("  Volatility:  {}", analysis.volatility_regime);
    println!("  Correlation: {}", analysis.correlation_regime);
    println!("  Overall confidence: {:.1}%", analysis.overall_confidence * 100.0);

    println!("\n{}", "=== Model Weights ===".bold());
    for (model, weight) in weights.iter() {
        println!("  {:<12} {:.3}", model, weight);
    }

    Ok(())
}
