use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use racer::config::TrainerConfig;
use racer::trainer::Trainer;

/// Train a DQN driving agent on the built-in track.
#[derive(Parser)]
#[command(name = "racer", about = "Train a DQN driving agent")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "racer.toml")]
    config: PathBuf,

    /// Override number of agent steps
    #[arg(long)]
    steps: Option<usize>,

    /// Where the trained online network is written
    #[arg(long, default_value = "model.bin")]
    model_path: PathBuf,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the training summary as JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Start from the network stored at --model-path
    #[arg(long)]
    resume: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    let mut config = TrainerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(steps) = cli.steps {
        config.num_of_steps = steps;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    config.validate().context("invalid configuration")?;

    let mut trainer = Trainer::on_track(config, Some(cli.model_path.clone()))
        .context("building trainer")?;

    if cli.resume {
        if !cli.model_path.exists() {
            bail!("--resume given but {} does not exist", cli.model_path.display());
        }
        trainer
            .load_checkpoint(&cli.model_path)
            .with_context(|| format!("loading checkpoint {}", cli.model_path.display()))?;
    }

    info!(steps = trainer.config().num_of_steps, "starting training");
    trainer.run().context("training failed")?;
    let summary = trainer.finish().context("shutting down trainer")?;

    if let Some(path) = &cli.summary {
        summary
            .save_json(path)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }

    println!(
        "steps: {}  episodes: {}  mean return: {}  best return: {}",
        summary.steps,
        summary.episodes,
        summary
            .mean_recent_return
            .map_or_else(|| "-".to_string(), |r| format!("{:.2}", r)),
        summary
            .best_return
            .map_or_else(|| "-".to_string(), |r| format!("{:.2}", r)),
    );
    Ok(())
}
