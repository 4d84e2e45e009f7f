//! Cascade EQ CLI
//!
//! Inspect an equalizer configuration offline: print its magnitude response,
//! dump its parameter blueprints, or write the factory default.

use anyhow::Context;
use cascade_eq_core::domain::filter::log_frequencies;
use cascade_eq_core::domain::{Equalizer, EqualizerConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cascade-eq")]
#[command(about = "Cascaded IIR equalizer toolkit", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the combined and per-stage magnitude response
    Response {
        /// Equalizer configuration (factory default when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, default_value_t = 48000.0)]
        sample_rate: f32,

        /// Number of log-spaced frequencies between 20 Hz and 20 kHz
        #[arg(short, long, default_value_t = 31)]
        points: usize,
    },

    /// Dump every parameter blueprint as JSON
    Blueprints {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the factory default configuration
    InitConfig {
        path: PathBuf,
    },
}

#[derive(Serialize)]
struct ResponseRow {
    frequency: f32,
    total_db: f32,
    stages: Vec<(String, f32)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Response {
            config,
            sample_rate,
            points,
        } => print_response(config.as_deref(), sample_rate, points).await,
        Command::Blueprints { config } => {
            let eq = Equalizer::new(&load_config(config.as_deref()).await?)?;
            println!("{}", serde_json::to_string_pretty(&eq.blueprints())?);
            Ok(())
        }
        Command::InitConfig { path } => {
            EqualizerConfig::factory_default()
                .save_to_file(&path)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "Factory configuration written");
            Ok(())
        }
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<EqualizerConfig> {
    match path {
        Some(path) => EqualizerConfig::load_from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(EqualizerConfig::factory_default()),
    }
}

async fn print_response(config: Option<&Path>, sample_rate: f32, points: usize) -> anyhow::Result<()> {
    let config = load_config(config).await?;
    let mut eq = Equalizer::new(&config)?;
    eq.prepare(sample_rate, 512)?;

    let frequencies = log_frequencies(20.0, 20000.0_f32.min(sample_rate * 0.5), points);
    let mut total = vec![0.0; frequencies.len()];
    eq.get_magnitude_response(&frequencies, &mut total);

    let per_stage: Vec<(String, Vec<f32>)> = eq
        .handle()
        .stages()
        .iter()
        .map(|stage| {
            let mut db = vec![0.0; frequencies.len()];
            stage.magnitude_response(&frequencies, &mut db);
            (stage.name().to_string(), db)
        })
        .collect();

    let rows: Vec<ResponseRow> = frequencies
        .iter()
        .enumerate()
        .map(|(i, &frequency)| ResponseRow {
            frequency,
            total_db: total[i],
            stages: per_stage
                .iter()
                .map(|(name, db)| (name.clone(), db[i]))
                .collect(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
