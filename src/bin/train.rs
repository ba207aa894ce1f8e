//! Offline training job.
//!
//! Reads the labeled corpus from the record store (optionally importing a
//! CSV first), fits the scaler and the LSTM classifier, reports held-out
//! metrics and persists both artifacts for the serving process.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use unicorn_radar::application::ml::{Trainer, TrainerConfig};
use unicorn_radar::config::Config;
use unicorn_radar::domain::record::{FinancialRecord, RawRecord};
use unicorn_radar::domain::repositories::TrainingRepository;
use unicorn_radar::infrastructure::{Database, SqliteRecordRepository};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Labeled CSV to import into the training table before fitting
    #[arg(long)]
    import: Option<PathBuf>,

    /// LSTM hidden state size
    #[arg(long, default_value_t = 32)]
    hidden: usize,

    /// Passes over the training partition
    #[arg(long, default_value_t = 100)]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    /// Gradient descent step size
    #[arg(long, default_value_t = 0.05)]
    learning_rate: f64,

    /// Held-out fraction, stratified by label
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Seed for the split and weight initialization
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let database = Database::new(&config.database_url).await?;
    let repository = SqliteRecordRepository::new(database.pool.clone());

    if let Some(path) = &cli.import {
        let (records, dropped) = read_labeled_csv(path)?;
        info!(
            imported = records.len(),
            dropped,
            "importing labeled corpus from {:?}",
            path
        );
        TrainingRepository::insert_many(&repository, &records).await?;
    }

    let records = TrainingRepository::fetch_all(&repository).await?;

    info!("🚀 TRAINING UNICORN CLASSIFIER");
    info!("Corpus: {} rows", records.len());
    info!(
        "Artifacts: {:?} / {:?}",
        config.scaler_path, config.model_path
    );
    info!("{}", "=".repeat(80));

    let trainer_config = TrainerConfig {
        hidden_size: cli.hidden,
        epochs: cli.epochs,
        batch_size: cli.batch_size,
        learning_rate: cli.learning_rate,
        test_fraction: cli.test_fraction,
        seed: cli.seed,
        ..TrainerConfig::default()
    };

    let (scaler, model, report) = Trainer::new(trainer_config).run(&records)?;

    ensure_parent_dir(&config.scaler_path)?;
    ensure_parent_dir(&config.model_path)?;
    scaler.save(&config.scaler_path)?;
    model.save(&config.model_path)?;

    info!("{}", "=".repeat(80));
    info!(
        "✨ Training complete: {} windows, test loss {:.4}, accuracy {:.4}, R² {:.2}",
        report.windows, report.test_loss, report.test_accuracy, report.test_r2
    );
    info!("Artifacts written; restart the server to pick them up.");

    Ok(())
}

/// Creates the parent directory of `path` if it doesn't already exist.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {dir:?}"))?;
    }
    Ok(())
}

/// Reads a labeled CSV, dropping rows with any missing value (label
/// included) the same way the trainer drops incomplete corpus rows.
fn read_labeled_csv(path: &Path) -> Result<(Vec<FinancialRecord>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open corpus CSV {path:?}"))?;

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.deserialize::<RawRecord>() {
        let raw = row.with_context(|| format!("Malformed row in {path:?}"))?;

        if raw.is_incomplete() || raw.unicorn.is_none() {
            dropped += 1;
            continue;
        }
        records.push(raw.validate_labeled()?);
    }

    Ok((records, dropped))
}
