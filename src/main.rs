//! Unicorn-radar server - headless prediction API
//!
//! Serves record CRUD and the prediction endpoint. Inference artifacts are
//! loaded once at startup; if they are missing the server still boots and
//! reports a per-request failure until a train run has produced them.
//!
//! # Usage
//! ```sh
//! cargo run --bin server
//! ```
//!
//! # Environment Variables
//! - `DATABASE_URL` - sqlx connection string (default: sqlite://data/unicorn.db)
//! - `BIND_ADDRESS` - HTTP listen address (default: 0.0.0.0:5001)
//! - `SCALER_PATH` / `MODEL_PATH` - artifact locations shared with the train job

use std::sync::Arc;

use anyhow::Result;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

use unicorn_radar::application::PredictionService;
use unicorn_radar::config::Config;
use unicorn_radar::domain::repositories::CandidateRepository;
use unicorn_radar::infrastructure::{Database, SqliteRecordRepository};
use unicorn_radar::interfaces::http::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Setup logging (stdout only)
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!(
        "Unicorn-radar server {} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: db={}, bind={}",
        config.database_url, config.bind_address
    );

    let database = Database::new(&config.database_url).await?;
    let store: Arc<dyn CandidateRepository> =
        Arc::new(SqliteRecordRepository::new(database.pool.clone()));

    let predictor = match PredictionService::load(&config.scaler_path, &config.model_path) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            warn!(
                "Inference artifacts unavailable ({e}); predictions disabled until a train run completes"
            );
            None
        }
    };

    let state = Arc::new(AppState { store, predictor });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, router(state)).await?;

    Ok(())
}
