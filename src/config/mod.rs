//! Configuration module for unicorn-radar.
//!
//! Everything is loaded from environment variables (a `.env` file is read by
//! the binaries before this runs). Paths point at the artifacts shared
//! between the offline train job and the serving process.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

/// Runtime configuration shared by the server and the train binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// sqlx connection string for the record store.
    pub database_url: String,
    /// Listen address of the HTTP API.
    pub bind_address: String,
    /// Persisted min-max scaler location.
    pub scaler_path: PathBuf,
    /// Persisted LSTM weights location.
    pub model_path: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env_or("DATABASE_URL", "sqlite://data/unicorn.db"),
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:5001"),
            scaler_path: PathBuf::from(env_or("SCALER_PATH", "data/artifacts/scaler.bin")),
            model_path: PathBuf::from(env_or("MODEL_PATH", "data/artifacts/model.bin")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_to_default() {
        let value = env_or("UNICORN_RADAR_UNSET_KEY", "fallback");
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_from_env_always_yields_a_config() {
        let config = Config::from_env().unwrap();
        assert!(!config.database_url.is_empty());
        assert!(!config.bind_address.is_empty());
    }
}
