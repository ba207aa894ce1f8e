use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Connection pool wrapper; one instance per process.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database url: {db_url}"))?
            .create_if_missing(true)
            // WAL keeps predict/list reads from blocking behind an upload writer
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        if let Some(dir) = options.get_filename().parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir)
                .await
                .context("Failed to create database directory")?;
        }

        // Request-scoped acquisition and light CRUD traffic; a few
        // connections cover concurrent readers plus one writer.
        let pool = SqlitePoolOptions::new()
            .max_connections(3)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Labeled training corpus, read by the offline train job
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL,
                company TEXT NOT NULL,
                asset REAL NOT NULL,
                debt REAL NOT NULL,
                capital REAL NOT NULL,
                income REAL NOT NULL,
                cost REAL NOT NULL,
                profit REAL NOT NULL,
                net_income REAL NOT NULL,
                investment REAL NOT NULL,
                unicorn INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create training_records table")?;

        // 2. Candidate rows scored at inference time, managed over HTTP
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candidate_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL,
                company TEXT NOT NULL,
                asset REAL NOT NULL,
                debt REAL NOT NULL,
                capital REAL NOT NULL,
                income REAL NOT NULL,
                cost REAL NOT NULL,
                profit REAL NOT NULL,
                net_income REAL NOT NULL,
                investment REAL NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candidate_records table")?;

        // Index for the per-company inference fetch
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candidate_company_year
            ON candidate_records (company, year);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candidate index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
