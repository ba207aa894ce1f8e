use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use sqlx::sqlite::SqliteRow;
use tracing::info;

use crate::domain::errors::PipelineError;
use crate::domain::record::{FinancialRecord, StoredRecord};
use crate::domain::repositories::{CandidateRepository, TrainingRepository};

/// sqlx-backed store for both record tables.
pub struct SqliteRecordRepository {
    pool: SqlitePool,
}

impl SqliteRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow, labeled: bool) -> Result<FinancialRecord, sqlx::Error> {
    Ok(FinancialRecord {
        year: row.try_get("year")?,
        company: row.try_get("company")?,
        asset: row.try_get("asset")?,
        debt: row.try_get("debt")?,
        capital: row.try_get("capital")?,
        income: row.try_get("income")?,
        cost: row.try_get("cost")?,
        profit: row.try_get("profit")?,
        net_income: row.try_get("net_income")?,
        investment: row.try_get("investment")?,
        unicorn: if labeled {
            Some(row.try_get::<bool, _>("unicorn")?)
        } else {
            None
        },
    })
}

#[async_trait]
impl CandidateRepository for SqliteRecordRepository {
    async fn reset(&self) -> Result<(), PipelineError> {
        sqlx::query("DROP TABLE IF EXISTS candidate_records")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE candidate_records (
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
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX idx_candidate_company_year
            ON candidate_records (company, year);
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("candidate_records table reset");
        Ok(())
    }

    async fn insert(&self, record: &FinancialRecord) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO candidate_records
            (year, company, asset, debt, capital, income, cost, profit, net_income, investment)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.year)
        .bind(&record.company)
        .bind(record.asset)
        .bind(record.debt)
        .bind(record.capital)
        .bind(record.income)
        .bind(record.cost)
        .bind(record.profit)
        .bind(record.net_income)
        .bind(record.investment)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_many(&self, records: &[FinancialRecord]) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO candidate_records
                (year, company, asset, debt, capital, income, cost, profit, net_income, investment)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.year)
            .bind(&record.company)
            .bind(record.asset)
            .bind(record.debt)
            .bind(record.capital)
            .bind(record.income)
            .bind(record.cost)
            .bind(record.profit)
            .bind(record.net_income)
            .bind(record.investment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<StoredRecord>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM candidate_records ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(StoredRecord {
                id: row.try_get("id")?,
                record: row_to_record(&row, false)?,
            });
        }
        Ok(records)
    }

    async fn fetch_company(&self, company: &str) -> Result<Vec<StoredRecord>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM candidate_records WHERE company = ? ORDER BY id")
            .bind(company)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(StoredRecord {
                id: row.try_get("id")?,
                record: row_to_record(&row, false)?,
            });
        }
        Ok(records)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, PipelineError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM candidate_records WHERE id IN ({placeholders})");

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TrainingRepository for SqliteRecordRepository {
    async fn fetch_all(&self) -> Result<Vec<FinancialRecord>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM training_records ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_record(&row, true)?);
        }
        Ok(records)
    }

    async fn insert_many(&self, records: &[FinancialRecord]) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO training_records
                (year, company, asset, debt, capital, income, cost, profit, net_income, investment, unicorn)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.year)
            .bind(&record.company)
            .bind(record.asset)
            .bind(record.debt)
            .bind(record.capital)
            .bind(record.income)
            .bind(record.cost)
            .bind(record.profit)
            .bind(record.net_income)
            .bind(record.investment)
            .bind(record.unicorn.unwrap_or(false))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
