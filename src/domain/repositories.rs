//! Repository traits for the record store.
//!
//! The candidate table holds the rows scored at inference time and is
//! managed by the HTTP CRUD endpoints. The training table holds the labeled
//! corpus read by the offline train job. Implementations live in
//! `infrastructure::persistence`.

use async_trait::async_trait;

use crate::domain::errors::PipelineError;
use crate::domain::record::{FinancialRecord, StoredRecord};

/// Store operations for the candidate (serving) table.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// Drops and recreates the candidate table. Used by the bulk upload,
    /// which replaces the table contents wholesale.
    async fn reset(&self) -> Result<(), PipelineError>;

    /// Inserts a single validated row.
    async fn insert(&self, record: &FinancialRecord) -> Result<(), PipelineError>;

    /// Inserts a batch of validated rows.
    async fn insert_many(&self, records: &[FinancialRecord]) -> Result<(), PipelineError>;

    /// Reads the whole table in insertion (id) order.
    async fn fetch_all(&self) -> Result<Vec<StoredRecord>, PipelineError>;

    /// Reads one company's rows in insertion (id) order.
    async fn fetch_company(&self, company: &str) -> Result<Vec<StoredRecord>, PipelineError>;

    /// Deletes the given ids; returns how many rows went away.
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, PipelineError>;
}

/// Store operations for the labeled training corpus.
#[async_trait]
pub trait TrainingRepository: Send + Sync {
    /// Reads the full corpus in insertion (id) order.
    async fn fetch_all(&self) -> Result<Vec<FinancialRecord>, PipelineError>;

    /// Bulk-inserts labeled rows (CSV corpus import).
    async fn insert_many(&self, records: &[FinancialRecord]) -> Result<(), PipelineError>;
}
