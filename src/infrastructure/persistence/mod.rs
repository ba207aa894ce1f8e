pub mod database;
pub mod record_repository;

pub use database::Database;
pub use record_repository::SqliteRecordRepository;
