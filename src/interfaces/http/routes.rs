//! REST endpoints for record management and prediction.
//!
//! The route layer is thin by design: validation and scoring live in the
//! domain/application layers, handlers translate between HTTP and those
//! calls. CORS is permissive because the original consumer is a browser
//! frontend; a defensive timeout caps every request.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Json, Multipart, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::application::PredictionService;
use crate::domain::errors::PipelineError;
use crate::domain::feature_registry::FEATURE_COLUMNS;
use crate::domain::record::{FinancialRecord, RawRecord, StoredRecord};
use crate::domain::repositories::CandidateRepository;
use crate::interfaces::http::error::ApiError;

/// Defensive cap on request handling time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared, immutable application state handed to every handler.
///
/// The predictor is `None` until the first training run has produced
/// artifacts; record CRUD stays usable either way.
pub struct AppState {
    pub store: Arc<dyn CandidateRepository>,
    pub predictor: Option<Arc<PredictionService>>,
}

/// Build the full REST API router with CORS, timeout and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/predict", get(predict))
        .route("/api/v1/records", get(list_records).post(insert_record))
        .route("/api/v1/records/upload", post(upload_records))
        .route("/api/v1/records/delete", post(delete_records))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_loaded: state.predictor.is_some(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// ---------------------------------------------------------------------------
// Predict
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PredictQuery {
    /// Entity to score. Absent means the whole candidate table, which is the
    /// single-implicit-company mode of operation.
    company: Option<String>,
}

#[derive(Serialize)]
struct PredictResponse {
    success: bool,
    predicted_probability: f64,
    is_unicorn: bool,
    message: &'static str,
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<PredictResponse>, ApiError> {
    let predictor = state
        .predictor
        .as_ref()
        .ok_or(PipelineError::ModelUnavailable)?;

    let stored = match &query.company {
        Some(company) => state.store.fetch_company(company).await?,
        None => state.store.fetch_all().await?,
    };
    let rows: Vec<FinancialRecord> = stored.into_iter().map(|s| s.record).collect();

    let prediction = predictor.predict(&rows)?;

    Ok(Json(PredictResponse {
        success: true,
        predicted_probability: prediction.rounded_probability(),
        is_unicorn: prediction.is_unicorn,
        message: "Prediction completed successfully.",
    }))
}

// ---------------------------------------------------------------------------
// Records CRUD
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ListResponse {
    data: Vec<StoredRecord>,
}

async fn list_records(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListResponse>, ApiError> {
    let data = state.store.fetch_all().await?;
    Ok(Json(ListResponse { data }))
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

async fn insert_record(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawRecord>,
) -> Result<Json<MessageResponse>, ApiError> {
    let record = raw.validate()?;
    state.store.insert(&record).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Data inserted successfully".to_string(),
    }))
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    inserted: usize,
    dropped: usize,
    message: String,
}

/// Multipart CSV upload. Replaces the candidate table wholesale: the table
/// is reset first, then every complete row is inserted. Rows with missing
/// values are dropped, mirroring the null-dropping done on the training
/// corpus.
async fn upload_records(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut payload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        PipelineError::InvalidUpload {
            reason: e.to_string(),
        }
    })? {
        if field.name() == Some("file") {
            payload = Some(field.bytes().await.map_err(|e| {
                PipelineError::InvalidUpload {
                    reason: e.to_string(),
                }
            })?);
            break;
        }
    }

    let payload = payload.ok_or(PipelineError::InvalidUpload {
        reason: "no file provided".to_string(),
    })?;

    let (records, dropped) = parse_csv_records(&payload)?;

    state.store.reset().await?;
    state.store.insert_many(&records).await?;

    info!(inserted = records.len(), dropped, "candidate upload complete");

    Ok(Json(UploadResponse {
        success: true,
        inserted: records.len(),
        dropped,
        message: "File uploaded successfully.".to_string(),
    }))
}

#[derive(Deserialize)]
struct DeleteRequest {
    ids: Vec<i64>,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    deleted: u64,
    message: String,
}

async fn delete_records(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if request.ids.is_empty() {
        return Err(PipelineError::InvalidUpload {
            reason: "no ids provided for deletion".to_string(),
        }
        .into());
    }

    let deleted = state.store.delete_by_ids(&request.ids).await?;

    Ok(Json(DeleteResponse {
        success: true,
        deleted,
        message: "Rows deleted successfully.".to_string(),
    }))
}

/// Parses an uploaded CSV into validated records.
///
/// All contract columns plus `company` must appear in the header; the first
/// missing one is named. Incomplete rows are dropped, not fatal.
fn parse_csv_records(bytes: &[u8]) -> Result<(Vec<FinancialRecord>, usize), PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::InvalidUpload {
            reason: e.to_string(),
        })?
        .clone();

    let required = std::iter::once("company").chain(FEATURE_COLUMNS.iter().copied());
    for column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(PipelineError::InvalidUpload {
                reason: format!("missing column: {column}"),
            });
        }
    }

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.deserialize::<RawRecord>() {
        let raw = row.map_err(|e| PipelineError::InvalidUpload {
            reason: e.to_string(),
        })?;

        if raw.is_incomplete() {
            dropped += 1;
            continue;
        }
        records.push(raw.validate()?);
    }

    Ok((records, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV_HEADER: &str =
        "year,company,asset,debt,capital,income,cost,profit,net_income,investment";

    #[test]
    fn test_parse_csv_complete_rows() {
        let csv = format!(
            "{CSV_HEADER}\n2021,Acme,1,2,3,4,5,6,7,8\n2022,Acme,2,3,4,5,6,7,8,9\n"
        );

        let (records, dropped) = parse_csv_records(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(dropped, 0);
        assert_eq!(records[0].company, "Acme");
        assert_eq!(records[1].year, 2022);
    }

    #[test]
    fn test_parse_csv_drops_incomplete_rows() {
        let csv = format!("{CSV_HEADER}\n2021,Acme,1,2,3,4,5,6,7,8\n2022,Acme,,3,4,5,6,7,8,9\n");

        let (records, dropped) = parse_csv_records(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_parse_csv_names_missing_column() {
        let csv = "year,company,asset,debt,capital,income,cost,profit,net_income\n\
                   2021,Acme,1,2,3,4,5,6,7\n";

        let err = parse_csv_records(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("investment"));
    }
}
