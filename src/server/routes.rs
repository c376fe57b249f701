//! HTTP route handlers for the LSH index API.

use crate::error::LshError;
use crate::server::AppState;
use crate::vector::{Record, Vector};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct TrainRequest {
    pub records: Vec<Record>,
}

#[derive(Serialize)]
pub struct TrainResponse {
    pub status: String,
    pub records: usize,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub vector_count: usize,
    pub dims: usize,
    pub permutations: usize,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub total_trains: u64,
    pub failed_trains: u64,
    pub records_trained: u64,
    pub avg_results_per_query: f64,
    pub avg_query_latency_us: f64,
    pub p50_query_latency_us: f64,
    pub p95_query_latency_us: f64,
    pub p99_query_latency_us: f64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: LshError) -> ApiError {
    let status = if e.is_caller_error() || matches!(e, LshError::SerializationError(_)) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// --- Router ---

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/train", post(train))
        .route("/search", post(search))
        .route("/hasher", get(dump_hasher).put(load_hasher))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

fn persist(state: &AppState) -> Result<(), LshError> {
    if let Some(snapshots) = &state.snapshots {
        snapshots.save(&state.index.read())?;
    }
    Ok(())
}

/// Run index work on tokio's blocking pool, off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LshError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(api_error),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("index task failed: {}", e),
            }),
        )),
    }
}

// --- Handlers ---

async fn train(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let count = req.records.len();

    run_blocking(move || {
        let result = state.index.write().train(&req.records);
        state.metrics.write().record_train(count, result.is_ok());
        if let Err(e) = result {
            warn!(error = %e, "train request failed");
            return Err(e);
        }
        persist(&state)
    })
    .await?;

    Ok(Json(TrainResponse {
        status: "trained".to_string(),
        records: count,
    }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let query = Vector::new(req.vector);

    let records = run_blocking(move || {
        let start = Instant::now();
        let result = state.index.read().search(&query);
        match &result {
            Ok(records) => state
                .metrics
                .write()
                .record_query(start.elapsed(), records.len()),
            Err(_) => state.metrics.write().record_failed_query(),
        }
        result
    })
    .await?;

    Ok(Json(records))
}

async fn dump_hasher(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.index.read().dump_hasher().map_err(api_error)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

async fn load_hasher(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    run_blocking(move || {
        state.index.write().load_hasher(&body)?;
        persist(&state)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let index = state.index.read();

    Json(HealthResponse {
        status: "ok".to_string(),
        vector_count: index.store().len(),
        dims: index.dims(),
        permutations: index.hasher().n_permutations(),
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let metrics = state.metrics.read();

    Json(MetricsResponse {
        total_queries: metrics.total_queries(),
        failed_queries: metrics.failed_queries(),
        total_trains: metrics.total_trains(),
        failed_trains: metrics.failed_trains(),
        records_trained: metrics.records_trained(),
        avg_results_per_query: metrics.avg_results_per_query(),
        avg_query_latency_us: metrics.avg_query_latency_us(),
        p50_query_latency_us: metrics.percentile_query_latency_us(50.0),
        p95_query_latency_us: metrics.percentile_query_latency_us(95.0),
        p99_query_latency_us: metrics.percentile_query_latency_us(99.0),
    })
}
