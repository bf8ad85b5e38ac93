//! Axum router: webhook ingestion, call control and metrics

use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use dialpace_core::config::BatchDefaults;
use dialpace_core::{CallEvent, CallStatus, WebhookPayload};
use dialpace_metrics::{compute_stats, CallMetricsRecord, CallStats, CallTracker};
use dialpace_scheduler::{BatchManager, BatchRequest, BatchStatus, Dialer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub tracker: Arc<CallTracker>,
    pub dialer: Arc<Dialer>,
    pub batches: Arc<BatchManager>,
    pub batch_defaults: BatchDefaults,
}

pub type SharedState = Arc<AppState>;

/// Build the service router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/webhooks/events", post(webhook_event))
        .route("/calls", get(list_calls).post(place_call))
        .route("/calls/:id", get(get_call))
        .route("/batches", get(list_batches).post(start_batch))
        .route("/batches/:id", get(get_batch))
        .route("/metrics/stats", get(stats))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process exits
pub async fn serve(state: SharedState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("dialpace listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    ok: bool,
    call_id: String,
    /// `None` when the event was not recognized
    status: Option<CallStatus>,
}

/// POST /webhooks/events
async fn webhook_event(
    State(app): State<SharedState>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError> {
    let Json(payload) = payload?;
    let event = CallEvent::try_from(payload)?;
    let record = app.tracker.apply_event(&event).await;

    Ok(Json(WebhookAck {
        ok: true,
        call_id: event.call_id,
        status: record.map(|r| r.final_status),
    }))
}

#[derive(Debug, Deserialize)]
struct PlaceCallBody {
    to: String,
    #[serde(default)]
    tag: Option<String>,
}

/// POST /calls
async fn place_call(
    State(app): State<SharedState>,
    body: Result<Json<PlaceCallBody>, JsonRejection>,
) -> Result<Json<CallMetricsRecord>, ApiError> {
    let Json(body) = body?;
    let to = body.to.trim();
    if to.is_empty() {
        return Err(ApiError::bad_request("missing destination"));
    }

    let record = app.dialer.dial(to, body.tag.as_deref()).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ListCallsQuery {
    status: Option<String>,
}

/// GET /calls?status=busy
async fn list_calls(
    State(app): State<SharedState>,
    Query(query): Query<ListCallsQuery>,
) -> Result<Json<Vec<CallMetricsRecord>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<CallStatus>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let mut calls: Vec<CallMetricsRecord> = app
        .tracker
        .get_all()
        .await
        .into_values()
        .filter(|c| status.map_or(true, |s| c.final_status == s))
        .collect();
    calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(calls))
}

/// GET /calls/:id
async fn get_call(
    State(app): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CallMetricsRecord>, StatusCode> {
    app.tracker
        .get(&id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
struct StartBatchBody {
    numbers: Vec<String>,
    #[serde(default)]
    repeat: Option<u32>,
    #[serde(default)]
    min_delay_sec: Option<u64>,
    #[serde(default)]
    max_delay_sec: Option<u64>,
    #[serde(default)]
    daily_cap: Option<u32>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    tag: Option<String>,
}

impl StartBatchBody {
    fn into_request(self, defaults: &BatchDefaults) -> BatchRequest {
        BatchRequest {
            destinations: self.numbers,
            repeat: self.repeat.unwrap_or(defaults.repeat),
            min_delay_sec: self.min_delay_sec.unwrap_or(defaults.min_delay_sec),
            max_delay_sec: self.max_delay_sec.unwrap_or(defaults.max_delay_sec),
            dry_run: self.dry_run,
            daily_cap: self.daily_cap.unwrap_or(defaults.daily_cap),
            tag: self.tag,
        }
    }
}

/// POST /batches - returns as soon as the batch is running
async fn start_batch(
    State(app): State<SharedState>,
    body: Result<Json<StartBatchBody>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(body) = body?;
    let request = body.into_request(&app.batch_defaults);
    let handle = app.batches.submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "ok": true, "batch_id": handle.id })),
    ))
}

/// GET /batches
async fn list_batches(State(app): State<SharedState>) -> Json<Vec<BatchStatus>> {
    Json(app.batches.list().await)
}

/// GET /batches/:id
async fn get_batch(
    State(app): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<BatchStatus>, ApiError> {
    Ok(Json(app.batches.status(&id).await?))
}

/// GET /metrics/stats
async fn stats(State(app): State<SharedState>) -> Result<Json<CallStats>, ApiError> {
    let records = app.tracker.load_finalized().await?;
    Ok(Json(compute_stats(&records)))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dialpace"
    }))
}
