//! HTTP ingestion front-end and read path, built on Axum.
//!
//! The write side validates an incoming event and answers `202 Accepted`
//! before the publish to the source topic completes; the durable log's
//! guarantees begin at the broker, not at the HTTP boundary.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::producer::EventProducer;
use crate::storage::PgEventStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Producer for the source topic.
    pub producer: Arc<EventProducer>,
    /// Store backing the read path.
    pub store: Arc<PgEventStore>,
}

/// Incoming event submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventRequest {
    /// Client-supplied event id; must be a UUID.
    pub event_id: String,
    /// Event category; must be non-empty.
    pub event_type: String,
    /// Opaque payload, forwarded verbatim.
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

/// Query parameters for the event listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Filter by event type.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// Page size, clamped to 1..=200 (default 50).
    pub limit: Option<i64>,
    /// Page offset (default 0).
    pub offset: Option<i64>,
    /// Lower RFC3339 bound on `received_at`.
    pub from: Option<DateTime<Utc>>,
    /// Upper RFC3339 bound on `received_at`.
    pub to: Option<DateTime<Utc>>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/events", post(ingest_event).get(list_events))
        .route("/v1/events/:id", get(get_event))
        .route("/v1/analytics/types", get(type_counts))
        .with_state(state)
}

/// Serve the API until the cancellation token fires.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state);
    info!(%addr, "starting ingestion api");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ready"
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    if Uuid::parse_str(&req.event_id).is_err() {
        return Err((StatusCode::BAD_REQUEST, "invalid event_id".to_string()));
    }
    if req.event_type.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "invalid event_type".to_string()));
    }

    let response = Json(serde_json::json!({
        "status": "accepted",
        "event_id": req.event_id.clone(),
        "message": "Event accepted for processing",
    }));

    // Publish after responding; the detached task must not block the 202.
    let producer = state.producer.clone();
    let event_id = req.event_id.clone();
    tokio::spawn(async move {
        if let Err(e) = producer.publish(&event_id, &req).await {
            let err_text = format!("{e:#}");
            error!(event_id = %event_id, error = %err_text, "failed to publish event");
        }
    });

    Ok((StatusCode::ACCEPTED, response))
}

async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);

    let (events, total) = state
        .store
        .list_events(
            params.event_type.as_deref(),
            params.from,
            params.to,
            limit,
            offset,
        )
        .await
        .map_err(internal_error)?;

    Ok(Json(serde_json::json!({
        "events": events,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::storage::StoredEvent>, (StatusCode, String)> {
    match state.store.get_event(&id).await.map_err(internal_error)? {
        Some(event) => Ok(Json(event)),
        None => Err((StatusCode::NOT_FOUND, "event not found".to_string())),
    }
}

async fn type_counts(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::storage::TypeCount>>, (StatusCode, String)> {
    let counts = state.store.type_counts().await.map_err(internal_error)?;
    Ok(Json(counts))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    let err_text = format!("{err:#}");
    error!(error = %err_text, "query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}
