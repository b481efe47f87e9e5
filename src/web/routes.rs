use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::signature::{verify_signature, SIGNATURE_HEADER};
use super::AppState;
use crate::constants::SERVICE_NAME;
use crate::model::{WebhookPayload, NEW_ENTRIES_EVENT};
use crate::processor::ProcessOutcome;

const EVENT_TYPE_HEADER: &str = "x-miniflux-event-type";

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = state.config.miniflux_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(e) = verify_signature(secret.as_bytes(), &body, signature) {
            warn!("Rejected webhook: {e}");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    }

    let event_type = headers
        .get(EVENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if event_type != NEW_ENTRIES_EVENT {
        debug!(event_type, "Ignored event type");
        return StatusCode::OK.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!("Invalid webhook JSON: {e}");
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    if payload.event_type != NEW_ENTRIES_EVENT {
        debug!(event_type = %payload.event_type, "Ignored event type in payload");
        return StatusCode::OK.into_response();
    }

    info!(
        feed = %payload.feed.title,
        entries = payload.entries.len(),
        "Received new entries"
    );

    for entry in &payload.entries {
        match state.processor.process(&payload.feed, entry).await {
            Ok(ProcessOutcome::Duplicate) => {}
            Ok(ProcessOutcome::Persisted) => debug!(hash = %entry.hash, "Entry processed"),
            Err(e) => error!(hash = %entry.hash, "Error processing entry: {e:#}"),
        }
    }

    StatusCode::OK.into_response()
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}
