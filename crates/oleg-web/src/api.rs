//! Liveness and status handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use oleg_agent::{PipelineSnapshot, Tunables, UsageSnapshot};
use oleg_store::{QuotaSnapshot, StoreStats};
use serde::Serialize;
use serde_json::{Value, json};

use crate::state::{AppState, WebhookSnapshot};

// ---------------------------------------------------------------------------
// GET /health, GET /
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "oleg" }))
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Oleg is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Response payload for the `/api/status` endpoint.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub model: String,
    pub tunables: Tunables,
    pub quota: QuotaSnapshot,
    pub store: StoreStats,
    pub responder: UsageSnapshot,
    pub pipeline: PipelineSnapshot,
    pub webhook: WebhookSnapshot,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let responder = state.pipeline.responder();
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        model: responder.model().to_owned(),
        tunables: state.settings.snapshot(),
        quota: state.quota.snapshot(Utc::now()),
        store: state.store.stats(),
        responder: responder.stats().snapshot(),
        pipeline: state.pipeline.stats().snapshot(),
        webhook: state.webhook_stats.snapshot(),
    })
}
