//! `POST /webhook/telegram`.
//!
//! The handler validates and parses the update, hands the message to the
//! pipeline on a spawned task and answers 200 straight away.  Rejected
//! requests never touch conversation state.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use oleg_adapters::Update;
use serde_json::json;
use tracing::{debug, warn};

use crate::state::AppState;

/// Header Telegram uses to echo the secret given to `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.webhook_stats.record_received();

    if let Some(expected) = &state.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            state.webhook_stats.record_rejected_secret();
            warn!("webhook rejected: bad secret token");
            return (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "Invalid secret token" })),
            )
                .into_response();
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            state.webhook_stats.record_malformed();
            warn!(error = %e, "webhook rejected: malformed update");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Invalid update payload" })),
            )
                .into_response();
        }
    };

    match update.message().and_then(|m| m.to_message(state.bot_id)) {
        Some(message) => {
            state.webhook_stats.record_dispatched();
            debug!(
                update_id = update.update_id,
                chat_id = message.chat_id,
                message_id = message.id,
                edited = update.is_edit(),
                "dispatching update"
            );
            let pipeline = Arc::clone(&state.pipeline);
            tokio::spawn(async move {
                pipeline.handle_message(message).await;
            });
        }
        None => {
            state.webhook_stats.record_ignored();
            debug!(update_id = update.update_id, "update carries no message, ignored");
        }
    }

    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}
