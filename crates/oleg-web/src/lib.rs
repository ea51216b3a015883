//! HTTP surface of the Oleg bot.
//!
//! - `POST /webhook/telegram` receives Telegram updates, acknowledges them
//!   at once and processes each message on a spawned task.
//! - `GET /health`, `GET /` and `GET /api/status` report liveness and
//!   runtime counters.

pub mod api;
pub mod error;
pub mod server;
pub mod state;
pub mod webhook;

pub use error::{Result, WebError};
pub use server::{WebServer, spawn_purge_task};
pub use state::{AppState, WebhookSnapshot, WebhookStats};

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8000,
        }
    }
}
