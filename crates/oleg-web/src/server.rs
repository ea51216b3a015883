//! Main web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, and starts
//! the HTTP listener.  It also spawns the background sweep that drops chats
//! idle for longer than [`AppState::chat_idle`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use chrono::Utc;
use oleg_store::SlidingWindowStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::WebConfig;
use crate::api;
use crate::error::{Result, WebError};
use crate::state::AppState;
use crate::webhook;

/// How often the idle-chat sweep runs.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// The Oleg web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(api::root))
            .route("/health", get(api::health))
            .route("/api/status", get(api::status))
            .route("/webhook/telegram", post(webhook::telegram_webhook))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Bind`] if the listener cannot be bound.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| WebError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = %addr, "starting web server");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.router();
        let purge = spawn_purge_task(
            Arc::clone(&self.state.store),
            self.state.chat_idle,
            PURGE_INTERVAL,
        );

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        purge.abort();
        info!(stats = %self.state.pipeline.stats(), "web server stopped");
        served.map_err(WebError::from)
    }
}

/// Periodically purge chats idle for longer than `max_idle`.
pub fn spawn_purge_task(
    store: Arc<SlidingWindowStore>,
    max_idle: chrono::Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_inactive(max_idle, Utc::now());
            if purged > 0 {
                info!(purged, remaining = store.chat_count(), "purged idle chats");
            }
        }
    })
}
