//! HTTP and socket surface over the message store.
//!
//! Chat routes (`/api/conversations`, `/api/users`) answer with bare JSON
//! bodies; payload routes (`/api/payloads/...`) wrap results in
//! `{"success": bool, ...}`. `/ws` streams relay events as text frames.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tokio::sync::{Mutex, MutexGuard};
use tower_http::trace::TraceLayer;

use crate::ingest::{IngestPlan, IngestRunReport, run_ingest};
use crate::relay::Relay;
use crate::sqlite::MessageStore;

pub mod handlers;
pub mod ws;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<MessageStore>>,
    pub relay: Relay,
    pub payload_dir: PathBuf,
    pub business_phone: String,
    ingest_running: Arc<AtomicBool>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: MessageStore,
        relay: Relay,
        payload_dir: PathBuf,
        business_phone: impl Into<String>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            relay,
            payload_dir,
            business_phone: business_phone.into(),
            ingest_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn lock_store(&self) -> MutexGuard<'_, MessageStore> {
        self.store.lock().await
    }

    /// Runs one ingestion over `payload_dir`. Returns `Ok(None)` when another
    /// run is still in progress. Blocks on the store lock, so call it from
    /// `spawn_blocking`.
    pub fn run_exclusive_ingest(&self) -> Result<Option<IngestRunReport>> {
        if self
            .ingest_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        let plan = IngestPlan {
            payload_dir: self.payload_dir.clone(),
        };
        let outcome = run_ingest(&mut self.store.blocking_lock(), &self.relay, &plan);
        self.ingest_running.store(false, Ordering::Release);
        outcome.map(Some)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origins; empty allows any origin.
    pub cors_origins: Vec<String>,
    pub ingest_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            ingest_on_start: false,
        }
    }
}

pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any))
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let chat_routes = Router::new()
        .route("/api/conversations", get(handlers::get_conversations))
        .route(
            "/api/conversations/{wa_id}/messages",
            get(handlers::get_party_messages).post(handlers::post_party_message),
        )
        .route("/api/users/{wa_id}", get(handlers::get_user));

    let payload_routes = Router::new()
        .route("/api/payloads/process", post(handlers::post_process_payloads))
        .route("/api/payloads/messages", get(handlers::get_processed_messages))
        .route(
            "/api/payloads/conversations/{conversation_id}/messages",
            get(handlers::get_conversation_log),
        )
        .route(
            "/api/payloads/messages/{message_id}/status",
            put(handlers::put_message_status),
        )
        .route("/api/payloads/summary", get(handlers::get_summary))
        .route(
            "/api/payloads/messages/bulk-update-status",
            post(handlers::post_bulk_update_status),
        );

    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/ws", get(ws::ws_handler))
        .merge(chat_routes)
        .merge(payload_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<()> {
    let app = build_router(state.clone(), cors_layer(&config.cors_origins)?);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server to {addr}"))?;
    tracing::info!(%addr, payload_dir = %state.payload_dir.display(), "server listening");

    if config.ingest_on_start {
        let ingest_state = state.clone();
        tokio::task::spawn_blocking(move || match ingest_state.run_exclusive_ingest() {
            Ok(Some(report)) => tracing::info!(
                ingest_run_id = %report.ingest_run_id,
                inserted = report.counts.messages_inserted,
                "startup ingestion finished"
            ),
            Ok(None) => tracing::warn!("startup ingestion skipped; a run is in progress"),
            Err(error) => {
                tracing::error!(error = %format!("{error:#}"), "startup ingestion failed");
            }
        });
    }

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")
}
