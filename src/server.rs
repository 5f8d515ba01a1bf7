//! HTTP server: webhook ingestion plus the relay endpoints.
//!
//! Routes are built over a shared `AppState` and served by a single axum
//! server with graceful shutdown. Each request runs as its own task; the only
//! shared state is the read-only store handle and the Telegram client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{RelayError, ServerError};
use crate::ingest::{self, Update};
use crate::relay::{self, Disposition};
use crate::store::{FileRecord, MetadataStore};
use crate::telegram::TelegramApi;

/// Header Telegram sends the configured webhook secret in.
const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Maximum number of records rendered on the listing page.
const LISTING_LIMIT: usize = 200;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub telegram: Arc<TelegramApi>,
    webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        telegram: Arc<TelegramApi>,
        config: &ServerConfig,
    ) -> Self {
        let webhook_secret = config
            .webhook_secret
            .as_ref()
            .map(|s| s.expose_secret().to_string());
        Self {
            store,
            telegram,
            webhook_secret,
        }
    }
}

/// Build the full route table with state and layers applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/files", get(list_files_handler))
        .route("/stream/{id}", get(stream_handler))
        .route("/download/{id}", get(download_handler))
        .route("/thumb/{id}", get(thumb_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Permissive CORS so browser media players on other origins can seek.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            header::CONTENT_DISPOSITION,
        ])
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::NotFound { .. } | RelayError::LocatorInvalid { .. } => {
                (StatusCode::NOT_FOUND, "file not found").into_response()
            }
            RelayError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                "requested range not satisfiable",
            )
                .into_response(),
            RelayError::Resolution { .. } | RelayError::RemoteFetch { .. } => {
                tracing::warn!(error = %self, "remote fetch failed");
                (StatusCode::BAD_GATEWAY, "upstream fetch failed").into_response()
            }
            RelayError::Store(e) => {
                tracing::error!(error = %e, "store failure during relay");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "invalid webhook secret").into_response();
        }
    }

    // Parsed only after authentication. A 4xx here would make Telegram
    // redeliver the same unparseable update forever, so bad payloads are
    // logged and acked like any other update.
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unparseable webhook payload");
            return ok_body();
        }
    };

    let update_id = update.update_id;
    let Some(msg) = update.into_message() else {
        return ok_body();
    };

    if msg.text.as_deref() == Some("/start") {
        let telegram = state.telegram.clone();
        let chat_id = msg.chat.id;
        // Replying must not delay the webhook ack.
        tokio::spawn(async move {
            if let Err(e) = telegram
                .send_message(chat_id, "Bot is running. Send any file to publish it on the web.")
                .await
            {
                tracing::warn!(error = %e, chat_id, "failed to answer /start");
            }
        });
        return ok_body();
    }

    match ingest::extract_media(&msg) {
        Some(record) => {
            if let Err(e) = state.store.upsert(&record).await {
                // Still ack with 200: Telegram would otherwise redeliver the
                // same update against the same failing store.
                tracing::error!(error = %e, update_id, "failed to persist file record");
            } else {
                tracing::info!(
                    file_id = %record.file_id,
                    kind = record.kind.as_str(),
                    size = record.size,
                    "ingested media"
                );
            }
        }
        None => tracing::debug!(update_id, "update carried no media"),
    }

    ok_body()
}

fn ok_body() -> Response {
    (StatusCode::OK, "ok").into_response()
}

async fn list_files_handler(State(state): State<AppState>) -> Response {
    match state.store.list_recent(LISTING_LIMIT).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list files");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> Response {
    match state.store.list_recent(LISTING_LIMIT).await {
        Ok(records) => Html(render_index(&records)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render listing");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

async fn stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_media(state, id, headers, Disposition::Inline).await
}

async fn download_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_media(state, id, headers, Disposition::Attachment).await
}

async fn serve_media(
    state: AppState,
    id: String,
    headers: HeaderMap,
    disposition: Disposition,
) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let result = async {
        let record = state
            .store
            .lookup(&id)
            .await?
            .ok_or_else(|| RelayError::NotFound { id: id.clone() })?;
        relay::serve(&state.telegram, &record, range.as_deref(), disposition).await
    }
    .await;

    result.unwrap_or_else(IntoResponse::into_response)
}

async fn thumb_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = async {
        let record = state
            .store
            .lookup(&id)
            .await?
            .ok_or_else(|| RelayError::NotFound { id: id.clone() })?;
        let thumb_id = record.thumb_id.ok_or(RelayError::NotFound { id })?;
        relay::serve_thumb(&state.telegram, &thumb_id).await
    }
    .await;

    result.unwrap_or_else(IntoResponse::into_response)
}

fn render_index(records: &[FileRecord]) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html>\n<head>\n<title>mediaferry</title>\n<style>\n\
         body { font-family: sans-serif; background: #111; color: #eee; padding: 20px; }\n\
         a { color: #4ea3ff; text-decoration: none; }\n\
         .file { margin-bottom: 15px; padding: 10px; background: #1c1c1c; border-radius: 8px; }\n\
         img { max-width: 220px; border-radius: 8px; display: block; margin-bottom: 8px; }\n\
         </style>\n</head>\n<body>\n<h2>Files</h2>\n",
    );

    for record in records {
        html.push_str("<div class=\"file\">\n");
        if record.thumb_id.is_some() {
            html.push_str(&format!(
                "<img src=\"/thumb/{}\" alt=\"\">\n",
                escape_html(&record.file_id)
            ));
        }
        html.push_str(&format!("<b>{}</b><br>\n", escape_html(&record.file_name)));
        if let Some(caption) = &record.caption {
            html.push_str(&format!("{}<br>\n", escape_html(caption)));
        }
        html.push_str(&format!(
            "<a href=\"/stream/{id}\">Watch</a> &middot; <a href=\"/download/{id}\">Download</a>\n",
            id = escape_html(&record.file_id)
        ));
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Configuration for the relay server.
pub struct RelayServerConfig {
    /// Address to bind the server to.
    pub addr: SocketAddr,
}

/// The HTTP server hosting all relay and webhook routes.
///
/// `start()` binds the listener and spawns the serving task; `shutdown()`
/// signals graceful shutdown and waits for in-flight requests.
pub struct RelayServer {
    config: RelayServerConfig,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RelayServer {
    /// Create a new server with the given bind address.
    pub fn new(config: RelayServerConfig) -> Self {
        Self {
            config,
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self, app: Router) -> Result<SocketAddr, ServerError> {
        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.config.addr.to_string(),
                reason: e.to_string(),
            })?;

        let addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: self.config.addr.to_string(),
            reason: e.to_string(),
        })?;
        self.local_addr = Some(addr);

        tracing::info!("relay server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("relay server shutting down");
                })
                .await
            {
                tracing::error!("relay server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(addr)
    }

    /// Address the server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
