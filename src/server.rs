//! HTTP server using axum
//!
//! Exposes the log viewer over HTTP:
//! - `/` and `/index.html` serve the embedded web page
//! - `/api/health` and `/api/config` report the running configuration
//! - `/api/files` lists every file under the log directory
//! - `/api/file?path=` returns a (possibly truncated) UTF-8 preview
//! - `/api/download?path=` streams the complete file

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio_util::io::ReaderStream;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::fs::{self, FileDescriptor, FileEntry, ListError};
use crate::preview::{self, PreviewError};
use crate::security::{self, SecurityError};

const INDEX_TEMPLATE: &str = include_str!("../web/index.html");

// ============================================================================
// Server State
// ============================================================================

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub started_at: DateTime<Local>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            started_at: Local::now(),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub path: String,
    pub preview_size: u64,
    pub server_port: String,
    pub encoding: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub log_directory: String,
    pub preview_size: u64,
    pub server_port: String,
    pub version: &'static str,
    pub encoding: &'static str,
    pub start_time: String,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub path: String,
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: Option<String>,
}

/// Failures of the per-file endpoints, mapped onto HTTP status codes
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing file path")]
    MissingPath,
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error("file not found")]
    NotFound,
    #[error(transparent)]
    Preview(#[from] PreviewError),
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingPath => StatusCode::BAD_REQUEST,
            ApiError::Security(SecurityError::NotFound) | ApiError::NotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::Security(SecurityError::EmptyPath) => StatusCode::BAD_REQUEST,
            ApiError::Security(SecurityError::IoError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Security(_) => StatusCode::FORBIDDEN,
            ApiError::Preview(_) | ApiError::Io(_) | ApiError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

// ============================================================================
// Router Creation
// ============================================================================

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let routes = Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/api/health", get(health))
        .route("/api/config", get(config_info))
        .route("/api/files", get(file_list))
        .route("/api/file", get(file_content))
        .route("/api/download", get(file_download))
        .fallback(index)
        .with_state(state);

    with_middleware(routes, &config)
}

/// Wraps `router` in the request timeout, compression, CORS and tracing layers.
#[allow(deprecated)]
pub fn with_middleware(router: Router, config: &Config) -> Router {
    router
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(CompressionLayer::new())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CONTENT_ENCODING])
}

// ============================================================================
// Handlers
// ============================================================================

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.config))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        path: config.log_directory.display().to_string(),
        preview_size: config.preview.size_limit,
        server_port: config.port.to_string(),
        encoding: config.preview.encoding.label(),
    })
}

async fn config_info(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        log_directory: config.log_directory.display().to_string(),
        preview_size: config.preview.size_limit,
        server_port: config.port.to_string(),
        version: crate::VERSION,
        encoding: config.preview.encoding.label(),
        start_time: state.started_at.to_rfc3339_opts(SecondsFormat::Secs, false),
    })
}

async fn file_list(State(state): State<AppState>) -> Response {
    let root = state.config.log_directory.clone();
    let mut response = FileListResponse {
        path: root.display().to_string(),
        files: Vec::new(),
        error: None,
    };

    let listing = tokio::task::spawn_blocking(move || fs::list_files(&root)).await;
    let status = match listing {
        Ok(Ok(files)) => {
            response.files = files;
            StatusCode::OK
        }
        Ok(Err(err @ ListError::MissingRoot(_))) => {
            response.error = Some(err.to_string());
            StatusCode::NOT_FOUND
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "directory listing failed");
            response.error = Some(err.to_string());
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(err) => {
            tracing::error!(error = %err, "directory listing task failed");
            response.error = Some(err.to_string());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(response)).into_response()
}

async fn file_content(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let config = Arc::clone(&state.config);
    let result = tokio::task::spawn_blocking(move || {
        let descriptor = locate(&config, query.path.as_deref())?;
        preview::preview_file(&descriptor, &config.preview).map_err(ApiError::from)
    })
    .await??;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        result.into_body(),
    )
        .into_response())
}

async fn file_download(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let config = Arc::clone(&state.config);
    let descriptor =
        tokio::task::spawn_blocking(move || locate(&config, query.path.as_deref())).await??;
    let file = tokio::fs::File::open(&descriptor.absolute_path).await?;
    // The open handle's length, not the earlier stat, matches what gets streamed.
    let length = file.metadata().await?.len();

    tracing::info!(file = %descriptor.name, size = length, "download started");

    let headers: [(HeaderName, HeaderValue); 3] = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&descriptor.name),
        ),
        (
            header::CONTENT_LENGTH,
            HeaderValue::from(length),
        ),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

// ============================================================================
// Helpers
// ============================================================================

/// Validates the requested path and stats the file it names.
///
/// Canonicalizes and stats on the calling thread; handlers run it through
/// `spawn_blocking`.
fn locate(config: &Config, requested: Option<&str>) -> Result<FileDescriptor, ApiError> {
    let requested = requested
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::MissingPath)?;
    let resolved = security::resolve_within(&config.log_directory, Path::new(requested))?;

    fs::stat_file(&resolved).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ApiError::NotFound,
        _ => ApiError::Io(err),
    })
}

fn content_disposition(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Fills the embedded page with the running configuration.
pub fn render_index(config: &Config) -> String {
    INDEX_TEMPLATE
        .replace("{{LOG_DIRECTORY}}", &escape_html(&config.log_directory.display().to_string()))
        .replace("{{PREVIEW_SIZE}}", &config.preview.size_limit.to_string())
        .replace("{{PREVIEW_SIZE_MB}}", &format!("{:.2}", config.preview_size_mb()))
        .replace("{{SERVER_PORT}}", &config.port.to_string())
        .replace("{{VERSION}}", crate::VERSION)
        .replace("{{ENCODING}}", config.preview.encoding.label())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Server Startup
// ============================================================================

/// Run the server until Ctrl+C or SIGTERM
pub async fn run(state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("server listening on http://localhost:{}", state.config.port);

    let deadline = state.config.shutdown_timeout;
    serve_until(listener, create_router(state), shutdown_signal(), deadline).await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Serves `app` until `shutdown` resolves, then drains in-flight requests.
///
/// Connections still open `deadline` after the signal are dropped.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    deadline: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (fired_tx, fired_rx) = oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        let _ = fired_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    let expired = async move {
        if fired_rx.await.is_err() {
            // Server finished before any signal arrived.
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(deadline).await;
    };

    tokio::select! {
        result = &mut server => result,
        _ = expired => {
            tracing::warn!(deadline = ?deadline, "shutdown deadline reached, dropping open connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, finishing in-flight requests");
}
