//! Feed HTTP API
//!
//! - GET /ui/recent                      - HTML feed page (newest 100)
//! - GET /api/feed?limit=N               - JSON feed entries
//! - GET /ui/answer/:name                - annotated plain text
//! - GET /ui/answer/:name/raw            - artifact text only
//! - GET /ui/answer/:name/download       - artifact bytes as attachment
//! - GET /ui/answer/:name/download.sig   - detached signature as attachment
//! - GET /ui/events                      - SSE stream of newest-artifact changes
//! - GET /health                         - liveness and input summary

use aletheia_core::{
    format_timestamp, signer_fingerprint, ArtifactPaths, FeedEntry, FeedError, FeedScanner,
    MemoizingVerifier, NameResolver, SignatureVerifier, SshKeygenVerifier, DEFAULT_FEED_LIMIT,
    PAGE_FEED_LIMIT,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::FeedConfig;
use crate::health::{check_health, HealthResponse};
use crate::live_events::{spawn_change_feed, OutboxWatcher};
use crate::render::{annotated_answer, feed_page, AnswerHeader};
use crate::verify_pool::VerifyPool;

/// Upper bound for `/api/feed?limit=`
pub const MAX_FEED_LIMIT: usize = 500;

/// Read size for streamed downloads
const DOWNLOAD_CHUNK: usize = 64 * 1024;

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub config: FeedConfig,
    pub resolver: NameResolver,
    pub scanner: FeedScanner,
    pub pool: VerifyPool,
    watcher: Option<OutboxWatcher>,
    shutdown: watch::Sender<bool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// State backed by `ssh-keygen` verification, memoized unless disabled
    pub fn new(config: FeedConfig) -> Self {
        let ssh = SshKeygenVerifier::new(&config.allowed_signers, &config.signer_id)
            .with_program(&config.ssh_keygen)
            .with_namespace(&config.namespace)
            .with_timeout(config.verify_timeout);

        let verifier: Arc<dyn SignatureVerifier> = if config.verify_cache {
            Arc::new(MemoizingVerifier::new(ssh, &config.allowed_signers))
        } else {
            Arc::new(ssh)
        };
        Self::with_verifier(config, verifier)
    }

    /// State with a caller-supplied verification backend
    pub fn with_verifier(config: FeedConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        let resolver = NameResolver::new(&config.outbox);
        let scanner = FeedScanner::new(resolver.root());
        let pool = VerifyPool::new(verifier, config.verify_workers);

        let watcher = if config.watch {
            match OutboxWatcher::start(resolver.root()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(
                        "Cannot watch {}, falling back to polling: {}",
                        resolver.root().display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            config,
            resolver,
            scanner,
            pool,
            watcher,
            shutdown: watch::Sender::new(false),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// End every open live event stream
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Newest-first feed entries with verification status attached
    pub async fn load_feed(&self, limit: usize) -> Vec<FeedEntry> {
        let scanner = self.scanner.clone();
        let previews = tokio::task::spawn_blocking(move || scanner.previews(limit))
            .await
            .map_err(io::Error::other)
            .and_then(|r| r);

        match previews {
            Ok(previews) => self.pool.annotate(previews).await,
            Err(e) => {
                tracing::warn!(
                    "Cannot scan outbox {}: {}",
                    self.scanner.outbox().display(),
                    e
                );
                Vec::new()
            }
        }
    }
}

pub fn feed_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/feed", get(list_feed))
        .route("/ui/recent", get(recent_page))
        .route("/ui/answer/:name", get(get_answer))
        .route("/ui/answer/:name/raw", get(get_answer_raw))
        .route("/ui/answer/:name/download", get(download_answer))
        .route("/ui/answer/:name/download.sig", get(download_signature))
        .route("/ui/events", get(answer_events))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadName,
    NotFound,
    Internal(String),
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        tracing::debug!(code = e.code().as_str(), "Request rejected: {}", e);
        match e {
            FeedError::InvalidName { .. } => Self::BadName,
            FeedError::NotFound { .. } => Self::NotFound,
            FeedError::Io(e) if e.kind() == io::ErrorKind::NotFound => Self::NotFound,
            FeedError::Io(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadName => (StatusCode::BAD_REQUEST, "bad name".to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Internal(detail) => {
                tracing::error!("Request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "read failed".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub count: usize,
    pub entries: Vec<FeedEntry>,
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let config = state.config.clone();
    let response = tokio::task::spawn_blocking(move || check_health(&config)).await;
    match response {
        Ok(response) => Json(response),
        Err(e) => {
            tracing::warn!("Health check task failed: {}", e);
            Json(check_health(&state.config))
        }
    }
}

async fn list_feed(
    State(state): State<SharedState>,
    Query(query): Query<FeedQuery>,
) -> Json<FeedResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .min(MAX_FEED_LIMIT);
    let entries = if limit == 0 {
        Vec::new()
    } else {
        state.load_feed(limit).await
    };
    Json(FeedResponse {
        count: entries.len(),
        entries,
    })
}

async fn recent_page(State(state): State<SharedState>) -> Html<String> {
    let entries = state.load_feed(PAGE_FEED_LIMIT).await;
    Html(feed_page(&entries))
}

/// Resolve `name` and require the artifact to exist as a regular file
async fn existing_artifact(
    state: &AppState,
    name: &str,
) -> Result<(ArtifactPaths, std::fs::Metadata), ApiError> {
    let paths = state.resolver.resolve(name)?;
    match tokio::fs::metadata(&paths.artifact).await {
        Ok(meta) if meta.is_file() => Ok((paths, meta)),
        Ok(_) => Err(FeedError::NotFound {
            path: paths.artifact,
        }
        .into()),
        Err(e) => Err(FeedError::from(e).into()),
    }
}

async fn read_artifact(paths: &ArtifactPaths) -> Result<Vec<u8>, ApiError> {
    tokio::fs::read(&paths.artifact)
        .await
        .map_err(|e| FeedError::from(e).into())
}

async fn get_answer(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let (paths, meta) = existing_artifact(&state, &name).await?;
    let body = read_artifact(&paths).await?;

    let status = state.pool.verify(paths.artifact.clone()).await;
    let signature_present = tokio::fs::try_exists(&paths.signature)
        .await
        .unwrap_or(false);

    let trust_store = state.config.allowed_signers.clone();
    let fingerprint = tokio::task::spawn_blocking(move || signer_fingerprint(&trust_store))
        .await
        .unwrap_or_else(|_| aletheia_core::UNKNOWN_FINGERPRINT.to_string());

    let when = meta
        .modified()
        .map(format_timestamp)
        .unwrap_or_default();

    let text = annotated_answer(
        &AnswerHeader {
            name: &paths.name,
            when: &when,
            size: meta.len(),
            status,
            signature_present,
            fingerprint: &fingerprint,
        },
        &String::from_utf8_lossy(&body),
    );
    Ok(plain_text(text))
}

async fn get_answer_raw(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let (paths, _) = existing_artifact(&state, &name).await?;
    let body = read_artifact(&paths).await?;
    Ok(plain_text(String::from_utf8_lossy(&body).into_owned()))
}

async fn download_answer(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let paths = state.resolver.resolve(&name)?;
    let file = open_regular(&paths.artifact).await?;
    Ok(attachment(
        &paths.name,
        "text/plain; charset=utf-8",
        stream_file(file),
    ))
}

async fn download_signature(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let paths = state.resolver.resolve(&name)?;
    let file = open_regular(&paths.signature).await?;
    let filename = format!("{}{}", paths.name, aletheia_core::SIGNATURE_SUFFIX);
    Ok(attachment(
        &filename,
        "application/octet-stream",
        stream_file(file),
    ))
}

/// Open `path` for streaming; anything but a regular file is not found
async fn open_regular(path: &std::path::Path) -> Result<tokio::fs::File, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(FeedError::from)?;
    let meta = file.metadata().await.map_err(FeedError::from)?;
    if !meta.is_file() {
        return Err(FeedError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(file)
}

/// Body that reads `file` in chunks as the client consumes it
fn stream_file(mut file: tokio::fs::File) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(4);
    tokio::spawn(async move {
        loop {
            let mut chunk = vec![0u8; DOWNLOAD_CHUNK];
            match file.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    chunk.truncate(n);
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Download read failed: {}", e);
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });
    Body::from_stream(ReceiverStream::new(rx))
}

async fn answer_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let changes = state.watcher.as_ref().map(OutboxWatcher::subscribe);
    let names = spawn_change_feed(
        state.scanner.clone(),
        state.config.poll_interval,
        changes,
        state.shutdown.subscribe(),
    );

    let stream = ReceiverStream::new(names).map(|name| Ok(Event::default().data(name)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn plain_text(text: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response()
}

fn attachment(filename: &str, content_type: &'static str, body: Body) -> Response {
    let content_disposition = format!("attachment; filename=\"{}\"", filename);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        body,
    )
        .into_response()
}
