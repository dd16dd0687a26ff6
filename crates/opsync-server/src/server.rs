//! `OpsyncServer` — the Axum HTTP sync gateway.
//!
//! Thin transport over the engine: handlers resolve the caller identity,
//! borrow a pooled connection on a blocking worker, and delegate to
//! `opsync-engine`. All sync semantics live there; this layer only maps
//! results to HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use opsync_core::wire::{ClientCompletion, PullRequest, PushRequest};
use opsync_engine::compliance::compliance_by_area;
use opsync_engine::errors::EngineError;
use opsync_engine::notify::NotificationDispatcher;
use opsync_engine::{pull, push, SyncContext};
use opsync_store::{ConnectionPool, StoreError};

use crate::config::ServerConfig;
use crate::identity::Identity;
use crate::metrics::{
    SYNC_PULL_REQUESTS_TOTAL, SYNC_PUSH_COMPLETIONS_TOTAL, SYNC_PUSH_ERRORS_TOTAL,
};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool.
    pub pool: ConnectionPool,
    /// Notification sink for post-commit facts.
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle, when the recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The sync gateway server.
pub struct OpsyncServer {
    config: ServerConfig,
    pool: ConnectionPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl OpsyncServer {
    /// Create a new server over an existing (migrated) pool.
    pub fn new(
        config: ServerConfig,
        pool: ConnectionPool,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            config,
            pool,
            dispatcher,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Attach a Prometheus handle, enabling `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            pool: self.pool.clone(),
            dispatcher: self.dispatcher.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/sync/pull", post(pull_handler))
            .route("/sync/push", post(push_handler))
            .route("/sync/completions", post(single_completion_handler))
            .route("/sync/status", get(status_handler))
            .route("/reports/compliance", get(compliance_handler))
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(self.config.max_body_bytes))
            .with_state(state)
    }

    /// Bind and start serving. Returns the bound address and the serve
    /// task's handle; the task drains when the shutdown token fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .ok();
        });

        info!(addr = %local_addr, "sync gateway listening");
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// ─────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────

/// HTTP-facing error wrapper.
enum ApiError {
    Engine(EngineError),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Engine(err) => {
                let status = match &err {
                    EngineError::ScopeViolation(_) => StatusCode::FORBIDDEN,
                    EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            }
            Self::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
            }
        };
        let body = Json(json!({ "error": message, "code": code }));
        (status, body).into_response()
    }
}

/// Run a closure against a pooled connection on the blocking thread pool.
async fn with_conn<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, EngineError> + Send + 'static,
{
    let pool = state.pool.clone();
    let join = tokio::task::spawn_blocking(move || -> Result<T, EngineError> {
        let conn = pool.get().map_err(|e| EngineError::Store(StoreError::from(e)))?;
        f(&conn)
    })
    .await;
    match join {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(ApiError::Internal(format!("worker panicked: {err}"))),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => crate::metrics::render(&handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// POST /sync/pull
async fn pull_handler(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Json(req): Json<PullRequest>,
) -> Result<Response, ApiError> {
    counter!(SYNC_PULL_REQUESTS_TOTAL).increment(1);
    let resp = with_conn(&state, move |conn| pull::pull(conn, &ctx, &req)).await?;
    Ok(Json(resp).into_response())
}

/// POST /sync/push
async fn push_handler(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Json(req): Json<PushRequest>,
) -> Result<Response, ApiError> {
    let dispatcher = state.dispatcher.clone();
    let resp = with_conn(&state, move |conn| {
        Ok(push::apply_push(conn, &ctx, &req, dispatcher.as_ref()))
    })
    .await?;

    let duplicates =
        resp.completions.iter().filter(|a| a.status == opsync_core::wire::AckStatus::Duplicate).count();
    let created = resp.completions.len() - duplicates;
    counter!(SYNC_PUSH_COMPLETIONS_TOTAL, "outcome" => "created").increment(created as u64);
    counter!(SYNC_PUSH_COMPLETIONS_TOTAL, "outcome" => "duplicate").increment(duplicates as u64);
    for err in &resp.errors {
        counter!(SYNC_PUSH_ERRORS_TOTAL, "code" => err.code.clone()).increment(1);
    }

    Ok(Json(resp).into_response())
}

/// POST /sync/completions — single-completion fallback for constrained
/// clients. Same semantics as a one-item push.
async fn single_completion_handler(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Json(item): Json<ClientCompletion>,
) -> Result<Response, ApiError> {
    let dispatcher = state.dispatcher.clone();
    let req = PushRequest { completions: vec![item], checklist_updates: vec![] };
    let resp = with_conn(&state, move |conn| {
        Ok(push::apply_push(conn, &ctx, &req, dispatcher.as_ref()))
    })
    .await?;
    Ok(Json(resp).into_response())
}

/// GET /sync/status
async fn status_handler(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> Result<Response, ApiError> {
    let resp = with_conn(&state, move |conn| pull::sync_status(conn, &ctx)).await?;
    Ok(Json(resp).into_response())
}

/// Query string for the compliance report.
#[derive(Debug, Deserialize)]
struct ComplianceQuery {
    /// Inclusive start date (`%Y-%m-%d`).
    from: String,
    /// Inclusive end date (`%Y-%m-%d`).
    to: String,
}

/// GET /reports/compliance?from=…&to=…
async fn compliance_handler(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Query(range): Query<ComplianceQuery>,
) -> Result<Response, ApiError> {
    if !ctx.role.is_privileged() {
        return Err(EngineError::ScopeViolation("reports require a privileged role".into()).into());
    }
    let resp = with_conn(&state, move |conn| {
        compliance_by_area(conn, &ctx, &range.from, &range.to)
    })
    .await?;
    Ok(Json(resp).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
