// ============================================================================
// HTTP SURFACE
// ============================================================================
// Routes:
//   POST /analyze      {key, code}  -> {analysis}
//   POST /concurrency  {limit}      -> {limit}   (effective, after clamping)
//   GET  /stats                     -> MetricsSnapshot
//   GET  /, /admin                  -> index.html, admin.html
//   GET  /static/*                  -> files under the static directory
//
// Error bodies are {"detail": "..."}. Engine diagnostics never reach them.
// ============================================================================

use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::activity::{ActivityTracker, CallerId};
use crate::config::HostConfig;
use crate::error::{AnalysisError, HostResult};
use crate::gate::AdmissionGate;
use crate::inference::build_engine;
use crate::keys::{KeyStore, StaticKeyStore};
use crate::metrics::{MetricsReporter, MetricsSnapshot};
use crate::service::AnalysisService;
use crate::{HOST_FULL_NAME, HOST_VERSION, SHUTDOWN_GRACE_PERIOD_SECS};

// ----------------------------------------------------------------------------
// Wire Types
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub key: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyRequest {
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyResponse {
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.to_string(),
        }),
    )
        .into_response()
}

/// Extractor failures keep the `detail` shape; serde diagnostics go to logs.
fn rejected(rejection: JsonRejection) -> Response {
    debug!(
        target: "aaw::http",
        status = rejection.status().as_u16(),
        error = %rejection.body_text(),
        "Request body rejected"
    );
    error_response(rejection.status(), "Invalid request body")
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = match self {
            AnalysisError::Unauthorized => StatusCode::UNAUTHORIZED,
            AnalysisError::InferenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalysisError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        error_response(status, self.public_message())
    }
}

// ----------------------------------------------------------------------------
// Application State
// ----------------------------------------------------------------------------

/// Everything the handlers share. Built once per process (or per test).
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<AnalysisService>,
    reporter: Arc<MetricsReporter>,
    static_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(service: Arc<AnalysisService>, static_dir: impl Into<PathBuf>) -> Self {
        let reporter = MetricsReporter::new(service.gate().clone(), service.tracker().clone());
        Self {
            service,
            reporter: Arc::new(reporter),
            static_dir: Arc::new(static_dir.into()),
        }
    }

    /// Compose the process-wide state from configuration.
    pub fn from_config(config: &HostConfig) -> HostResult<Self> {
        let keys = StaticKeyStore::new(&config.allowed_keys);
        let key_count = keys.len();
        let engine = build_engine(&config.inference)?;
        let gate = AdmissionGate::new(config.initial_capacity());

        info!(
            target: "aaw::http",
            keys = key_count,
            capacity = gate.capacity(),
            timeout_secs = ?config.inference.timeout_secs,
            "Application state ready"
        );

        let service = AnalysisService::new(
            Arc::new(keys),
            Arc::new(ActivityTracker::new()),
            gate,
            engine,
        )
        .with_timeout(config.inference.timeout_secs.map(Duration::from_secs));

        Ok(Self::new(Arc::new(service), config.static_dir.clone()))
    }

    pub fn service(&self) -> &Arc<AnalysisService> {
        &self.service
    }

    pub fn gate(&self) -> &AdmissionGate {
        self.service.gate()
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, Response> {
    let Json(request) = body.map_err(rejected)?;
    let caller = CallerId::new(&request.key);
    let analysis = state
        .service
        .analyze(&caller, &request.code)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(AnalyzeResponse { analysis }))
}

async fn set_concurrency(
    State(state): State<AppState>,
    body: Result<Json<ConcurrencyRequest>, JsonRejection>,
) -> Result<Json<ConcurrencyResponse>, Response> {
    let Json(request) = body.map_err(rejected)?;
    let limit = state.gate().resize(request.limit);
    info!(
        target: "aaw::http",
        requested = request.limit,
        effective = limit,
        "Concurrency limit updated"
    );
    Ok(Json(ConcurrencyResponse { limit }))
}

async fn stats(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.reporter.snapshot())
}

async fn index_page(State(state): State<AppState>) -> Response {
    page(&state, "index.html").await
}

async fn admin_page(State(state): State<AppState>) -> Response {
    page(&state, "admin.html").await
}

async fn page(state: &AppState, name: &str) -> Response {
    let path = state.static_dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(target: "aaw::http", path = %path.display(), error = %e, "Page unavailable");
            error_response(StatusCode::NOT_FOUND, "Not found")
        }
    }
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    let assets = ServeDir::new(state.static_dir.as_path());

    Router::new()
        .route("/", get(index_page))
        .route("/admin", get(admin_page))
        .route("/analyze", post(analyze))
        .route("/concurrency", post(set_concurrency))
        .route("/stats", get(stats))
        .nest_service("/static", assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// Serve until SIGINT/SIGTERM, then drain.
///
/// On shutdown the gate is closed, so queued analyses get 503 while running
/// ones finish. Draining is cut off after the grace period.
pub async fn serve(config: &HostConfig) -> HostResult<()> {
    let state = AppState::from_config(config)?;
    let gate = state.gate().clone();
    let app = router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr.as_str()).await?;

    info!(
        target: "aaw::http",
        addr = %addr,
        version = HOST_VERSION,
        "{} listening",
        HOST_FULL_NAME
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        gate.close();
        let _ = shutdown_tx.send(true);
    });

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()))
        .into_future();

    let grace_elapsed = async move {
        shutdown_requested(shutdown_rx).await;
        tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
    };

    tokio::select! {
        result = server => result?,
        _ = grace_elapsed => {
            warn!(
                target: "aaw::http",
                grace_secs = SHUTDOWN_GRACE_PERIOD_SECS,
                "Grace period elapsed with requests still in flight"
            );
        }
    }

    info!(target: "aaw::http", "Server stopped");
    Ok(())
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "aaw::http", error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(target: "aaw::http", error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "aaw::http", "Received SIGINT"),
        _ = terminate => info!(target: "aaw::http", "Received SIGTERM"),
    }
}
