use std::path::{Component, Path as FsPath, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, RawQuery, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{error, instrument};

use crate::bundle::BundleType;
use crate::bundle::artifact::{Artifact, LOCAL_DASHBOARDS};
use crate::bundle::converter;
use crate::bundle::orchestrator::{BundleOrchestrator, RequestOrigin};
use crate::config::DashbundleConfig;
use crate::errors::{BundleError, GatewayError};
use crate::gateway::{GatewayOutcome, GatewayRequest, SmartHttpGateway};
use crate::render::Renderer;

/// Well-known endpoint for Bluemix one-click deploys.
pub const BLUEMIX_DEPLOY: &str = "https://hub.jazz.net/deploy/index.html?repository=";

/// Largest git request body accepted by the gateway.
pub const GIT_BODY_LIMIT: usize = crate::gateway::MAX_BODY_BYTES;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub notebook_dir: PathBuf,
    pub base_url: String,
    /// Whether `X-Forwarded-*` headers decide the request origin.
    pub trust_forwarded_headers: bool,
    /// `host:port` used when a request carries no Host header.
    pub fallback_host: String,
    pub orchestrator: BundleOrchestrator,
    pub gateway: SmartHttpGateway,
}

impl AppState {
    pub fn new(config: &DashbundleConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            notebook_dir: config.notebook_dir.clone(),
            base_url: config.base_url.clone(),
            trust_forwarded_headers: config.trust_forwarded_headers,
            fallback_host: format!("{}:{}", config.host, config.port),
            orchestrator: BundleOrchestrator::new(
                config.tmp_dir.clone(),
                config.execution.clone(),
                renderer,
            ),
            gateway: SmartHttpGateway::new(config.tmp_dir.clone(), &config.git),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BundleQuery {
    pub notebook: Option<String>,
    #[serde(rename = "type")]
    pub bundle_type: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Status(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Status(status, msg) => (status, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<BundleError> for ApiError {
    fn from(err: BundleError) -> Self {
        if err.status() == StatusCode::BAD_REQUEST {
            return ApiError::BadRequest(err.to_string());
        }
        error!(error = %err, "bundle request failed");
        ApiError::Internal(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err.status() {
            s if s == StatusCode::BAD_REQUEST => ApiError::BadRequest(err.to_string()),
            s if s == StatusCode::NOT_FOUND => ApiError::NotFound(err.to_string()),
            s if s == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %err, "git gateway failed");
                ApiError::Internal(err.to_string())
            }
            status => ApiError::Status(status, err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/bundle", get(new_bundle))
        .route(
            "/bundle/{bundle_id}/{*path}",
            get(git_smart_http)
                .post(git_smart_http)
                .layer(DefaultBodyLimit::max(GIT_BODY_LIMIT)),
        )
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Resolve a notebook path relative to the notebook root.
///
/// Absolute paths and `..` segments are refused so requests cannot reach
/// outside the root.
pub fn resolve_notebook(root: &FsPath, notebook: &str) -> Result<PathBuf, BundleError> {
    let rel = FsPath::new(notebook);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if notebook.is_empty() || escapes {
        return Err(BundleError::InvalidNotebookPath(notebook.to_string()));
    }
    let abs = root.join(rel);
    if !abs.is_file() {
        return Err(BundleError::NotebookNotFound);
    }
    Ok(abs)
}

/// Scheme and host the client used. `X-Forwarded-*` only count when the
/// server is configured to sit behind a trusted proxy.
fn request_origin(state: &AppState, headers: &HeaderMap) -> RequestOrigin {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let forwarded = |name: &str| {
        if state.trust_forwarded_headers {
            header_str(name)
        } else {
            None
        }
    };
    RequestOrigin {
        scheme: forwarded("x-forwarded-proto").unwrap_or_else(|| "http".to_string()),
        host: forwarded("x-forwarded-host")
            .or_else(|| header_str(header::HOST.as_str()))
            .unwrap_or_else(|| state.fallback_host.clone()),
        base_url: state.base_url.clone(),
    }
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn zip_attachment(zip_path: PathBuf, name: &str) -> Result<Response, ApiError> {
    let bytes = tokio::fs::read(&zip_path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read {}: {}", zip_path.display(), e)))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}.zip", name),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

/// `GET /bundle?notebook=<path>&type=<bluemix|zip|dashboard|ipynb>`
#[instrument(skip(state, headers))]
async fn new_bundle(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<BundleQuery>,
) -> Result<Response, ApiError> {
    let notebook = query
        .notebook
        .ok_or_else(|| ApiError::BadRequest("missing notebook argument".into()))?;
    let bundle_type = query
        .bundle_type
        .ok_or_else(|| ApiError::BadRequest("missing type argument".into()))?;

    let abs_nb_path = resolve_notebook(&state.notebook_dir, &notebook)?;
    let bundle_type = BundleType::from_str(&bundle_type)?;
    let origin = request_origin(&state, &headers);

    let artifact = state
        .orchestrator
        .build_artifact(bundle_type, &abs_nb_path, &state.notebook_dir, &origin)
        .await?;

    match artifact {
        Artifact::Repository(md) => {
            // jupyter_server already ends with the base path.
            let repository = format!(
                "{}bundle/{}/{}.git",
                md.jupyter_server, md.bundle_id, md.notebook_basename
            );
            Ok(redirect(&format!(
                "{}{}",
                BLUEMIX_DEPLOY,
                urlencoding::encode(&repository)
            )))
        }
        Artifact::Archive { metadata, path } => {
            zip_attachment(path, &metadata.notebook_basename).await
        }
        Artifact::Dashboard(md) => Ok(redirect(&format!(
            "{}files/{}/{}/{}",
            state.base_url,
            LOCAL_DASHBOARDS,
            urlencoding::encode(&md.bundle_id),
            converter::INDEX_HTML
        ))),
    }
}

/// `GET|POST /bundle/{bundle_id}/{*path}`: git smart HTTP.
#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
async fn git_smart_http(
    State(state): State<SharedState>,
    Path((bundle_id, path)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<GatewayOutcome, ApiError> {
    let request = GatewayRequest {
        method,
        query,
        headers,
        body,
    };
    Ok(state.gateway.handle(&bundle_id, &path, request).await?)
}

// ── Tests ─────────────────────────────────────────────────────────────
