//! Thin HTTP layer over the fragment engine.
//!
//! JSON endpoints wrapping the four core call shapes: ingest, browse,
//! interactive similarity, and export. The engine itself does no network
//! I/O; this module is marshalling glue plus a logging/timing middleware
//! that tags every request with a correlation id.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ingest` | Ingest base64-encoded files |
//! | `GET`  | `/fragments` | Browse or substring-search fragments |
//! | `GET`  | `/similar` | Interactive similarity over a browse page |
//! | `POST` | `/export` | Assemble an export bundle from selected ids |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "no fragments selected" } }
//! ```

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::export::{self, ExportError, ExportFormat};
use crate::ingest;
use crate::models::Fragment;
use crate::similarity;
use crate::store::FragmentStore;

const DEFAULT_PAGE_SIZE: i64 = 25;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: FragmentStore,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        store: FragmentStore::new(pool),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/fragments", get(handle_browse))
        .route("/similar", get(handle_similar))
        .route("/export", post(handle_export))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    tracing::info!(bind = %bind_addr, "fragment server listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Per-request logging/timing collaborator: correlation id, method, path,
/// status, elapsed milliseconds.
async fn log_requests(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    files: Vec<UploadFile>,
}

#[derive(Deserialize)]
struct UploadFile {
    name: String,
    /// Base64-encoded file bytes.
    data: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<ingest::IngestReport>, AppError> {
    if request.files.is_empty() {
        return Err(bad_request("files must not be empty"));
    }

    let mut files = Vec::with_capacity(request.files.len());
    for upload in &request.files {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&upload.data)
            .map_err(|e| bad_request(format!("invalid base64 in {}: {}", upload.name, e)))?;
        files.push((upload.name.clone(), bytes));
    }

    let report = ingest::ingest_files(&state.store, &state.config, &files)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(report))
}

// ============ GET /fragments ============

#[derive(Deserialize)]
struct BrowseParams {
    q: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
}

/// Resolve pagination, returning `(limit, offset)` for a 1-based page.
/// The multiplication is checked: an absurd page number is a bad request,
/// not a wrapped-negative OFFSET.
fn page_window(page: Option<i64>, page_size: Option<i64>) -> Result<(i64, i64), AppError> {
    let page = page.unwrap_or(1);
    if page < 1 {
        return Err(bad_request("page must be >= 1"));
    }
    let limit = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| bad_request("page is out of range"))?;
    Ok((limit, offset))
}

async fn browse_page(
    store: &FragmentStore,
    params: &BrowseParams,
) -> Result<Vec<Fragment>, AppError> {
    let (limit, offset) = page_window(params.page, params.page_size)?;
    let result = match params.q.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => store.search(query, limit, offset).await,
        _ => store.list(limit, offset).await,
    };
    result.map_err(|e| internal(e.to_string()))
}

async fn handle_browse(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<Vec<Fragment>>, AppError> {
    let fragments = browse_page(&state.store, &params).await?;
    Ok(Json(fragments))
}

// ============ GET /similar ============

#[derive(Deserialize)]
struct SimilarParams {
    q: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
    threshold: Option<f64>,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SimilarResponse {
    fragments: Vec<Fragment>,
    related: std::collections::BTreeMap<i64, Vec<similarity::Related>>,
}

/// Similarity is local to the current view: the engine sees exactly the
/// browse page's fragments, nothing more.
async fn handle_similar(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<SimilarResponse>, AppError> {
    let threshold = params.threshold.unwrap_or(state.config.similarity.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(bad_request("threshold must be in [0.0, 1.0]"));
    }
    let top_k = params.top_k.unwrap_or(state.config.similarity.top_k);

    let browse = BrowseParams {
        q: params.q,
        page: params.page,
        page_size: params.page_size,
    };
    let fragments = browse_page(&state.store, &browse).await?;

    let inputs: Vec<(i64, String)> = fragments
        .iter()
        .map(|f| (f.id, f.content.clone()))
        .collect();
    let related = similarity::related(&inputs, threshold, top_k);

    Ok(Json(SimilarResponse { fragments, related }))
}

// ============ POST /export ============

#[derive(Deserialize)]
struct ExportRequest {
    ids: Vec<i64>,
    format: String,
}

async fn handle_export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, AppError> {
    let format = ExportFormat::parse(&request.format)
        .ok_or_else(|| bad_request(format!("unknown export format: {}", request.format)))?;

    let ids = export::dedupe_ids(&request.ids);
    let fragments = state
        .store
        .get_by_ids(&ids)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let bytes = export::assemble(&fragments, format).map_err(|e| match e {
        ExportError::EmptySelection => bad_request(e.to_string()),
        ExportError::Archive(_) => internal(e.to_string()),
    })?;

    let disposition = format!("attachment; filename=\"{}\"", format.file_name());
    let mut response = bytes.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(format.mime()),
    );
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        header::HeaderValue::from_str(&disposition).map_err(|e| internal(e.to_string()))?,
    );
    Ok(response)
}
