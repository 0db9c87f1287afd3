//! Axum web server for painel.
//!
//! Routes:
//!
//! - `GET /health`
//! - `GET /dashboards/{id}/data/`
//! - `GET /dashboard-blocks/{id}/data/`
//! - `GET /datasources/{id}/metadata/`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::dashboard::{DashboardResponse, Engine, EngineError, ErrorBody};
use crate::model::ColumnMetadata;
use crate::normalize::ChartPayload;

/// Header carrying the caller's principal.
pub const PRINCIPAL_HEADER: &str = "x-painel-user";

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Engine,
}

/// Build the axum router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/dashboards/{id}/data/", get(dashboard_data))
        .route("/dashboards/{id}/data", get(dashboard_data))
        .route("/dashboard-blocks/{id}/data/", get(block_data))
        .route("/dashboard-blocks/{id}/data", get(block_data))
        .route("/datasources/{id}/metadata/", get(dataset_metadata))
        .route("/datasources/{id}/metadata", get(dataset_metadata))
        .layer(cors)
        .with_state(state)
}

/// Start the web server.
pub async fn serve(engine: Engine, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(AppState { engine }));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "painel listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

/// An engine error rendered as `{success: false, error: {kind, message}}`.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            success: false,
            error: ErrorBody::from(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

fn principal(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /dashboards/{id}/data/ - Render every block of an instance
async fn dashboard_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let response = state
        .engine
        .render_dashboard(&id, principal(&headers), &params)
        .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct BlockQuery {
    instance: Option<String>,
}

#[derive(Serialize)]
struct BlockResponse {
    success: bool,
    data: ChartPayload,
}

/// GET /dashboard-blocks/{id}/data/ - Render one block
async fn block_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<BlockQuery>,
) -> Result<Json<BlockResponse>, ApiError> {
    let data = state
        .engine
        .render_block(&id, query.instance.as_deref(), principal(&headers))
        .await?;
    Ok(Json(BlockResponse {
        success: true,
        data,
    }))
}

#[derive(Deserialize)]
struct MetadataQuery {
    #[serde(default)]
    refresh: bool,
}

#[derive(Serialize)]
struct MetadataResponse {
    columns: Vec<ColumnMetadata>,
}

/// GET /datasources/{id}/metadata/ - Column metadata for field pickers
async fn dataset_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<MetadataQuery>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let metadata = state.engine.dataset_metadata(&id, query.refresh).await?;
    Ok(Json(MetadataResponse {
        columns: metadata.sorted(),
    }))
}
