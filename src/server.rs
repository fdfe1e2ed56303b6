//! HTTP front end
//!
//! - `GET /{resourceId}.png?d={variant}` returns the PNG thumbnail
//! - `GET /healthz` returns the JSON health report
//! - `GET /metrics` returns the Prometheus exposition
//!
//! Failures are JSON bodies of the form `{"error": <kind>, "message": <text>}`.

use crate::{HealthChecker, HealthLevel, KeyError, ThumbnailCache, ThumbnailError, ThumbnailKey};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const PNG_SUFFIX: &str = ".png";

#[derive(Clone)]
pub struct AppState {
    pub cache: ThumbnailCache,
    pub health: Arc<HealthChecker>,
    pub prometheus: Option<PrometheusHandle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThumbnailQuery {
    #[serde(default)]
    pub d: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    InvalidKey(KeyError),
    Thumbnail(ThumbnailError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            ApiError::Thumbnail(e) if e.is_timeout() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Thumbnail(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidKey(_) => "invalid_key",
            ApiError::Thumbnail(e) => e.kind(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(path) => write!(f, "no such resource: {path}"),
            ApiError::InvalidKey(e) => write!(f, "{e}"),
            ApiError::Thumbnail(e) => write!(f, "{e}"),
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        ApiError::InvalidKey(err)
    }
}

impl From<ThumbnailError> for ApiError {
    fn from(err: ThumbnailError) -> Self {
        ApiError::Thumbnail(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/:file", get(get_thumbnail))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}

pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<ThumbnailQuery>,
) -> Result<Response, ApiError> {
    let resource_id = file
        .strip_suffix(PNG_SUFFIX)
        .ok_or_else(|| ApiError::NotFound(file.clone()))?;
    let key = ThumbnailKey::new(resource_id, query.d.as_deref().unwrap_or_default())?;

    let span = info_span!("request", id = %Uuid::new_v4(), key = %key);
    async move {
        match state.cache.get(key.as_str()).await {
            Ok(artifact) => {
                debug!("Serving {} bytes", artifact.len());
                Ok(([(header::CONTENT_TYPE, "image/png")], artifact).into_response())
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("No thumbnail produced: {}", e);
                } else {
                    error!("Thumbnail request failed: {}", e);
                }
                Err(ApiError::from(e))
            }
        }
    }
    .instrument(span)
    .await
}

pub async fn get_health(State(state): State<AppState>) -> Response {
    let report = state.health.check();
    let status = match report.status {
        HealthLevel::Critical => StatusCode::SERVICE_UNAVAILABLE,
        HealthLevel::Healthy | HealthLevel::Warning => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => ApiError::NotFound("/metrics".to_string()).into_response(),
    }
}
