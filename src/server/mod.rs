//! HTTP surface.
//!
//! `GET|POST /convert_and_upload` runs the caption pipeline for one video and
//! `GET /healthz` reports liveness. Handlers only translate between HTTP and
//! [`CaptionPipeline`]; all collaborators are injected through [`AppState`].

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::pipeline::{CaptionPipeline, UploadOutcome};
use crate::{Result, ServiceError};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";
pub const NO_CAPTIONS_MESSAGE: &str = "No captions found";

/// Shared, read-only state handed to every handler
pub struct AppState {
    pub pipeline: CaptionPipeline,
}

/// Request parameters, from the query string or a JSON body
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConvertParams {
    pub url: Option<String>,
    #[serde(alias = "bucket")]
    pub gs_bucket_name: Option<String>,
}

impl ConvertParams {
    /// Fill fields missing here from `other`
    fn or(self, other: ConvertParams) -> Self {
        Self {
            url: self.url.or(other.url),
            gs_bucket_name: self.gs_bucket_name.or(other.gs_bucket_name),
        }
    }

    fn require(self) -> std::result::Result<(String, String), ServiceError> {
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidRequest("missing parameter: url".to_string()))?;
        let bucket = self
            .gs_bucket_name
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidRequest("missing parameter: gs_bucket_name".to_string()))?;

        Ok((url, bucket))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConvertResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub source: String,
}

/// HTTP rendering of a [`ServiceError`]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::SourceUnavailable(_) | ServiceError::SinkWriteFailure(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Spool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.0.to_string();

        if status.is_server_error() {
            error!("Request failed: {}", detail);
        } else {
            warn!("Rejected request: {}", detail);
        }

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/convert_and_upload",
            get(convert_and_upload_get).post(convert_and_upload_post),
        )
        .route(
            "/convert_and_upload/",
            get(convert_and_upload_get).post(convert_and_upload_post),
        )
        .route("/healthz", get(health))
        .with_state(state)
}

/// Malformed query strings are reported like any other bad input
fn query_params(
    query: std::result::Result<Query<ConvertParams>, QueryRejection>,
) -> std::result::Result<ConvertParams, ServiceError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ServiceError::InvalidRequest(rejection.body_text()))
}

async fn convert_and_upload_get(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<ConvertParams>, QueryRejection>,
) -> std::result::Result<Json<ConvertResponse>, ApiError> {
    convert_and_upload(&state, query_params(query)?).await
}

async fn convert_and_upload_post(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<ConvertParams>, QueryRejection>,
    body: Bytes,
) -> std::result::Result<Json<ConvertResponse>, ApiError> {
    let params = query_params(query)?;
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        params
    } else {
        let from_body: ConvertParams = serde_json::from_slice(&body)
            .map_err(|e| ServiceError::InvalidRequest(format!("invalid JSON body: {}", e)))?;
        params.or(from_body)
    };

    convert_and_upload(&state, params).await
}

async fn convert_and_upload(
    state: &AppState,
    params: ConvertParams,
) -> std::result::Result<Json<ConvertResponse>, ApiError> {
    let (url, bucket) = params.require()?;
    info!("convert_and_upload url={} bucket={}", url, bucket);

    let response = match state.pipeline.convert_and_upload(&url, &bucket).await? {
        UploadOutcome::Uploaded { storage_path, .. } => ConvertResponse {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            gcs_url: Some(storage_path),
        },
        UploadOutcome::NoCaptions => ConvertResponse {
            message: NO_CAPTIONS_MESSAGE.to_string(),
            gcs_url: None,
        },
    };

    Ok(Json(response))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        source: state.pipeline.source_name().to_string(),
    })
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
