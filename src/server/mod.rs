use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::errors::GenError;
use crate::ingest;
use crate::orchestrator::Generator;
use crate::wire::{GenerationRequest, RawGenerationRequest};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Error body returned by every route: `{"code": ..., "message": ...}`.
pub struct ApiError(GenError);

impl From<GenError> for ApiError {
    fn from(e: GenError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GenError::UnsupportedProvider(_)
            | GenError::UnsupportedFramework(_)
            | GenError::InvalidRequest(_)
            | GenError::InvalidCsv(_) => StatusCode::BAD_REQUEST,
            GenError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GenError::Provider { .. } | GenError::MalformedResponse { .. } | GenError::InvalidPath { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GenError::Archive(_) | GenError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(json!({ "code": self.0.code(), "message": self.0.to_string() }))).into_response()
    }
}

pub fn router(generator: Generator) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/parse-csv", post(parse_csv_handler))
        .route("/api/generate", post(generate_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(generator)
}

pub async fn serve(addr: SocketAddr, generator: Generator) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("test generator listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(generator))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn parse_csv_handler(mut multipart: Multipart) -> Result<Response, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GenError::InvalidRequest(format!("bad multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        if !name.to_ascii_lowercase().ends_with(".csv") {
            return Err(GenError::InvalidCsv("Only CSV files are allowed".into()).into());
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| GenError::InvalidRequest(format!("could not read upload: {e}")))?;
        let test_cases = ingest::parse_test_plan(&bytes)?;
        info!(file = %name, rows = test_cases.len(), "parsed test plan");
        return Ok(Json(json!({ "test_cases": test_cases })).into_response());
    }
    Err(GenError::InvalidRequest("multipart field \"file\" is required".into()).into())
}

async fn generate_handler(
    State(generator): State<Generator>,
    payload: Result<Json<RawGenerationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(raw) = payload.map_err(|e| GenError::InvalidRequest(e.body_text()))?;
    let req = GenerationRequest::try_from(raw)?;
    let out = generator.generate(req).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={}", out.filename)),
            (header::HeaderName::from_static("x-request-id"), out.request_id.to_string()),
        ],
        out.archive,
    )
        .into_response())
}
