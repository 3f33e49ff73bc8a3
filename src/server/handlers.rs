//! Request handlers for the control surface

use crate::manager::{JobKind, ScrapeManager};
use crate::HarvestError;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

/// Body of `POST /start` and `POST /stop`
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub start: u64,

    #[serde(default)]
    pub end: u64,

    #[serde(default)]
    pub overwrite: bool,
}

/// Parses the body and job type, or produces the 400 response
fn parse_request(body: &[u8]) -> Result<(JobKind, JobRequest), Response> {
    let request: JobRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid request body").into_response()
    })?;

    let kind = request
        .kind
        .parse::<JobKind>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid type").into_response())?;

    Ok((kind, request))
}

/// GET /stats
pub async fn stats_handler(State(manager): State<Arc<ScrapeManager>>) -> Response {
    let stats = manager.get_stats();

    match serde_json::to_vec(&stats) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode stats: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// POST /start
pub async fn start_handler(State(manager): State<Arc<ScrapeManager>>, body: Bytes) -> Response {
    let (kind, request) = match parse_request(&body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match manager.start(kind, request.start, request.end, request.overwrite) {
        Ok(()) => (StatusCode::OK, "Process started successfully").into_response(),
        Err(e @ HarvestError::AlreadyRunning { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to start {} job: {}", kind, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// POST /stop
pub async fn stop_handler(State(manager): State<Arc<ScrapeManager>>, body: Bytes) -> Response {
    let (kind, _) = match parse_request(&body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    manager.stop(kind);
    (StatusCode::OK, "Process stopped successfully").into_response()
}
