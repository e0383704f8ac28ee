//! Status and result retrieval routes.
//!
//! Plain blackboard reads: status records are streamed back verbatim, the
//! result blob is only served once the job is `complete` (406 while it is
//! running or failed, 404 when the identifier is unknown). Extension
//! suffixes stream the corresponding report artifact instead.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use gsa_common::blackboard::{keys, Blackboard};

use crate::error::{ApiError, ApiResult};

fn json_response(raw: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        raw,
    )
        .into_response()
}

/// GET /status/:id
pub async fn get_status(
    State(state): State<crate::ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    match state.board.get(&keys::status(&id)).await? {
        Some(raw) => Ok(json_response(raw)),
        None => {
            tracing::debug!(id = %id, "Unknown identifier passed to status query");
            Err(ApiError::NotFound("Unknown identifier".to_string()))
        }
    }
}

/// GET /report_status/:id
pub async fn get_report_status(
    State(state): State<crate::ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    match state.board.get(&keys::report_status(&id)).await? {
        Some(raw) => Ok(json_response(raw)),
        None => Err(ApiError::NotFound("Unknown identifier".to_string())),
    }
}

/// GET /result/:id
///
/// `/result/{id}` serves the JSON result blob; `/result/{id}.xlsx` and
/// `/result/{id}.pdf` stream the report artifacts.
pub async fn get_result(
    State(state): State<crate::ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let (job_id, extension) = match id.split_once('.') {
        Some((job_id, extension)) => (job_id.to_string(), Some(extension.to_string())),
        None => (id, None),
    };

    let found = match extension.as_deref() {
        None => state
            .board
            .get(&keys::result(&job_id))
            .await?
            .map(|raw| (raw, "application/json")),
        Some("xlsx") => state
            .board
            .get(&keys::report_artifact(&job_id, "XLSX"))
            .await?
            .map(|raw| (raw, "application/vnd.ms-excel")),
        Some("pdf") => state
            .board
            .get(&keys::report_artifact(&job_id, "PDF"))
            .await?
            .map(|raw| (raw, "application/pdf")),
        Some(other) => {
            tracing::debug!(extension = other, "Unknown result extension requested");
            None
        }
    };

    if let Some((raw, content_type)) = found {
        return Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], raw).into_response());
    }

    // Work out why the result is missing
    if state.board.exists(&keys::status(&job_id)).await? {
        Err(ApiError::NotAcceptable("Analysis is not complete.".to_string()))
    } else {
        tracing::debug!(id = %job_id, "Unknown identifier passed to result query");
        Err(ApiError::NotFound(
            "Unknown analysis identifier passed.".to_string(),
        ))
    }
}
