//! Analysis admission and catalog routes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use gsa_common::broker::{publish_with_retry, Queue};
use gsa_common::models::{AnalysisJob, JobKind};

use crate::admission;
use crate::error::{ApiError, ApiResult};

/// GET /methods
pub async fn list_methods(State(state): State<crate::ApiState>) -> Response {
    Json(state.catalog.methods.clone()).into_response()
}

/// GET /types
pub async fn list_types(State(state): State<crate::ApiState>) -> Response {
    Json(state.catalog.data_types.clone()).into_response()
}

/// POST /analysis
///
/// Validates the request, seeds the status record and publishes the work
/// item. Responds with the allocated job id as plain text.
pub async fn start_analysis(
    State(state): State<crate::ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let mut input = admission::decode_body(&headers, &body)?;

    admission::normalize_parameters(&mut input, &state.catalog)?;
    admission::resolve_data_tokens(&state.board, &mut input).await?;
    admission::validate_datasets(&input)?;

    let job_id = state.registry.allocate_id(JobKind::Analysis).await?;
    input.analysis_id = Some(job_id.clone());

    state
        .registry
        .seed(JobKind::Analysis, &job_id, "Queued")
        .await?;

    let job = AnalysisJob {
        job_id: job_id.clone(),
        input,
        max_attempts: state.config.backend.broker.max_delivery_count,
    };
    let payload = serde_json::to_vec(&job)
        .map_err(|e| ApiError::Internal(format!("Failed to encode work item: {}", e)))?;

    let published = publish_with_retry(
        &*state.broker,
        Queue::Analysis,
        &payload,
        state.config.backend.max_message_tries,
    )
    .await;

    match published {
        Ok(()) => {
            tracing::info!(job_id = %job_id, method = %job.input.method_name, "Analysis admitted");
            Ok((StatusCode::OK, job_id).into_response())
        }
        Err(err) => {
            tracing::error!(job_id = %job_id, error = %err, "Failed to publish analysis message");
            let _ = state
                .registry
                .fail(
                    JobKind::Analysis,
                    &job_id,
                    "Failed to connect to queuing system.",
                )
                .await;
            Err(err.into())
        }
    }
}
