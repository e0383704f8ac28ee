//! External dataset routes: catalog, search, loading and summaries.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use gsa_common::blackboard::{keys, Blackboard};
use gsa_common::broker::{publish_with_retry, Queue};
use gsa_common::models::{DatasetJob, JobKind, Parameter};

use crate::error::{ApiError, ApiResult};

/// GET /data/sources
pub async fn list_sources(State(state): State<crate::ApiState>) -> Response {
    Json(state.catalog.sources.clone()).into_response()
}

/// GET /data/examples
pub async fn list_examples(State(state): State<crate::ApiState>) -> Response {
    Json(state.catalog.examples.clone()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    /// Restrict hits to one data source group
    pub group: Option<String>,
}

/// GET /data/search?query=melanoma
pub async fn search_datasets(
    State(state): State<crate::ApiState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let hits = state
        .search
        .search(&params.query, params.group.as_deref(), 100);
    Json(hits).into_response()
}

/// POST /data/load/:resource_id
///
/// Admits a dataset loading job and responds with the loading id as
/// plain text.
pub async fn load_dataset(
    State(state): State<crate::ApiState>,
    Path(resource_id): Path<String>,
    body: Option<Json<Vec<Parameter>>>,
) -> ApiResult<Response> {
    if !state.catalog.resource_known(&resource_id) {
        return Err(ApiError::NotFound(format!(
            "No data source can provide resource '{}'",
            resource_id
        )));
    }

    let loading_id = state.registry.allocate_id(JobKind::Dataset).await?;
    state
        .registry
        .seed(JobKind::Dataset, &loading_id, "Queued")
        .await?;

    let job = DatasetJob {
        loading_id: loading_id.clone(),
        resource_id: resource_id.clone(),
        parameters: body.map(|Json(parameters)| parameters).unwrap_or_default(),
    };
    let payload = serde_json::to_vec(&job)
        .map_err(|e| ApiError::Internal(format!("Failed to encode work item: {}", e)))?;

    let published = publish_with_retry(
        &*state.broker,
        Queue::Dataset,
        &payload,
        state.config.backend.max_message_tries,
    )
    .await;

    match published {
        Ok(()) => {
            tracing::info!(loading_id = %loading_id, resource_id = %resource_id, "Dataset load admitted");
            Ok((StatusCode::OK, loading_id).into_response())
        }
        Err(err) => {
            tracing::error!(loading_id = %loading_id, error = %err, "Failed to publish dataset message");
            let _ = state
                .registry
                .fail(
                    JobKind::Dataset,
                    &loading_id,
                    "Failed to connect to queuing system.",
                )
                .await;
            Err(err.into())
        }
    }
}

/// GET /data/status/:loading_id
pub async fn get_loading_status(
    State(state): State<crate::ApiState>,
    Path(loading_id): Path<String>,
) -> ApiResult<Response> {
    match state.board.get(&keys::status(&loading_id)).await? {
        Some(raw) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            raw,
        )
            .into_response()),
        None => Err(ApiError::NotFound("Unknown identifier".to_string())),
    }
}

/// GET /data/summary/:dataset_id
pub async fn get_summary(
    State(state): State<crate::ApiState>,
    Path(dataset_id): Path<String>,
) -> ApiResult<Response> {
    match state.board.get(&keys::dataset(&dataset_id)).await? {
        Some(raw) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            raw,
        )
            .into_response()),
        None => Err(ApiError::NotFound(format!(
            "Unknown dataset identifier '{}'",
            dataset_id
        ))),
    }
}
