//! API error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use gsa_common::blackboard::BlackboardError;
use gsa_common::broker::BrokerError;
use gsa_common::registry::RegistryError;

/// Result type alias for handler code
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced to API clients.
///
/// Messages are user-facing; backend detail is logged, never returned.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body fails schema checks
    #[error("{0}")]
    BadRequest(String),

    /// Unknown identifier or catalog entry
    #[error("{0}")]
    NotFound(String),

    /// Request is internally inconsistent, or the resource is not in a
    /// servable state
    #[error("{0}")]
    NotAcceptable(String),

    /// A downstream system is unavailable
    #[error("{0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<BlackboardError> for ApiError {
    fn from(err: BlackboardError) -> Self {
        tracing::error!("Blackboard error: {}", err);
        ApiError::Unavailable(
            "Failed to connect to storage system. Please try again in a few minutes.".to_string(),
        )
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        tracing::error!("Broker error: {}", err);
        ApiError::Unavailable(
            "The number of analysis requests is currently too high. Please try again in a few minutes."
                .to_string(),
        )
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Blackboard(inner) => inner.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::NotAcceptable("x".into()).status(),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            ApiError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
