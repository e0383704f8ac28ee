//! Error taxonomy shared by all service roles.
//!
//! The distinction that matters operationally is deterministic vs.
//! infrastructure failures: a deterministic error (bad request data, a
//! failing kernel) marks the job as failed and acknowledges the message,
//! while an infrastructure error leaves the message unacknowledged so the
//! broker redelivers it.

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, GsaError>;

/// Main error type for the GSA orchestration services
#[derive(Error, Debug)]
pub enum GsaError {
    /// Request failed schema or cross-field checks; never enqueued
    #[error("Validation error: {0}")]
    Validation(String),

    /// Broker or blackboard unavailable during admission
    #[error("Admission error: {0}")]
    Admission(String),

    /// Deterministic failure inside a statistical kernel; not retried
    #[error("Analysis failed: {0}")]
    Kernel(String),

    /// Blackboard/broker failure during processing; message is redelivered
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// External fetch failed in the dataset loader
    #[error("Data source error: {0}")]
    DataSource(String),

    /// One or more report artifacts failed while others were produced
    #[error("Partial report failure: {0}")]
    PartialReport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GsaError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn admission(message: impl Into<String>) -> Self {
        Self::Admission(message.into())
    }

    pub fn kernel(message: impl Into<String>) -> Self {
        Self::Kernel(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    pub fn data_source(message: impl Into<String>) -> Self {
        Self::DataSource(message.into())
    }

    /// Whether retrying this error can never succeed.
    ///
    /// Deterministic errors transition the job to `failed` and acknowledge
    /// the message; everything else is left to broker redelivery.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            GsaError::Validation(_)
                | GsaError::Kernel(_)
                | GsaError::DataSource(_)
                | GsaError::PartialReport(_)
                | GsaError::Serialization(_)
        )
    }

    /// User-facing message stored in the status record's description.
    ///
    /// Infrastructure detail is kept out of client-visible text.
    pub fn user_message(&self) -> String {
        match self {
            GsaError::Infrastructure(_) | GsaError::Io(_) => {
                "An internal error occurred. Please retry the request later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<crate::blackboard::BlackboardError> for GsaError {
    fn from(err: crate::blackboard::BlackboardError) -> Self {
        GsaError::Infrastructure(err.to_string())
    }
}

impl From<crate::broker::BrokerError> for GsaError {
    fn from(err: crate::broker::BrokerError) -> Self {
        GsaError::Infrastructure(err.to_string())
    }
}

impl From<crate::registry::RegistryError> for GsaError {
    fn from(err: crate::registry::RegistryError) -> Self {
        GsaError::Infrastructure(err.to_string())
    }
}
