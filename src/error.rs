//! Error types for the Mist service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use mist_job::{ConfigurationError, SubmissionErrorKind, SubmissionResult};

/// Result type for Mist service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Mist service operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Startup configuration is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigurationError),

    /// The orchestrator did not accept the job
    #[error("job submission failed ({kind}): {message}")]
    Submission {
        /// Failure classification
        kind: SubmissionErrorKind,
        /// Orchestrator-reported detail
        message: String,
    },

    /// Listener could not be bound or the server stopped unexpectedly
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Logging could not be initialized
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl Error {
    /// Convert a failed submission into an error. Returns `None` for a
    /// successful one.
    pub fn from_failed(result: &SubmissionResult) -> Option<Self> {
        result.error_kind().map(|kind| Error::Submission {
            kind,
            message: result.remote_message().to_string(),
        })
    }

    /// HTTP status reported to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Submission { kind, .. } => match kind {
                SubmissionErrorKind::Conflict => StatusCode::CONFLICT,
                SubmissionErrorKind::RemoteRejection => StatusCode::UNPROCESSABLE_ENTITY,
                SubmissionErrorKind::AuthenticationFailure => StatusCode::BAD_GATEWAY,
                SubmissionErrorKind::TransportFailure => StatusCode::SERVICE_UNAVAILABLE,
            },
            Error::Config(_) | Error::Server(_) | Error::Telemetry(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // K8s-style Status body, same shape the API server returns
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": self.to_string(),
            "code": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(kind: SubmissionErrorKind) -> Error {
        Error::Submission {
            kind,
            message: "detail".to_string(),
        }
    }

    #[test]
    fn submission_kinds_map_to_distinct_statuses() {
        assert_eq!(
            submission(SubmissionErrorKind::Conflict).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            submission(SubmissionErrorKind::RemoteRejection).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            submission(SubmissionErrorKind::AuthenticationFailure).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            submission(SubmissionErrorKind::TransportFailure).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn response_body_is_status_document() {
        let response = submission(SubmissionErrorKind::Conflict).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "Status");
        assert_eq!(json["code"], 409);
        assert_eq!(json["message"], "job submission failed (conflict): detail");
    }

    #[test]
    fn config_error_is_internal() {
        let err = Error::from(ConfigurationError::MissingGpuRequest);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
