//! Job-specific error types
//!
//! Configuration errors are raised once, at startup, when the injected job
//! template or gateway settings are validated. Submission errors never leave
//! the gateway: they are folded into a failed [`SubmissionResult`].
//!
//! [`SubmissionResult`]: crate::gateway::SubmissionResult

use std::fmt;

use serde::Serialize;

/// Invalid job template or gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The container image reference is empty or contains whitespace
    #[error("invalid image reference '{0}'")]
    InvalidImage(String),

    /// A name that must be an RFC 1123 DNS label is not one
    #[error("invalid {field} '{value}': {reason}")]
    InvalidName {
        /// Which setting carried the name (e.g. "job name", "namespace")
        field: &'static str,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A resource request is not a valid Kubernetes quantity
    #[error("invalid quantity '{quantity}' for resource '{resource}'")]
    InvalidQuantity {
        /// Resource name, e.g. `nvidia.com/gpu`
        resource: String,
        /// The rejected quantity string
        quantity: String,
    },

    /// No GPU-class resource is requested
    #[error("job must request at least one GPU resource")]
    MissingGpuRequest,

    /// The submission timeout is zero
    #[error("submission timeout must be greater than zero")]
    InvalidTimeout,
}

/// Classification of a failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubmissionErrorKind {
    /// Missing, invalid or insufficient credentials
    AuthenticationFailure,
    /// A job with the same name already exists in the namespace
    Conflict,
    /// Network failure or no acknowledgment within the timeout
    TransportFailure,
    /// The orchestrator refused the job document
    RemoteRejection,
}

impl fmt::Display for SubmissionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthenticationFailure => "authentication failure",
            Self::Conflict => "conflict",
            Self::TransportFailure => "transport failure",
            Self::RemoteRejection => "remote rejection",
        };
        f.write_str(s)
    }
}

/// Error raised while talking to the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// Credentials were rejected or could not be loaded
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The job name is already taken in the target namespace
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request never got an answer
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The orchestrator answered with a non-success status
    #[error("rejected by orchestrator: {0}")]
    RemoteRejection(String),
}

impl SubmissionError {
    /// Classification of this error
    pub fn kind(&self) -> SubmissionErrorKind {
        match self {
            Self::AuthenticationFailure(_) => SubmissionErrorKind::AuthenticationFailure,
            Self::Conflict(_) => SubmissionErrorKind::Conflict,
            Self::TransportFailure(_) => SubmissionErrorKind::TransportFailure,
            Self::RemoteRejection(_) => SubmissionErrorKind::RemoteRejection,
        }
    }
}

impl From<kube::Error> for SubmissionError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                401 | 403 => {
                    Self::AuthenticationFailure(format!("{} ({})", ae.message, ae.reason))
                }
                409 => Self::Conflict(format!("{} ({})", ae.message, ae.reason)),
                // throttled or unavailable, the job document was never judged
                429 | 500..=599 => Self::TransportFailure(format!(
                    "{} ({}, HTTP {})",
                    ae.message, ae.reason, ae.code
                )),
                _ => Self::RemoteRejection(format!(
                    "{} ({}, HTTP {})",
                    ae.message, ae.reason, ae.code
                )),
            },
            kube::Error::Auth(e) => Self::AuthenticationFailure(e.to_string()),
            kube::Error::InferConfig(e) => Self::AuthenticationFailure(e.to_string()),
            other => Self::TransportFailure(other.to_string()),
        }
    }
}
