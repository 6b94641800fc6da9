//! Job spec builder and submission gateway for Mist GPU workloads
//!
//! - [`spec`]: flat, immutable [`JobSpec`] built from an injected template
//! - [`wire`]: translation into a `batch/v1` Kubernetes Job
//! - [`gateway`]: one-shot submission with error classification
//! - [`error`]: configuration and submission errors

#![deny(missing_docs)]

pub mod error;
pub mod gateway;
pub mod spec;
pub mod wire;

pub use error::{ConfigurationError, SubmissionError, SubmissionErrorKind};
pub use gateway::{
    ConflictPolicy, GatewayConfig, JobApi, KubeJobApi, SubmissionGateway, SubmissionResult,
    SubmissionStatus,
};
pub use spec::{JobSpec, JobSpecBuilder, JobTemplateConfig, RestartPolicy};
