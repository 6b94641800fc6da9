//! Submission gateway
//!
//! Sends a built [`JobSpec`] to the Kubernetes API and folds every outcome
//! into a [`SubmissionResult`]. The gateway holds no mutable state, so one
//! instance can be shared across concurrent requests behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use kube::api::{Api, PostParams};
use kube::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::error::{ConfigurationError, SubmissionError, SubmissionErrorKind};
use crate::spec::JobSpec;
use crate::wire;

/// Default bound on waiting for the API server's acknowledgment
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do about the fixed job name colliding with an existing job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConflictPolicy {
    /// Submit under the fixed name; a duplicate fails with `Conflict`
    #[default]
    Reject,
    /// Let the API server append a unique suffix to the name
    GenerateName,
}

/// Trait abstracting the "create namespaced Job" call
///
/// This allows mocking the Kubernetes client in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Create `job` in `namespace` and return the object the API server stored
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, kube::Error>;
}

/// [`JobApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeJobApi {
    client: Client,
}

impl KubeJobApi {
    /// Wrap an already-authenticated client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobApi for KubeJobApi {
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, kube::Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), job).await
    }
}

/// Gateway settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Bound on waiting for the API server's acknowledgment
    pub submit_timeout: Duration,
    /// Handling of name collisions
    pub conflict_policy: ConflictPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Check the settings before the service starts
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.submit_timeout.is_zero() {
            return Err(ConfigurationError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Terminal state of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionStatus {
    /// Accepted for scheduling (not finished)
    Submitted,
    /// Not accepted
    Failed(SubmissionErrorKind),
}

/// Outcome of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    job_name: String,
    status: SubmissionStatus,
    remote_message: String,
}

impl SubmissionResult {
    fn submitted(job_name: String, remote_message: String) -> Self {
        Self {
            job_name,
            status: SubmissionStatus::Submitted,
            remote_message,
        }
    }

    fn failed(job_name: String, err: &SubmissionError) -> Self {
        Self {
            job_name,
            status: SubmissionStatus::Failed(err.kind()),
            remote_message: err.to_string(),
        }
    }

    /// Name of the job this result belongs to. With
    /// [`ConflictPolicy::GenerateName`] this is the server-assigned name.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Terminal state
    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    /// Whether the job was accepted
    pub fn is_submitted(&self) -> bool {
        self.status == SubmissionStatus::Submitted
    }

    /// Failure classification, if the submission failed
    pub fn error_kind(&self) -> Option<SubmissionErrorKind> {
        match self.status {
            SubmissionStatus::Submitted => None,
            SubmissionStatus::Failed(kind) => Some(kind),
        }
    }

    /// Orchestrator-reported status or error detail
    pub fn remote_message(&self) -> &str {
        &self.remote_message
    }
}

/// Submits jobs through a [`JobApi`]
#[derive(Clone)]
pub struct SubmissionGateway {
    api: Arc<dyn JobApi>,
    config: GatewayConfig,
}

impl SubmissionGateway {
    /// Create a gateway over `api`
    pub fn new(api: Arc<dyn JobApi>, config: GatewayConfig) -> Self {
        Self { api, config }
    }

    /// Submit `spec` to `namespace` and wait for the initial acknowledgment.
    ///
    /// Never returns an error: failures are reported as
    /// [`SubmissionStatus::Failed`]. No retries are made here; retrying a
    /// failed pod is the job's `backoffLimit`.
    #[instrument(skip(self, spec), fields(job = %spec.name()))]
    pub async fn submit(&self, spec: &JobSpec, namespace: &str) -> SubmissionResult {
        let job = wire::to_job(spec, namespace, self.config.conflict_policy);

        match self.create(namespace, &job).await {
            Ok(created) => {
                let job_name = created
                    .metadata
                    .name
                    .unwrap_or_else(|| spec.name().to_string());
                let status = describe_status(created.status.as_ref());
                info!(job_name = %job_name, status = %status, "Job created");
                SubmissionResult::submitted(job_name, status)
            }
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "Job submission failed");
                SubmissionResult::failed(spec.name().to_string(), &err)
            }
        }
    }

    async fn create(&self, namespace: &str, job: &Job) -> Result<Job, SubmissionError> {
        let timeout = self.config.submit_timeout;
        match tokio::time::timeout(timeout, self.api.create_job(namespace, job)).await {
            Ok(result) => result.map_err(SubmissionError::from),
            Err(_) => Err(SubmissionError::TransportFailure(format!(
                "no acknowledgment from API server within {:?}",
                timeout
            ))),
        }
    }
}

/// Render the API server's initial job status. A freshly created Job
/// usually has an empty status, rendered as `{}`.
fn describe_status(status: Option<&JobStatus>) -> String {
    status
        .and_then(|s| serde_json::to_string(s).ok())
        .unwrap_or_else(|| "{}".to_string())
}
