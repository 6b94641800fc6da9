//! Job description and its builder
//!
//! [`JobSpec`] is a flat, orchestrator-independent description of the GPU
//! workload. It is built from a [`JobTemplateConfig`] by [`JobSpecBuilder`]
//! and only turned into Kubernetes objects by [`crate::wire`].

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde::Serialize;

use crate::error::ConfigurationError;

/// Default job name; also the value of the `app` label shared by its pods
pub const DEFAULT_JOB_NAME: &str = "mist-reserved";

/// Default name of the runtime container inside the job's pod
pub const DEFAULT_CONTAINER_NAME: &str = "mist-runtime";

/// Default GPU extended resource key
pub const DEFAULT_GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Label key used to group the job's pods for anti-affinity
pub const APP_LABEL: &str = "app";

/// Topology key that makes anti-affinity per node
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Longest accepted job name. `generateName` appends a dash and five
/// characters, and the result must still fit a 63 character label value.
pub const MAX_JOB_NAME_LEN: usize = 57;

const DEFAULT_PARALLELISM: NonZeroU32 = NonZeroU32::MIN;
const DEFAULT_BACKOFF_LIMIT: u32 = 4;

/// Pod restart policy for the job's pods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RestartPolicy {
    /// Restart the container in place when it fails
    OnFailure,
    /// Never restart; failures create replacement pods up to the backoff limit
    Never,
}

impl RestartPolicy {
    /// Kubernetes spelling of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnFailure => "OnFailure",
            Self::Never => "Never",
        }
    }
}

/// Hard anti-affinity rule: no two pods carrying `label_key=label_value`
/// may share a `topology_key` domain. Only checked at scheduling time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiAffinity {
    label_key: String,
    label_value: String,
    topology_key: String,
}

impl AntiAffinity {
    /// One pod of the named workload per host
    pub fn one_per_host(workload: &str) -> Self {
        Self {
            label_key: APP_LABEL.to_string(),
            label_value: workload.to_string(),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
        }
    }

    /// Label key matched by the selector
    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    /// Label value matched by the selector
    pub fn label_value(&self) -> &str {
        &self.label_value
    }

    /// Node label that defines the co-location domain
    pub fn topology_key(&self) -> &str {
        &self.topology_key
    }
}

/// Immutable description of the batch workload to submit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    name: String,
    container_name: String,
    image: String,
    resource_requests: BTreeMap<String, String>,
    parallelism: NonZeroU32,
    backoff_limit: u32,
    restart_policy: RestartPolicy,
    anti_affinity: AntiAffinity,
}

impl JobSpec {
    /// Job name, fixed per deployment
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the single container in the pod
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Container image reference
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Resource name to quantity, e.g. `nvidia.com/gpu -> "1"`
    pub fn resource_requests(&self) -> &BTreeMap<String, String> {
        &self.resource_requests
    }

    /// Number of pods run in parallel
    pub fn parallelism(&self) -> NonZeroU32 {
        self.parallelism
    }

    /// Retries the orchestrator makes before marking the job failed
    pub fn backoff_limit(&self) -> u32 {
        self.backoff_limit
    }

    /// Pod restart policy
    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    /// Scheduling anti-affinity rule
    pub fn anti_affinity(&self) -> &AntiAffinity {
        &self.anti_affinity
    }

    /// Labels shared by the job and its pods
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(APP_LABEL.to_string(), self.name.clone())])
    }
}

/// Injected overrides for the job template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplateConfig {
    /// Job name
    pub name: String,
    /// Runtime container name
    pub container_name: String,
    /// Container image reference
    pub image: String,
    /// Resource requests, at least one GPU-class entry
    pub resource_requests: BTreeMap<String, String>,
}

impl JobTemplateConfig {
    /// Template with default name, container name and a single GPU request
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_JOB_NAME.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            image: image.into(),
            resource_requests: BTreeMap::from([(
                DEFAULT_GPU_RESOURCE.to_string(),
                "1".to_string(),
            )]),
        }
    }

    /// Override the job name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the container name
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    /// Replace all resource requests
    pub fn with_resource_requests(mut self, requests: BTreeMap<String, String>) -> Self {
        self.resource_requests = requests;
        self
    }

    /// Check the template before the service starts accepting requests
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.image.is_empty() || self.image.chars().any(char::is_whitespace) {
            return Err(ConfigurationError::InvalidImage(self.image.clone()));
        }
        validate_dns_label("job name", &self.name, MAX_JOB_NAME_LEN)?;
        validate_dns_label("container name", &self.container_name, 63)?;

        if !self.resource_requests.keys().any(|k| is_gpu_resource(k)) {
            return Err(ConfigurationError::MissingGpuRequest);
        }
        for (resource, quantity) in &self.resource_requests {
            let valid = if is_gpu_resource(resource) {
                is_positive_count(quantity)
            } else {
                is_valid_quantity(quantity)
            };
            if !valid {
                return Err(ConfigurationError::InvalidQuantity {
                    resource: resource.clone(),
                    quantity: quantity.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Builds [`JobSpec`] values from a fixed template
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    template: JobTemplateConfig,
}

impl JobSpecBuilder {
    /// Create a builder for the given template
    pub fn new(template: JobTemplateConfig) -> Self {
        Self { template }
    }

    /// Build a fresh job description. Pure and infallible.
    pub fn build(&self) -> JobSpec {
        JobSpec {
            name: self.template.name.clone(),
            container_name: self.template.container_name.clone(),
            image: self.template.image.clone(),
            resource_requests: self.template.resource_requests.clone(),
            parallelism: DEFAULT_PARALLELISM,
            backoff_limit: DEFAULT_BACKOFF_LIMIT,
            restart_policy: RestartPolicy::OnFailure,
            anti_affinity: AntiAffinity::one_per_host(&self.template.name),
        }
    }
}

/// Validate an RFC 1123 label: lowercase alphanumerics and '-', starting and
/// ending with an alphanumeric.
pub fn validate_dns_label(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidName {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > max_len {
        return Err(invalid(&format!("must be at most {} characters", max_len)));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "must contain only lowercase alphanumerics and '-'",
        ));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(invalid("must start and end with an alphanumeric"));
    }
    Ok(())
}

fn is_gpu_resource(resource: &str) -> bool {
    resource == "gpu" || resource.ends_with("/gpu")
}

/// Extended resources such as GPUs are whole devices: a plain decimal integer
/// of at least one.
fn is_positive_count(quantity: &str) -> bool {
    !quantity.is_empty()
        && quantity.chars().all(|c| c.is_ascii_digit())
        && !quantity.trim_start_matches('0').is_empty()
}

/// Kubernetes quantity grammar: `<number><suffix>` where the suffix is a
/// binary SI unit (`Ki`..`Ei`), a decimal SI unit (`n`, `u`, `m`, `k`, `M`,
/// `G`, `T`, `P`, `E`) or a decimal exponent (`e3`, `E-2`).
pub fn is_valid_quantity(quantity: &str) -> bool {
    let unsigned = quantity
        .strip_prefix(['+', '-'])
        .unwrap_or(quantity);

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    if number.is_empty() || number == "." || number.matches('.').count() > 1 {
        return false;
    }

    match suffix {
        "" | "n" | "u" | "m" | "k" | "M" | "G" | "T" | "P" | "E" => true,
        "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => true,
        exp => {
            let Some(digits) = exp.strip_prefix(['e', 'E']) else {
                return false;
            };
            let digits = digits.strip_prefix(['+', '-']).unwrap_or(digits);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> JobTemplateConfig {
        JobTemplateConfig::new("registry.example.com/mist/runtime:v1")
    }

    #[test]
    fn build_is_deterministic() {
        let builder = JobSpecBuilder::new(template());
        assert_eq!(builder.build(), builder.build());

        let other = JobSpecBuilder::new(template());
        assert_eq!(builder.build(), other.build());
    }

    #[test]
    fn build_uses_fixed_defaults() {
        let spec = JobSpecBuilder::new(template()).build();
        assert_eq!(spec.name(), "mist-reserved");
        assert_eq!(spec.container_name(), "mist-runtime");
        assert_eq!(spec.image(), "registry.example.com/mist/runtime:v1");
        assert_eq!(spec.parallelism().get(), 1);
        assert_eq!(spec.backoff_limit(), 4);
        assert_eq!(spec.restart_policy(), RestartPolicy::OnFailure);
        assert_eq!(
            spec.resource_requests().get("nvidia.com/gpu"),
            Some(&"1".to_string())
        );
    }

    #[test]
    fn anti_affinity_targets_own_label_per_host() {
        let spec = JobSpecBuilder::new(template().with_name("trainer")).build();
        let rule = spec.anti_affinity();
        assert_eq!(rule.label_key(), "app");
        assert_eq!(rule.label_value(), "trainer");
        assert_eq!(rule.topology_key(), "kubernetes.io/hostname");
        assert_eq!(spec.labels().get("app"), Some(&"trainer".to_string()));
    }

    #[test]
    fn overrides_flow_into_spec() {
        let requests = BTreeMap::from([
            ("amd.com/gpu".to_string(), "2".to_string()),
            ("memory".to_string(), "16Gi".to_string()),
        ]);
        let spec = JobSpecBuilder::new(
            template()
                .with_name("custom")
                .with_container_name("worker")
                .with_resource_requests(requests.clone()),
        )
        .build();
        assert_eq!(spec.name(), "custom");
        assert_eq!(spec.container_name(), "worker");
        assert_eq!(spec.resource_requests(), &requests);
    }

    #[test]
    fn default_template_is_valid() {
        assert_eq!(template().validate(), Ok(()));
    }

    #[test]
    fn empty_or_spaced_image_is_rejected() {
        for image in ["", "bad image"] {
            let err = JobTemplateConfig::new(image).validate().unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidImage(_)));
        }
    }

    #[test]
    fn job_name_must_be_dns_label() {
        for name in ["", "Upper", "-lead", "trail-", "under_score"] {
            let err = template().with_name(name).validate().unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidName { field: "job name", .. }),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn job_name_leaves_room_for_generated_suffix() {
        let ok = "a".repeat(MAX_JOB_NAME_LEN);
        assert!(template().with_name(ok).validate().is_ok());

        let too_long = "a".repeat(MAX_JOB_NAME_LEN + 1);
        assert!(template().with_name(too_long).validate().is_err());
    }

    #[test]
    fn template_without_gpu_is_rejected() {
        let requests = BTreeMap::from([("cpu".to_string(), "1".to_string())]);
        let err = template()
            .with_resource_requests(requests)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingGpuRequest);
    }

    #[test]
    fn malformed_quantity_is_rejected() {
        let requests = BTreeMap::from([("nvidia.com/gpu".to_string(), "one".to_string())]);
        let err = template()
            .with_resource_requests(requests)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidQuantity { .. }));
    }

    #[test]
    fn gpu_count_must_be_positive_whole_number() {
        for count in ["0", "00", "-1", "0.5", "500m", "1k", ""] {
            let requests = BTreeMap::from([("nvidia.com/gpu".to_string(), count.to_string())]);
            let err = template()
                .with_resource_requests(requests)
                .validate()
                .unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidQuantity { .. }),
                "{count} should be rejected"
            );
        }
        for count in ["1", "2", "8", "010"] {
            let requests = BTreeMap::from([("nvidia.com/gpu".to_string(), count.to_string())]);
            assert_eq!(template().with_resource_requests(requests).validate(), Ok(()));
        }
    }

    #[test]
    fn non_gpu_resources_keep_quantity_grammar() {
        let requests = BTreeMap::from([
            ("nvidia.com/gpu".to_string(), "1".to_string()),
            ("cpu".to_string(), "500m".to_string()),
        ]);
        assert_eq!(template().with_resource_requests(requests).validate(), Ok(()));
    }

    #[test]
    fn quantity_grammar() {
        for ok in ["1", "0.5", ".5", "500m", "16Gi", "1k", "1e3", "2E-2", "+1", "1."] {
            assert!(is_valid_quantity(ok), "{ok} should be valid");
        }
        for bad in ["", "one", "1Gb", "1.2.3", ".", "1e", "Gi", "1 Gi"] {
            assert!(!is_valid_quantity(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn restart_policy_spelling() {
        assert_eq!(RestartPolicy::OnFailure.as_str(), "OnFailure");
        assert_eq!(RestartPolicy::Never.as_str(), "Never");
    }
}
