//! Service configuration
//!
//! Every setting comes from a command line flag with an environment variable
//! fallback. Nothing is read from process-wide state after startup: the
//! parsed [`Config`] is turned into the job template, gateway settings and
//! listen address, validated once, and passed into their constructors.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Parser, ValueEnum};

use mist_job::spec::{
    validate_dns_label, DEFAULT_CONTAINER_NAME, DEFAULT_GPU_RESOURCE, DEFAULT_JOB_NAME,
};
use mist_job::{ConfigurationError, ConflictPolicy, GatewayConfig, JobTemplateConfig};

/// Default port for the HTTP endpoint
pub const DEFAULT_PORT: u16 = 5000;

/// Default namespace jobs are submitted to
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default runtime image
pub const DEFAULT_IMAGE: &str = "mist-runtime:latest";

/// Mist - submits GPU batch jobs to Kubernetes on request
#[derive(Parser, Debug, Clone)]
#[command(name = "mist", version, about, long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "MIST_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "MIST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Namespace jobs are created in
    #[arg(long, env = "MIST_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Container image of the runtime
    #[arg(long, env = "MIST_RUNTIME_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Job name, also used as the `app` label for anti-affinity
    #[arg(long, env = "MIST_JOB_NAME", default_value = DEFAULT_JOB_NAME)]
    pub job_name: String,

    /// Name of the runtime container
    #[arg(long, env = "MIST_CONTAINER_NAME", default_value = DEFAULT_CONTAINER_NAME)]
    pub container_name: String,

    /// Extended resource key of the GPU
    #[arg(long, env = "MIST_GPU_RESOURCE", default_value = DEFAULT_GPU_RESOURCE)]
    pub gpu_resource: String,

    /// Number of GPUs requested
    #[arg(long, env = "MIST_GPU_COUNT", default_value = "1")]
    pub gpu_count: String,

    /// Seconds to wait for the API server to acknowledge a job
    #[arg(long, env = "MIST_SUBMIT_TIMEOUT_SECS", default_value_t = 30)]
    pub submit_timeout_secs: u64,

    /// What to do when the job name is already taken
    #[arg(
        long,
        env = "MIST_CONFLICT_POLICY",
        value_enum,
        default_value_t = ConflictPolicyArg::Reject
    )]
    pub conflict_policy: ConflictPolicyArg,

    /// Emit logs as JSON
    #[arg(long, env = "MIST_LOG_JSON")]
    pub log_json: bool,
}

/// Command line spelling of [`ConflictPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictPolicyArg {
    /// Fail with a conflict when the name is taken
    Reject,
    /// Let the API server suffix the name
    GenerateName,
}

impl From<ConflictPolicyArg> for ConflictPolicy {
    fn from(arg: ConflictPolicyArg) -> Self {
        match arg {
            ConflictPolicyArg::Reject => ConflictPolicy::Reject,
            ConflictPolicyArg::GenerateName => ConflictPolicy::GenerateName,
        }
    }
}

impl Config {
    /// Job template built from the injected settings
    pub fn job_template(&self) -> JobTemplateConfig {
        JobTemplateConfig::new(self.image.clone())
            .with_name(self.job_name.clone())
            .with_container_name(self.container_name.clone())
            .with_resource_requests(BTreeMap::from([(
                self.gpu_resource.clone(),
                self.gpu_count.clone(),
            )]))
    }

    /// Gateway settings built from the injected settings
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            conflict_policy: self.conflict_policy.into(),
        }
    }

    /// Address the HTTP server binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Validate everything before the server starts listening
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_dns_label("namespace", &self.namespace, 63)?;
        self.job_template().validate()?;
        self.gateway_config().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["mist"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let config = parse(&[
            "--port",
            "8080",
            "--namespace",
            "gpu-jobs",
            "--image",
            "registry.example.com/mist/runtime:v2",
            "--gpu-count",
            "2",
            "--conflict-policy",
            "generate-name",
            "--submit-timeout-secs",
            "5",
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.namespace, "gpu-jobs");
        assert_eq!(config.conflict_policy, ConflictPolicyArg::GenerateName);

        let gateway = config.gateway_config();
        assert_eq!(gateway.submit_timeout, Duration::from_secs(5));
        assert_eq!(gateway.conflict_policy, ConflictPolicy::GenerateName);

        let template = config.job_template();
        assert_eq!(template.image, "registry.example.com/mist/runtime:v2");
        assert_eq!(
            template.resource_requests.get("nvidia.com/gpu"),
            Some(&"2".to_string())
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn listen_addr_combines_host_and_port() {
        let config = parse(&["--host", "127.0.0.1", "--port", "9000"]);
        assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn invalid_namespace_is_rejected() {
        let config = parse(&["--namespace", "Not_Valid"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidName {
                field: "namespace",
                ..
            })
        ));
    }

    #[test]
    fn malformed_gpu_count_is_rejected() {
        let config = parse(&["--gpu-count", "lots"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn non_positive_or_fractional_gpu_count_is_rejected() {
        for count in ["0", "-1", "0.5", "500m"] {
            let flag = format!("--gpu-count={count}");
            let config = parse(&[flag.as_str()]);
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigurationError::InvalidQuantity { .. })
                ),
                "{count} should be rejected"
            );
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = parse(&["--submit-timeout-secs", "0"]);
        assert_eq!(config.validate(), Err(ConfigurationError::InvalidTimeout));
    }

    #[test]
    fn unknown_conflict_policy_fails_to_parse() {
        let result = Config::try_parse_from(["mist", "--conflict-policy", "replace"]);
        assert!(result.is_err());
    }
}
