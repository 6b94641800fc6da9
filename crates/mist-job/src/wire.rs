//! Translation of a [`JobSpec`] into a `batch/v1` Kubernetes Job
//!
//! The Job:
//! - Runs a single container with the configured image
//! - Sets every resource request as both request and limit (extended
//!   resources such as GPUs are scheduled from limits)
//! - Labels the job and its pods `app=<name>`
//! - Adds a required pod anti-affinity term on that label per host

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec as K8sJobSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};

use crate::gateway::ConflictPolicy;
use crate::spec::{AntiAffinity, JobSpec};

/// Build the Job document for `spec` in `namespace`.
///
/// With [`ConflictPolicy::GenerateName`] the object carries `generateName`
/// instead of `name`, so the API server picks a unique suffix. Labels and
/// the anti-affinity selector always use the fixed name.
pub fn to_job(spec: &JobSpec, namespace: &str, policy: ConflictPolicy) -> Job {
    let labels = spec.labels();

    let (name, generate_name) = match policy {
        ConflictPolicy::Reject => (Some(spec.name().to_string()), None),
        ConflictPolicy::GenerateName => (None, Some(format!("{}-", spec.name()))),
    };

    let quantities: BTreeMap<String, Quantity> = spec
        .resource_requests()
        .iter()
        .map(|(k, v)| (k.clone(), Quantity(v.clone())))
        .collect();

    let container = Container {
        name: spec.container_name().to_string(),
        image: Some(spec.image().to_string()),
        resources: Some(ResourceRequirements {
            limits: Some(quantities.clone()),
            requests: Some(quantities),
            ..Default::default()
        }),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name,
            generate_name,
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(K8sJobSpec {
            parallelism: Some(to_i32(spec.parallelism().get())),
            backoff_limit: Some(to_i32(spec.backoff_limit())),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(spec.name().to_string()),
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: Some(anti_affinity(spec.anti_affinity())),
                    restart_policy: Some(spec.restart_policy().as_str().to_string()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn anti_affinity(rule: &AntiAffinity) -> Affinity {
    let term = PodAffinityTerm {
        label_selector: Some(LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: rule.label_key().to_string(),
                operator: "In".to_string(),
                values: Some(vec![rule.label_value().to_string()]),
            }]),
            ..Default::default()
        }),
        topology_key: rule.topology_key().to_string(),
        ..Default::default()
    };

    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![term]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
