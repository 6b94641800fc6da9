//! Mist - submits GPU batch jobs to Kubernetes on request

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::Client;

use mist::server::{self, AppState};
use mist::telemetry::init_tracing;
use mist::Config;
use mist_job::{JobSpecBuilder, KubeJobApi, SubmissionGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_tracing(config.log_json)?;

    config.validate().context("invalid configuration")?;

    // In-cluster service account, falling back to the local kubeconfig
    let client = Client::try_default()
        .await
        .context("failed to load Kubernetes credentials")?;

    let builder = JobSpecBuilder::new(config.job_template());
    let gateway = SubmissionGateway::new(
        Arc::new(KubeJobApi::new(client)),
        config.gateway_config(),
    );

    tracing::info!(
        namespace = %config.namespace,
        image = %config.image,
        job = %config.job_name,
        "Submitting jobs on GET /job"
    );

    let state = AppState::new(builder, gateway, config.namespace.clone());
    server::serve(config.listen_addr(), state).await?;
    Ok(())
}
