//! HTTP server
//!
//! - `GET /` - fixed greeting
//! - `GET /healthz` - liveness probe
//! - `GET /job` - build the job and submit it; 200 on acceptance, the
//!   failure's status code and a Status document otherwise
//!
//! Every response carries permissive CORS headers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mist_job::{JobSpecBuilder, SubmissionGateway};

use crate::error::{Error, Result};

/// Body returned by `GET /`
pub const GREETING: &str = "Hello World!";

/// Body returned by `GET /job` when the job was accepted
pub const JOB_CREATED: &str = "Job created!";

const CORS_ALLOW_METHODS: &str = "PUT, GET, POST, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str =
    "Origin, Accept, Content-Type, X-Requested-With, X-CSRF-Token";

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Builds a fresh job description per request
    pub builder: Arc<JobSpecBuilder>,
    /// Submits job descriptions to the API server
    pub gateway: Arc<SubmissionGateway>,
    /// Namespace jobs are created in
    pub namespace: String,
}

impl AppState {
    /// Create handler state
    pub fn new(
        builder: JobSpecBuilder,
        gateway: SubmissionGateway,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            builder: Arc::new(builder),
            gateway: Arc::new(gateway),
            namespace: namespace.into(),
        }
    }
}

/// Build the router with all routes and layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { GREETING }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/job", get(create_job_handler))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        ))
        .with_state(state)
}

async fn create_job_handler(State(state): State<AppState>) -> Result<&'static str> {
    let spec = state.builder.build();
    let result = state.gateway.submit(&spec, &state.namespace).await;

    match Error::from_failed(&result) {
        None => {
            info!(
                job = %result.job_name(),
                "Job created. status=\"{}\"",
                result.remote_message()
            );
            Ok(JOB_CREATED)
        }
        Some(err) => {
            warn!(job = %result.job_name(), error = %err, "Job not created");
            Err(err)
        }
    }
}

/// Serve until Ctrl-C or SIGTERM
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Start serving");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
