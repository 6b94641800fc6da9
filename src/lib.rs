//! Mist - HTTP gateway that submits GPU batch jobs to Kubernetes
//!
//! Each `GET /job` builds a fresh job description from the injected
//! template and submits it once. Nothing is queued, retried or tracked: once
//! the API server accepts the Job its lifecycle belongs to Kubernetes.
//!
//! # Architecture
//!
//! ```text
//! GET /job ──► JobSpecBuilder ──► SubmissionGateway ──► K8s API Server
//!              (pure)              (create Job, classify errors)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Command line and environment configuration
//! - [`server`] - axum router and handlers
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Service errors and their HTTP mapping

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{router, serve, AppState};
