//! # Integration Monitor
//!
//! Polls the health endpoint of every configured integration, diagnoses the
//! unstable ones with the diagnosis engine, and records each non-healthy
//! outcome in an append-only diagnosis log.
//!
//! ## Components
//!
//! - **`HealthProbe`**: health check for a single integration
//! - **`IntegrationMonitor`**: per-cycle orchestration and the polling loop
//! - **`DiagnosisLog`**: NDJSON record of cycle outcomes
//! - **`spawn_model_reload`**: periodic model artifact reload

pub mod config;
pub mod diagnosis_log;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod reload;

pub use crate::config::MonitorConfig;
pub use crate::diagnosis_log::DiagnosisLog;
pub use crate::logging::init_logging;
pub use crate::monitor::{CycleEntry, CycleOutcome, IntegrationMonitor};
pub use crate::probe::{HealthProbe, HealthReport, HttpHealthProbe};
pub use crate::reload::{reload_model, spawn_model_reload};

use diagnostics_engine::DiagnosisError;
use integration_collector::CollectorError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid health response for {integration_id}: {reason}")]
    InvalidResponse {
        integration_id: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Model error: {0}")]
    Model(#[from] DiagnosisError),

    #[error("Configuration error: {0}")]
    Config(String),
}
