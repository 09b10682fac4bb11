//! # Integration Collector - Raw Telemetry Collection
//!
//! Fetches raw telemetry for an integration from the data API, persists the
//! payload verbatim under the data directory, and hands it to the diagnosis
//! pipeline as a `FailureEvent`. Persisted payloads can be replayed later
//! through `ReplaySource`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use diagnostics_engine::{EventError, FailureEvent};
use serde_json::Value;
use tokio::fs;
use tracing::instrument;

/// Supplies failure-event records on demand, live or from persisted data.
#[async_trait]
pub trait TelemetrySource {
    async fn fetch_failure(&self, integration_id: &str) -> Result<FailureEvent, CollectorError>;
}

/// Configuration for the collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
}

impl CollectorConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: config_rs::env_flag("AIRE_COLLECTOR_ENABLED", true),
            api_base_url: config_rs::env_string("AIRE_API_BASE_URL", "https://api.example.com"),
            api_token: config_rs::env_optional("AIRE_API_TOKEN"),
            request_timeout_secs: config_rs::env_parse("AIRE_COLLECTOR_TIMEOUT_SECS", 15),
            data_dir: config_rs::env_path("AIRE_COLLECTOR_DATA_DIR", "./data/integrations"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Collector is disabled")]
    Disabled,

    #[error("Invalid integration id: {0:?}")]
    InvalidIntegrationId(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid telemetry for {integration_id}: {source}")]
    InvalidEvent {
        integration_id: String,
        #[source]
        source: EventError,
    },
}

/// Live collector backed by the integration data API.
pub struct HttpCollector {
    config: CollectorConfig,
    http_client: reqwest::Client,
}

impl HttpCollector {
    pub fn new(config: CollectorConfig) -> Result<Self, CollectorError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            CollectorError::Io(format!(
                "Failed to create data directory {}: {}",
                config.data_dir.display(),
                e
            ))
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CollectorError::Http(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn new_default() -> Result<Self, CollectorError> {
        Self::new(CollectorConfig::from_env())
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Fetch the raw payload for an integration and persist it as
    /// `{data_dir}/{integration_id}_data.json`.
    #[instrument(skip(self))]
    pub async fn collect_data(&self, integration_id: &str) -> Result<Value, CollectorError> {
        if !self.config.enabled {
            return Err(CollectorError::Disabled);
        }
        validate_integration_id(integration_id)?;

        let payload = self.fetch_from_api(integration_id).await.map_err(|e| {
            tracing::error!(error = %e, "data collection failed");
            e
        })?;
        let path = store_raw_data(&self.config.data_dir, integration_id, &payload).await?;

        tracing::info!(path = %path.display(), "collected data");
        Ok(payload)
    }

    async fn fetch_from_api(&self, integration_id: &str) -> Result<Value, CollectorError> {
        let url = format!(
            "{}/data/{}",
            self.config.api_base_url.trim_end_matches('/'),
            integration_id
        );

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectorError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollectorError::Http(format!(
                "Data endpoint returned status: {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CollectorError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl TelemetrySource for HttpCollector {
    async fn fetch_failure(&self, integration_id: &str) -> Result<FailureEvent, CollectorError> {
        let payload = self.collect_data(integration_id).await?;
        to_event(integration_id, payload)
    }
}

impl fmt::Display for HttpCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IntegrationCollector (Data stored at: {})",
            self.config.data_dir.display()
        )
    }
}

/// Replays payloads previously persisted by `HttpCollector`.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    data_dir: PathBuf,
}

impl ReplaySource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn fetch_failure(&self, integration_id: &str) -> Result<FailureEvent, CollectorError> {
        let payload = load_raw_data(&self.data_dir, integration_id).await?;
        to_event(integration_id, payload)
    }
}

fn to_event(integration_id: &str, payload: Value) -> Result<FailureEvent, CollectorError> {
    FailureEvent::from_payload(integration_id, payload).map_err(|source| {
        CollectorError::InvalidEvent {
            integration_id: integration_id.to_string(),
            source,
        }
    })
}

/// Integration ids end up in file names, so only `[A-Za-z0-9._-]` is allowed.
pub fn validate_integration_id(integration_id: &str) -> Result<(), CollectorError> {
    let valid = !integration_id.is_empty()
        && integration_id != "."
        && integration_id != ".."
        && integration_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(CollectorError::InvalidIntegrationId(integration_id.to_string()))
    }
}

pub fn raw_data_path(data_dir: &Path, integration_id: &str) -> Result<PathBuf, CollectorError> {
    validate_integration_id(integration_id)?;
    Ok(data_dir.join(format!("{}_data.json", integration_id)))
}

/// Persist a raw payload, replacing any previous one for the integration.
/// Written to a temp file first so readers never see a partial payload.
pub async fn store_raw_data(
    data_dir: &Path,
    integration_id: &str,
    payload: &Value,
) -> Result<PathBuf, CollectorError> {
    let path = raw_data_path(data_dir, integration_id)?;
    let tmp_path = path.with_extension("json.tmp");

    let bytes =
        serde_json::to_vec(payload).map_err(|e| CollectorError::Serialization(e.to_string()))?;

    fs::create_dir_all(data_dir)
        .await
        .map_err(|e| CollectorError::Io(format!("Failed to create data directory: {}", e)))?;
    fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| CollectorError::Io(format!("Failed to write raw data: {}", e)))?;
    fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| CollectorError::Io(format!("Failed to move raw data into place: {}", e)))?;

    Ok(path)
}

pub async fn load_raw_data(data_dir: &Path, integration_id: &str) -> Result<Value, CollectorError> {
    let path = raw_data_path(data_dir, integration_id)?;
    let bytes = fs::read(&path).await.map_err(|e| {
        CollectorError::Io(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| CollectorError::Serialization(e.to_string()))
}
