// integration-monitor-rs/src/probe.rs
// Health checks against the integration monitoring endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::config::MonitorConfig;
use crate::MonitorError;

/// Health of one integration at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub integration_id: String,
    pub status: bool,
    /// Everything the endpoint returned besides `status`.
    pub metrics: Map<String, Value>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Parse a `{"status": bool, ...metrics}` body.
    pub fn from_body(integration_id: &str, body: Value) -> Result<Self, MonitorError> {
        let invalid = |reason: &str| MonitorError::InvalidResponse {
            integration_id: integration_id.to_string(),
            reason: reason.to_string(),
        };

        let Value::Object(mut metrics) = body else {
            return Err(invalid("body is not a JSON object"));
        };
        let status = match metrics.remove("status") {
            Some(Value::Bool(status)) => status,
            Some(_) => return Err(invalid("'status' is not a boolean")),
            None => return Err(invalid("missing 'status'")),
        };

        Ok(Self {
            integration_id: integration_id.to_string(),
            status,
            metrics,
            checked_at: Utc::now(),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.status
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, integration_id: &str) -> Result<HealthReport, MonitorError>;
}

/// Probe backed by `GET {api_base_url}/monitor/{integration_id}`.
pub struct HttpHealthProbe {
    api_base_url: String,
    api_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MonitorError::Http(e.to_string()))?;

        Ok(Self {
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    #[instrument(skip(self))]
    async fn check(&self, integration_id: &str) -> Result<HealthReport, MonitorError> {
        let url = format!("{}/monitor/{}", self.api_base_url, integration_id);

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MonitorError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MonitorError::Http(format!(
                "Monitor endpoint returned status: {}",
                response.status()
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| MonitorError::InvalidResponse {
                integration_id: integration_id.to_string(),
                reason: e.to_string(),
            })?;

        HealthReport::from_body(integration_id, body)
    }
}
