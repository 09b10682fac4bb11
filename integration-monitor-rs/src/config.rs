// integration-monitor-rs/src/config.rs
// Environment-driven monitor configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::MonitorError;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub check_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub integrations: Vec<String>,
    pub label_table_path: PathBuf,
    /// 0 disables periodic model reload.
    pub model_reload_secs: u64,
    pub diagnosis_log_path: PathBuf,
    pub run_once: bool,
    pub log_json: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: "https://api.example.com".to_string(),
            api_token: None,
            check_interval_secs: 60,
            request_timeout_secs: 10,
            integrations: Vec::new(),
            label_table_path: PathBuf::from("./models/labels.json"),
            model_reload_secs: 0,
            diagnosis_log_path: PathBuf::from("./data/diagnoses/diagnoses.ndjson"),
            run_once: false,
            log_json: false,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: config_rs::env_flag("AIRE_MONITOR_ENABLED", defaults.enabled),
            api_base_url: config_rs::env_string("AIRE_API_BASE_URL", &defaults.api_base_url),
            api_token: config_rs::env_optional("AIRE_API_TOKEN"),
            check_interval_secs: config_rs::env_parse(
                "AIRE_MONITOR_INTERVAL_SECS",
                defaults.check_interval_secs,
            ),
            request_timeout_secs: config_rs::env_parse(
                "AIRE_MONITOR_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            integrations: config_rs::env_list("AIRE_INTEGRATIONS"),
            label_table_path: config_rs::env_path(
                "AIRE_LABEL_TABLE_PATH",
                "./models/labels.json",
            ),
            model_reload_secs: config_rs::env_parse(
                "AIRE_MODEL_RELOAD_SECS",
                defaults.model_reload_secs,
            ),
            diagnosis_log_path: config_rs::env_path(
                "AIRE_DIAGNOSIS_LOG_PATH",
                "./data/diagnoses/diagnoses.ndjson",
            ),
            run_once: config_rs::env_flag("AIRE_MONITOR_RUN_ONCE", defaults.run_once),
            log_json: config_rs::env_flag("AIRE_LOG_JSON", defaults.log_json),
        }
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.check_interval_secs == 0 {
            return Err(MonitorError::Config(
                "AIRE_MONITOR_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(MonitorError::Config(
                "AIRE_MONITOR_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(MonitorError::Config("AIRE_API_BASE_URL is empty".to_string()));
        }
        for id in &self.integrations {
            integration_collector::validate_integration_id(id)
                .map_err(|e| MonitorError::Config(e.to_string()))?;
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn model_reload_interval(&self) -> Duration {
        Duration::from_secs(self.model_reload_secs)
    }
}
