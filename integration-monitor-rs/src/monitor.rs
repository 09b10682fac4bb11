// integration-monitor-rs/src/monitor.rs
// Per-cycle orchestration: probe, fetch telemetry, diagnose, record.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use diagnostics_engine::{Diagnosis, DiagnosisEngine, DiagnosisErrorKind};
use futures::future::join_all;
use integration_collector::TelemetrySource;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use crate::config::MonitorConfig;
use crate::diagnosis_log::DiagnosisLog;
use crate::probe::{HealthProbe, HealthReport};
use crate::MonitorError;

/// What happened to one integration during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    Healthy,
    Diagnosed(Diagnosis),
    DiagnosisFailed {
        kind: DiagnosisErrorKind,
        message: String,
    },
    TelemetryUnavailable(String),
    ProbeFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEntry {
    pub integration_id: String,
    pub checked_at: DateTime<Utc>,
    pub healthy: bool,
    pub outcome: CycleOutcome,
}

impl CycleEntry {
    fn new(integration_id: &str, healthy: bool, outcome: CycleOutcome) -> Self {
        Self {
            integration_id: integration_id.to_string(),
            checked_at: Utc::now(),
            healthy,
            outcome,
        }
    }
}

pub struct IntegrationMonitor {
    monitor_id: String,
    active: AtomicBool,
    config: MonitorConfig,
    probe: Arc<dyn HealthProbe>,
    source: Arc<dyn TelemetrySource + Send + Sync>,
    engine: Arc<DiagnosisEngine>,
    log: Option<DiagnosisLog>,
}

impl IntegrationMonitor {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        source: Arc<dyn TelemetrySource + Send + Sync>,
        engine: Arc<DiagnosisEngine>,
    ) -> Self {
        Self {
            monitor_id: format!("AireMonitor-{}", Utc::now().to_rfc3339()),
            active: AtomicBool::new(config.enabled),
            config,
            probe,
            source,
            engine,
            log: None,
        }
    }

    pub fn with_log(mut self, log: DiagnosisLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop the polling loop after the cycle in progress.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Probe one integration and warn when it reports itself unstable.
    #[instrument(skip(self))]
    pub async fn monitor_integration(&self, integration_id: &str) -> Result<HealthReport, MonitorError> {
        match self.probe.check(integration_id).await {
            Ok(report) => {
                if report.is_healthy() {
                    tracing::debug!("integration is healthy");
                } else {
                    tracing::warn!(metrics = %serde_json::Value::Object(report.metrics.clone()), "integration is unstable");
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "health check failed");
                Err(e)
            }
        }
    }

    /// Check every configured integration concurrently. One entry per
    /// integration, in configuration order; non-healthy entries are appended
    /// to the diagnosis log.
    #[instrument(skip(self), fields(monitor_id = %self.monitor_id))]
    pub async fn run_cycle(&self) -> Vec<CycleEntry> {
        let entries = join_all(
            self.config
                .integrations
                .iter()
                .map(|id| self.check_integration(id)),
        )
        .await;

        if let Some(log) = &self.log {
            for entry in entries.iter().filter(|e| e.outcome != CycleOutcome::Healthy) {
                if let Err(e) = log.append(entry).await {
                    tracing::error!(
                        integration_id = %entry.integration_id,
                        error = %e,
                        "failed to append to diagnosis log"
                    );
                }
            }
        }

        let unhealthy = entries.iter().filter(|e| !e.healthy).count();
        tracing::info!(
            checked = entries.len(),
            unhealthy,
            "monitor cycle complete"
        );

        entries
    }

    async fn check_integration(&self, integration_id: &str) -> CycleEntry {
        let report = match self.monitor_integration(integration_id).await {
            Ok(report) => report,
            Err(e) => {
                return CycleEntry::new(integration_id, false, CycleOutcome::ProbeFailed(e.to_string()))
            }
        };

        if report.is_healthy() {
            return CycleEntry::new(integration_id, true, CycleOutcome::Healthy);
        }

        let event = match self.source.fetch_failure(integration_id).await {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(integration_id, error = %e, "failure telemetry unavailable");
                return CycleEntry::new(
                    integration_id,
                    false,
                    CycleOutcome::TelemetryUnavailable(e.to_string()),
                );
            }
        };

        let outcome = match self.engine.diagnose(&event) {
            Ok(diagnosis) => CycleOutcome::Diagnosed(diagnosis),
            Err(e) => CycleOutcome::DiagnosisFailed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        CycleEntry::new(integration_id, false, outcome)
    }

    /// Run cycles on the configured interval until `shutdown` resolves or the
    /// monitor is deactivated.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if !self.is_active() {
            tracing::info!(monitor_id = %self.monitor_id, "monitor disabled; not starting");
            return;
        }

        tracing::info!(
            monitor_id = %self.monitor_id,
            integrations = self.config.integrations.len(),
            interval_secs = self.config.check_interval().as_secs(),
            "monitor started"
        );

        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.config.check_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    if !self.is_active() {
                        break;
                    }
                    self.run_cycle().await;
                }
            }
        }

        self.deactivate();
        tracing::info!(monitor_id = %self.monitor_id, "monitor stopped");
    }
}

impl fmt::Display for IntegrationMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AireMonitor (ID: {}, Active: {})",
            self.monitor_id,
            self.is_active()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use diagnostics_engine::{ArtifactLocator, FailureEvent, LabelTable, ModelStore};
    use integration_collector::CollectorError;
    use mockall::mock;
    use serde_json::json;
    use std::time::Duration;

    mock! {
        pub Probe {}

        #[async_trait]
        impl HealthProbe for Probe {
            async fn check(&self, integration_id: &str) -> Result<HealthReport, MonitorError>;
        }
    }

    mock! {
        pub Source {}

        #[async_trait]
        impl TelemetrySource for Source {
            async fn fetch_failure(&self, integration_id: &str) -> Result<FailureEvent, CollectorError>;
        }
    }

    fn report(id: &str, status: bool) -> HealthReport {
        HealthReport::from_body(id, json!({"status": status, "error_rate": 0.3})).unwrap()
    }

    fn failure(id: &str) -> FailureEvent {
        FailureEvent::from_payload(id, json!({"error_code": 401})).unwrap()
    }

    /// Model from the auth_failure walkthrough: error_code > 400.5 is class 1
    /// with probability 0.92.
    fn engine(dir: &std::path::Path) -> Arc<DiagnosisEngine> {
        let path = dir.join("model.json");
        let model = json!({
            "model_version": "v1",
            "classes": [0, 1],
            "schema": {
                "version": "schema-1",
                "features": [
                    {"name": "error_code", "type": "int", "default": -1},
                    {"name": "retry_count", "type": "int", "default": 0}
                ]
            },
            "classifier": {
                "kind": "random_forest",
                "trees": [{"nodes": [
                    {"node": "split", "feature": 0, "threshold": 400.5, "left": 1, "right": 2},
                    {"node": "leaf", "counts": [9, 1]},
                    {"node": "leaf", "counts": [8, 92]}
                ]}]
            }
        });
        std::fs::write(&path, serde_json::to_vec(&model).unwrap()).unwrap();

        let store = Arc::new(ModelStore::new());
        store.load(&ArtifactLocator::new(&path)).unwrap();
        let labels = LabelTable::new("labels-1", [(0, "network_timeout"), (1, "auth_failure")]);
        Arc::new(DiagnosisEngine::new(store, labels))
    }

    fn config(integrations: &[&str]) -> MonitorConfig {
        MonitorConfig {
            integrations: integrations.iter().map(|s| s.to_string()).collect(),
            ..MonitorConfig::default()
        }
    }

    #[tokio::test]
    async fn unstable_integration_is_diagnosed_and_logged() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut probe = MockProbe::new();
        probe
            .expect_check()
            .returning(|id| Ok(report(id, id != "stripe")));

        let mut source = MockSource::new();
        source
            .expect_fetch_failure()
            .times(1)
            .returning(|id| Ok(failure(id)));

        let log = DiagnosisLog::new(dir.path().join("diagnoses.ndjson")).unwrap();
        let monitor = IntegrationMonitor::new(
            config(&["stripe", "slack"]),
            Arc::new(probe),
            Arc::new(source),
            engine(dir.path()),
        )
        .with_log(log);

        let entries = monitor.run_cycle().await;
        assert_eq!(entries.len(), 2);

        match &entries[0].outcome {
            CycleOutcome::Diagnosed(diagnosis) => {
                assert_eq!(diagnosis.integration_id, "stripe");
                assert_eq!(diagnosis.label, "auth_failure");
                assert!((diagnosis.confidence - 0.92).abs() < 1e-9);
                assert_eq!(diagnosis.model_version, "v1");
            }
            other => panic!("expected a diagnosis, got {:?}", other),
        }
        assert!(entries[1].healthy);
        assert_eq!(entries[1].outcome, CycleOutcome::Healthy);

        let logged = monitor.log.as_ref().unwrap().read_all().await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0], entries[0]);
    }

    #[tokio::test]
    async fn probe_failure_does_not_stop_other_integrations() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut probe = MockProbe::new();
        probe.expect_check().returning(|id| {
            if id == "github" {
                Err(MonitorError::Http("connection refused".to_string()))
            } else {
                Ok(report(id, false))
            }
        });

        let mut source = MockSource::new();
        source.expect_fetch_failure().returning(|id| {
            if id == "slack" {
                Err(CollectorError::Http("Data endpoint returned status: 404".to_string()))
            } else {
                Ok(failure(id))
            }
        });

        let monitor = IntegrationMonitor::new(
            config(&["github", "slack", "stripe"]),
            Arc::new(probe),
            Arc::new(source),
            engine(dir.path()),
        );

        let entries = monitor.run_cycle().await;
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0].outcome, CycleOutcome::ProbeFailed(_)));
        assert!(matches!(entries[1].outcome, CycleOutcome::TelemetryUnavailable(_)));
        assert!(matches!(entries[2].outcome, CycleOutcome::Diagnosed(_)));
        assert!(entries.iter().all(|e| !e.healthy));
    }

    #[tokio::test]
    async fn healthy_integration_is_not_diagnosed() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut probe = MockProbe::new();
        probe.expect_check().times(1).returning(|id| Ok(report(id, true)));
        let mut source = MockSource::new();
        source.expect_fetch_failure().never();

        let monitor = IntegrationMonitor::new(
            config(&["slack"]),
            Arc::new(probe),
            Arc::new(source),
            engine(dir.path()),
        );

        let entries = monitor.run_cycle().await;
        assert_eq!(entries[0].outcome, CycleOutcome::Healthy);
    }

    #[tokio::test]
    async fn diagnosis_errors_are_recorded_with_their_kind() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut probe = MockProbe::new();
        probe.expect_check().returning(|id| Ok(report(id, false)));
        let mut source = MockSource::new();
        source.expect_fetch_failure().returning(|id| {
            Ok(FailureEvent::from_payload(id, json!({"error_code": "n/a"})).unwrap())
        });

        let monitor = IntegrationMonitor::new(
            config(&["stripe"]),
            Arc::new(probe),
            Arc::new(source),
            engine(dir.path()),
        );

        let entries = monitor.run_cycle().await;
        match &entries[0].outcome {
            CycleOutcome::DiagnosisFailed { kind, message } => {
                assert_eq!(*kind, DiagnosisErrorKind::ExtractionFailure);
                assert!(message.contains("error_code"));
            }
            other => panic!("expected a diagnosis failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_and_deactivates() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut probe = MockProbe::new();
        probe.expect_check().returning(|id| Ok(report(id, true)));

        let monitor = IntegrationMonitor::new(
            MonitorConfig {
                check_interval_secs: 1,
                ..config(&["slack"])
            },
            Arc::new(probe),
            Arc::new(MockSource::new()),
            engine(dir.path()),
        );
        assert!(monitor.is_active());
        assert!(monitor.to_string().starts_with("AireMonitor (ID: AireMonitor-"));

        tokio::time::timeout(
            Duration::from_secs(5),
            monitor.run(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await
        .expect("run should return after shutdown");

        assert!(!monitor.is_active());
        assert!(monitor.to_string().ends_with("Active: false)"));
    }

    #[test]
    fn disabled_monitor_does_not_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let monitor = IntegrationMonitor::new(
            MonitorConfig {
                enabled: false,
                ..config(&["slack"])
            },
            Arc::new(MockProbe::new()),
            Arc::new(MockSource::new()),
            engine(dir.path()),
        );

        tokio_test::block_on(monitor.run(std::future::pending()));
        assert!(!monitor.is_active());
    }
}
