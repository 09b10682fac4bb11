// integration-monitor-rs/src/main.rs
// Main entry point for the integration monitor.
// Polls integration health and diagnoses the unstable ones.

use std::sync::Arc;

use anyhow::Context;
use diagnostics_engine::{ArtifactLocator, DiagnosisEngine, LabelTable, ModelStore};
use integration_collector::{CollectorConfig, HttpCollector};
use integration_monitor::{
    init_logging, spawn_model_reload, CycleOutcome, DiagnosisLog, HttpHealthProbe,
    IntegrationMonitor, MonitorConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = MonitorConfig::from_env();
    init_logging(config.log_json)?;
    config.validate()?;

    tracing::info!("=== integration-monitor: failure diagnosis ===");

    if config.integrations.is_empty() {
        tracing::warn!("AIRE_INTEGRATIONS is empty; cycles will check nothing");
    }

    let locator = ArtifactLocator::from_env();
    let store = Arc::new(ModelStore::new());
    store
        .load(&locator)
        .with_context(|| format!("failed to load model artifact from {}", locator))?;

    let labels = LabelTable::from_path(&config.label_table_path).with_context(|| {
        format!(
            "failed to load label table from {}",
            config.label_table_path.display()
        )
    })?;
    let engine = Arc::new(DiagnosisEngine::new(Arc::clone(&store), labels));

    let collector = HttpCollector::new(CollectorConfig::from_env())?;
    tracing::info!("{}", collector);

    let probe = HttpHealthProbe::new(&config)?;
    let log = DiagnosisLog::new(&config.diagnosis_log_path)?;

    let monitor = IntegrationMonitor::new(
        config.clone(),
        Arc::new(probe),
        Arc::new(collector),
        engine,
    )
    .with_log(log);
    tracing::info!("{}", monitor);

    let reload = spawn_model_reload(store, locator, config.model_reload_interval());

    if config.run_once {
        for entry in monitor.run_cycle().await {
            match &entry.outcome {
                CycleOutcome::Diagnosed(diagnosis) => tracing::info!(
                    integration_id = %entry.integration_id,
                    label = %diagnosis.label,
                    confidence = diagnosis.confidence,
                    "diagnosis"
                ),
                outcome => tracing::info!(
                    integration_id = %entry.integration_id,
                    outcome = ?outcome,
                    "cycle result"
                ),
            }
        }
    } else {
        monitor
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            })
            .await;
    }

    if let Some(handle) = reload {
        handle.abort();
    }

    Ok(())
}
