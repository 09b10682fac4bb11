// integration-monitor-rs/src/reload.rs
// Periodic model artifact reload.
//
// A failed reload leaves the previously published artifact serving and is
// retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use diagnostics_engine::{ArtifactLocator, ModelStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::MonitorError;

/// Load `locator` into `store` off the async runtime threads. Returns the
/// version now being served.
pub async fn reload_model(
    store: &Arc<ModelStore>,
    locator: &ArtifactLocator,
) -> Result<String, MonitorError> {
    let store = Arc::clone(store);
    let locator = locator.clone();

    let artifact = tokio::task::spawn_blocking(move || store.load(&locator))
        .await
        .map_err(|e| MonitorError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    Ok(artifact.model_version.clone())
}

/// Reload the model every `every`. A zero interval disables the task.
pub fn spawn_model_reload(
    store: Arc<ModelStore>,
    locator: ArtifactLocator,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        tracing::info!("periodic model reload disabled");
        return None;
    }

    tracing::info!(locator = %locator, every_secs = every.as_secs_f64(), "periodic model reload enabled");

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the model was loaded at startup.
        interval.tick().await;

        loop {
            interval.tick().await;
            match reload_model(&store, &locator).await {
                Ok(version) => tracing::debug!(model_version = %version, "model reloaded"),
                Err(e) => tracing::warn!(
                    error = %e,
                    serving = store.version().as_deref().unwrap_or("<none>"),
                    "model reload failed; keeping previous artifact"
                ),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn write_model(path: &Path, version: &str) {
        let model = json!({
            "model_version": version,
            "classes": [0, 1],
            "schema": {
                "version": "schema-1",
                "features": [{"name": "error_code", "type": "int", "default": -1}]
            },
            "classifier": {
                "kind": "nearest_centroid",
                "centroids": [[200.0], [401.0]]
            }
        });
        std::fs::write(path, serde_json::to_vec(&model).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn reload_model_publishes_new_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        write_model(&path, "v1");

        let store = Arc::new(ModelStore::new());
        let locator = ArtifactLocator::new(&path);
        assert_eq!(reload_model(&store, &locator).await.unwrap(), "v1");

        std::fs::write(&path, b"{ truncated").unwrap();
        let err = reload_model(&store, &locator).await.unwrap_err();
        assert!(matches!(err, MonitorError::Model(_)));
        assert_eq!(store.version().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn zero_interval_disables_reload() {
        let store = Arc::new(ModelStore::new());
        let handle = spawn_model_reload(store, ArtifactLocator::new("unused.json"), Duration::ZERO);
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn background_task_picks_up_new_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        write_model(&path, "v1");

        let store = Arc::new(ModelStore::new());
        let locator = ArtifactLocator::new(&path);
        store.load(&locator).unwrap();

        let handle = spawn_model_reload(Arc::clone(&store), locator, Duration::from_millis(20))
            .expect("reload task");
        write_model(&path, "v2");

        let mut swapped = false;
        for _ in 0..100 {
            if store.version().as_deref() == Some("v2") {
                swapped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(swapped, "reload task never published v2");
    }
}
