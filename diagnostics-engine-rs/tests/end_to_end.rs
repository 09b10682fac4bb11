use std::path::Path;
use std::sync::Arc;

use diagnostics_engine::{
    ArtifactLocator, ConfidenceSource, DiagnosisEngine, DiagnosisErrorKind, FailureEvent,
    LabelTable, ModelStore,
};
use serde_json::json;

fn write_model(dir: &Path, file: &str, version: &str, auth_probability: u32) -> ArtifactLocator {
    let model = json!({
        "model_version": version,
        "trained_at": "2024-04-30T00:00:00Z",
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
                {"node": "leaf", "counts": [100 - auth_probability, auth_probability]}
            ]}]
        }
    });
    let path = dir.join(file);
    std::fs::write(&path, serde_json::to_vec_pretty(&model).unwrap()).unwrap();
    ArtifactLocator::new(path)
}

fn label_table(dir: &Path) -> LabelTable {
    let path = dir.join("labels.json");
    std::fs::write(
        &path,
        r#"{"version": "labels-1", "labels": {"0": "network_timeout", "1": "auth_failure"}}"#,
    )
    .unwrap();
    LabelTable::from_path(&path).expect("label table should parse")
}

#[test]
fn persisted_event_is_diagnosed_against_loaded_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(ModelStore::new());
    let engine = DiagnosisEngine::new(Arc::clone(&store), label_table(dir.path()));

    let event = FailureEvent::from_json(json!({
        "integration_id": "stripe",
        "timestamp": "2024-05-01T12:00:00Z",
        "error_code": 401
    }))
    .unwrap();

    // Nothing loaded yet.
    assert_eq!(
        engine.diagnose(&event).unwrap_err().kind(),
        DiagnosisErrorKind::ModelUnavailable
    );

    store
        .load(&write_model(dir.path(), "model-v1.json", "v1", 92))
        .expect("v1 should load");

    let diagnosis = engine.diagnose(&event).unwrap();
    assert_eq!(diagnosis.label, "auth_failure");
    assert!((diagnosis.confidence - 0.92).abs() < 1e-9);
    assert_eq!(diagnosis.confidence_source, ConfidenceSource::ClassProbability);
    assert_eq!(diagnosis.model_version, "v1");
}

#[test]
fn reload_swaps_for_new_requests_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(ModelStore::new());
    let engine = DiagnosisEngine::new(Arc::clone(&store), label_table(dir.path()));
    let event = FailureEvent::from_json(json!({
        "integration_id": "github",
        "timestamp": 1_714_564_800,
        "error_code": "403"
    }))
    .unwrap();

    store
        .load(&write_model(dir.path(), "model-v1.json", "v1", 92))
        .unwrap();
    let in_flight = store.current().unwrap();

    store
        .load(&write_model(dir.path(), "model-v2.json", "v2", 75))
        .unwrap();

    let old = engine.diagnose_with(&in_flight, &event).unwrap();
    assert_eq!(old.model_version, "v1");
    assert!((old.confidence - 0.92).abs() < 1e-9);

    let new = engine.diagnose(&event).unwrap();
    assert_eq!(new.model_version, "v2");
    assert!((new.confidence - 0.75).abs() < 1e-9);

    // A broken artifact on reload leaves v2 serving.
    let broken = dir.path().join("model-v3.json");
    std::fs::write(&broken, b"{\"model_version\": \"v3\"}").unwrap();
    let err = store.load(&ArtifactLocator::new(&broken)).unwrap_err();
    assert_eq!(err.kind(), DiagnosisErrorKind::ModelUnavailable);
    assert_eq!(store.version().as_deref(), Some("v2"));
}
