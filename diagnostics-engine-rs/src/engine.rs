// diagnostics-engine-rs/src/engine.rs
// Orchestrates extraction, classification and label mapping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::artifact::{ModelArtifact, PredictionError};
use crate::event::FailureEvent;
use crate::extractor::FeatureExtractor;
use crate::labels::LabelTable;
use crate::model_store::ModelStore;
use crate::{DiagnosisError, Result};

/// Confidence reported when the classifier exposes no class probabilities.
pub const UNCALIBRATED_CONFIDENCE: f64 = 1.0;

/// Where a diagnosis confidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// Probability the classifier assigned to the predicted class.
    ClassProbability,
    /// The classifier cannot produce probabilities; the confidence is the
    /// `UNCALIBRATED_CONFIDENCE` sentinel and carries no meaning.
    Uncalibrated,
}

/// Root-cause classification of one failure event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub integration_id: String,
    pub label: String,
    pub class_id: u32,
    pub confidence: f64,
    pub confidence_source: ConfidenceSource,
    pub model_version: String,
    pub label_table_version: String,
    pub diagnosed_at: DateTime<Utc>,
}

impl Diagnosis {
    pub fn is_calibrated(&self) -> bool {
        self.confidence_source == ConfidenceSource::ClassProbability
    }
}

/// Classifies failure events against the currently published model.
///
/// Stateless per call and `Send + Sync`; share it behind an `Arc` and call
/// `diagnose` from as many workers as needed.
pub struct DiagnosisEngine {
    store: Arc<ModelStore>,
    labels: LabelTable,
    extractor: FeatureExtractor,
}

impl DiagnosisEngine {
    pub fn new(store: Arc<ModelStore>, labels: LabelTable) -> Self {
        Self {
            store,
            labels,
            extractor: FeatureExtractor,
        }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Diagnose `event` with whatever artifact is current when the call
    /// starts. A reload that lands mid-call does not affect it.
    #[instrument(
        name = "diagnose",
        skip(self, event),
        fields(integration_id = %event.integration_id)
    )]
    pub fn diagnose(&self, event: &FailureEvent) -> Result<Diagnosis> {
        let result = self
            .store
            .current()
            .and_then(|artifact| self.classify(&artifact, event));
        record_outcome(&result);
        result
    }

    /// Diagnose against an artifact snapshot the caller already holds.
    ///
    /// The artifact gets the same validation the store applies on publish,
    /// since it may never have passed through a store.
    pub fn diagnose_with(&self, artifact: &ModelArtifact, event: &FailureEvent) -> Result<Diagnosis> {
        let result = artifact
            .validate()
            .map_err(|cause| {
                DiagnosisError::model_unavailable(
                    format!("in-memory:{}", artifact.model_version),
                    cause,
                )
            })
            .and_then(|()| self.classify(artifact, event));
        record_outcome(&result);
        result
    }

    fn classify(&self, artifact: &ModelArtifact, event: &FailureEvent) -> Result<Diagnosis> {
        let version = artifact.model_version.as_str();

        self.check_schema(artifact)?;

        let vector = self.extractor.extract(event, &artifact.schema)?;

        let prediction = artifact.predict(vector.as_slice()).map_err(|e| {
            let subject = match e {
                PredictionError::InvalidArtifact(_) => "classifier",
                PredictionError::FeatureCount { .. } | PredictionError::NonFinite => "feature_vector",
            };
            DiagnosisError::schema_mismatch(version, subject, e.to_string())
        })?;

        let label = self.labels.label_for(prediction.class_id).ok_or_else(|| {
            DiagnosisError::schema_mismatch(
                version,
                format!("class_id:{}", prediction.class_id),
                format!(
                    "class id is not in label table {}",
                    self.labels.version
                ),
            )
        })?;

        let (confidence, confidence_source) = match prediction.probability() {
            Some(p) if !p.is_finite() => {
                return Err(DiagnosisError::schema_mismatch(
                    version,
                    "feature_vector",
                    format!("classifier produced a non-finite probability ({})", p),
                ));
            }
            Some(p) => (p.clamp(0.0, 1.0), ConfidenceSource::ClassProbability),
            None => (UNCALIBRATED_CONFIDENCE, ConfidenceSource::Uncalibrated),
        };

        Ok(Diagnosis {
            integration_id: event.integration_id.clone(),
            label: label.to_string(),
            class_id: prediction.class_id,
            confidence,
            confidence_source,
            model_version: artifact.model_version.clone(),
            label_table_version: self.labels.version.clone(),
            diagnosed_at: Utc::now(),
        })
    }

    fn check_schema(&self, artifact: &ModelArtifact) -> Result<()> {
        let version = artifact.model_version.as_str();

        if artifact.schema.is_empty() {
            return Err(DiagnosisError::schema_mismatch(
                version,
                "feature_schema",
                "model declares an empty feature schema",
            ));
        }
        if let Some(name) = artifact.schema.duplicate_name() {
            return Err(DiagnosisError::schema_mismatch(
                version,
                format!("feature:{}", name),
                "feature name is declared more than once",
            ));
        }
        if !self.labels.accepts_model(version) {
            return Err(DiagnosisError::schema_mismatch(
                version,
                format!("label_table:{}", self.labels.version),
                format!(
                    "label table only serves models {:?}",
                    self.labels.compatible_models
                ),
            ));
        }
        Ok(())
    }
}

fn record_outcome(result: &Result<Diagnosis>) {
    match result {
        Ok(diagnosis) => {
            metrics::increment_counter!(
                "diagnostics_engine_diagnoses_total",
                "label" => diagnosis.label.clone()
            );
            tracing::info!(
                label = %diagnosis.label,
                class_id = diagnosis.class_id,
                confidence = diagnosis.confidence,
                calibrated = diagnosis.is_calibrated(),
                model_version = %diagnosis.model_version,
                "failure diagnosed"
            );
        }
        Err(err) => {
            metrics::increment_counter!(
                "diagnostics_engine_failures_total",
                "kind" => err.kind().as_str()
            );
            tracing::warn!(
                kind = %err.kind(),
                subject = err.subject(),
                error = %err,
                "diagnosis failed"
            );
        }
    }
}
