// diagnostics-engine-rs/src/lib.rs
// Library interface for the failure diagnosis pipeline.
//
// A failure event flows through three pieces:
// - `FeatureExtractor` turns the raw event into a `FeatureVector` laid out
//   by the model's `FeatureSchema`.
// - `ModelStore` owns the currently published `ModelArtifact` and swaps it
//   atomically on reload.
// - `DiagnosisEngine` runs the classifier and maps the raw class id onto a
//   root-cause label from its `LabelTable`.
//
// Everything here is synchronous. Fetching telemetry and scheduling model
// reloads belong to the collector and monitor crates.

pub mod artifact;
pub mod engine;
pub mod event;
pub mod extractor;
pub mod labels;
pub mod model_store;
pub mod schema;


use serde::{Deserialize, Serialize};

pub use crate::artifact::{
    ArtifactError, ClassifierRepr, DecisionTree, ModelArtifact, Prediction, PredictionError, TreeNode,
};
pub use crate::engine::{ConfidenceSource, Diagnosis, DiagnosisEngine, UNCALIBRATED_CONFIDENCE};
pub use crate::event::{EventError, FailureEvent, FieldValue};
pub use crate::extractor::{FeatureExtractor, FeatureVector};
pub use crate::labels::{LabelTable, LabelTableError};
pub use crate::model_store::{ArtifactLocator, ModelStore};
pub use crate::schema::{FeatureKind, FeatureSchema, FeatureSpec};

/// Result type used by the diagnosis pipeline.
pub type Result<T> = std::result::Result<T, DiagnosisError>;

/// Terminal failure of a single diagnosis request.
///
/// Every variant names what caused it (a field, an artifact locator, or the
/// schema element that drifted) so callers can tell a data problem apart
/// from a model-lifecycle problem. None of them are retried here.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("extraction failure on field '{field}': expected {expected}, got {found}")]
    ExtractionFailure {
        field: String,
        expected: FeatureKind,
        found: String,
    },

    #[error("model unavailable ({locator}): {cause}")]
    ModelUnavailable {
        locator: String,
        #[source]
        cause: ArtifactError,
    },

    #[error("schema mismatch in model {model_version} at {subject}: {detail}")]
    SchemaMismatch {
        model_version: String,
        subject: String,
        detail: String,
    },
}

/// Serializable tag of a `DiagnosisError`, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisErrorKind {
    ExtractionFailure,
    ModelUnavailable,
    SchemaMismatch,
}

impl DiagnosisErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisErrorKind::ExtractionFailure => "extraction_failure",
            DiagnosisErrorKind::ModelUnavailable => "model_unavailable",
            DiagnosisErrorKind::SchemaMismatch => "schema_mismatch",
        }
    }
}

impl std::fmt::Display for DiagnosisErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DiagnosisError {
    pub fn kind(&self) -> DiagnosisErrorKind {
        match self {
            DiagnosisError::ExtractionFailure { .. } => DiagnosisErrorKind::ExtractionFailure,
            DiagnosisError::ModelUnavailable { .. } => DiagnosisErrorKind::ModelUnavailable,
            DiagnosisError::SchemaMismatch { .. } => DiagnosisErrorKind::SchemaMismatch,
        }
    }

    /// The field, locator, or schema element this failure originated from.
    pub fn subject(&self) -> &str {
        match self {
            DiagnosisError::ExtractionFailure { field, .. } => field,
            DiagnosisError::ModelUnavailable { locator, .. } => locator,
            DiagnosisError::SchemaMismatch { subject, .. } => subject,
        }
    }

    pub(crate) fn model_unavailable(locator: impl Into<String>, cause: ArtifactError) -> Self {
        DiagnosisError::ModelUnavailable {
            locator: locator.into(),
            cause,
        }
    }

    pub(crate) fn schema_mismatch(
        model_version: &str,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        DiagnosisError::SchemaMismatch {
            model_version: model_version.to_string(),
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}
