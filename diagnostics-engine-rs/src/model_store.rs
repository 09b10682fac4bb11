// diagnostics-engine-rs/src/model_store.rs
// Loads, validates and publishes the current model artifact.
//
// Implementation notes:
// - The published artifact lives behind an `ArcSwapOption`, so `current()`
//   never blocks and a reload replaces the pointer atomically.
// - Readers keep the `Arc` they captured; a swap never invalidates an
//   in-flight request.
// - A failed load leaves the previous artifact in place. Retrying is the
//   caller's job.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::artifact::{ArtifactError, ClassifierRepr, ModelArtifact};
use crate::schema::FeatureSchema;
use crate::{DiagnosisError, Result};

/// Where a serialized artifact lives.
///
/// The model file may embed its schema; a separate schema descriptor, when
/// given, takes precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    pub model_path: PathBuf,
    pub schema_path: Option<PathBuf>,
    /// Lowercase hex SHA-256 of the model file.
    pub expected_sha256: Option<String>,
}

impl ArtifactLocator {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            schema_path: None,
            expected_sha256: None,
        }
    }

    pub fn with_schema(mut self, schema_path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(schema_path.into());
        self
    }

    pub fn with_checksum(mut self, sha256_hex: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256_hex.into().to_ascii_lowercase());
        self
    }

    /// - AIRE_MODEL_PATH: model file (default `./models/model.json`)
    /// - AIRE_MODEL_SCHEMA_PATH: optional schema descriptor
    /// - AIRE_MODEL_SHA256: optional expected digest of the model file
    pub fn from_env() -> Self {
        Self {
            model_path: config_rs::env_path("AIRE_MODEL_PATH", "./models/model.json"),
            schema_path: config_rs::env_optional("AIRE_MODEL_SCHEMA_PATH").map(PathBuf::from),
            expected_sha256: config_rs::env_optional("AIRE_MODEL_SHA256")
                .map(|v| v.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.model_path.display())?;
        if let Some(schema) = &self.schema_path {
            write!(f, " (schema {})", schema.display())?;
        }
        Ok(())
    }
}

/// On-disk artifact layout; `schema` is optional here because it may ship
/// as a separate descriptor.
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    model_version: String,
    #[serde(default)]
    trained_at: Option<DateTime<Utc>>,
    classes: Vec<u32>,
    #[serde(default)]
    schema: Option<FeatureSchema>,
    classifier: ClassifierRepr,
}

/// Holder of the currently published model artifact.
#[derive(Default)]
pub struct ModelStore {
    current: ArcSwapOption<ModelArtifact>,
}

impl fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStore")
            .field("model_version", &self.version())
            .finish()
    }
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, verify, decode and validate the artifact at `locator`, then
    /// publish it. Any failure is `ModelUnavailable` carrying the locator
    /// and the underlying cause.
    #[instrument(name = "model_load", skip(self, locator), fields(locator = %locator))]
    pub fn load(&self, locator: &ArtifactLocator) -> Result<Arc<ModelArtifact>> {
        let artifact = read_artifact(locator).map_err(|cause| {
            tracing::warn!(error = %cause, "model artifact could not be read");
            DiagnosisError::model_unavailable(locator.to_string(), cause)
        })?;
        self.publish(artifact, &locator.to_string())
    }

    /// Publish an artifact built in memory, with the same validation `load`
    /// applies.
    pub fn install(&self, artifact: ModelArtifact) -> Result<Arc<ModelArtifact>> {
        let locator = format!("in-memory:{}", artifact.model_version);
        self.publish(artifact, &locator)
    }

    /// Most recently published artifact.
    pub fn current(&self) -> Result<Arc<ModelArtifact>> {
        self.current
            .load_full()
            .ok_or_else(|| DiagnosisError::model_unavailable("<none>", ArtifactError::NotLoaded))
    }

    pub fn version(&self) -> Option<String> {
        self.current
            .load_full()
            .map(|artifact| artifact.model_version.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    fn publish(&self, artifact: ModelArtifact, locator: &str) -> Result<Arc<ModelArtifact>> {
        artifact.validate().map_err(|cause| {
            tracing::warn!(locator, error = %cause, "model artifact failed validation");
            DiagnosisError::model_unavailable(locator, cause)
        })?;

        let artifact = Arc::new(artifact);
        let previous = self.current.swap(Some(Arc::clone(&artifact)));

        tracing::info!(
            locator,
            model_version = %artifact.model_version,
            previous_version = previous.as_ref().map(|p| p.model_version.as_str()).unwrap_or("<none>"),
            model_type = artifact.classifier.model_type(),
            features = artifact.schema.len(),
            classes = artifact.classes.len(),
            "model artifact published"
        );

        Ok(artifact)
    }
}

fn read_artifact(locator: &ArtifactLocator) -> std::result::Result<ModelArtifact, ArtifactError> {
    let bytes = std::fs::read(&locator.model_path)?;

    if let Some(expected) = &locator.expected_sha256 {
        let actual = sha256_checksum(&bytes);
        if &actual != expected {
            return Err(ArtifactError::ChecksumMismatch {
                expected: expected.clone(),
                actual,
            });
        }
    }

    let file: ArtifactFile = serde_json::from_slice(&bytes)?;

    let schema = match &locator.schema_path {
        Some(path) => serde_json::from_slice::<FeatureSchema>(&std::fs::read(path)?)?,
        None => file.schema.ok_or_else(|| {
            ArtifactError::Invalid(
                "artifact embeds no feature schema and no schema descriptor was given".to_string(),
            )
        })?,
    };

    Ok(ModelArtifact {
        model_version: file.model_version,
        trained_at: file.trained_at,
        classes: file.classes,
        schema,
        classifier: file.classifier,
    })
}

pub(crate) fn sha256_checksum(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
