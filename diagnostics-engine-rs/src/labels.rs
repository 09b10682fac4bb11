// diagnostics-engine-rs/src/labels.rs
// Closed class-id -> root-cause label mapping owned by the engine.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LabelTableError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("label table {0} is invalid: {1}")]
    Invalid(String, String),
}

/// Root-cause labels for the raw class ids a model emits.
///
/// The label set is versioned together with the models it serves. When
/// `compatible_models` is non-empty, only those model versions may be
/// diagnosed with this table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatible_models: Vec<String>,
    pub labels: BTreeMap<u32, String>,
}

impl LabelTable {
    pub fn new<I, S>(version: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            version: version.into(),
            compatible_models: Vec::new(),
            labels: labels.into_iter().map(|(id, l)| (id, l.into())).collect(),
        }
    }

    pub fn with_compatible_models<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compatible_models = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LabelTableError> {
        let table: LabelTable = serde_json::from_str(raw)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<Self, LabelTableError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn label_for(&self, class_id: u32) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    pub fn accepts_model(&self, model_version: &str) -> bool {
        self.compatible_models.is_empty() || self.compatible_models.iter().any(|v| v == model_version)
    }

    fn validate(&self) -> Result<(), LabelTableError> {
        if self.labels.is_empty() {
            return Err(LabelTableError::Invalid(
                self.version.clone(),
                "no labels declared".to_string(),
            ));
        }
        if let Some((id, _)) = self.labels.iter().find(|(_, l)| l.trim().is_empty()) {
            return Err(LabelTableError::Invalid(
                self.version.clone(),
                format!("class {} has a blank label", id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_keyed_json() {
        let table = LabelTable::from_json_str(
            r#"{"version": "labels-1", "compatible_models": ["v1"],
                "labels": {"0": "network_timeout", "1": "auth_failure"}}"#,
        )
        .unwrap();

        assert_eq!(table.label_for(1), Some("auth_failure"));
        assert_eq!(table.label_for(7), None);
        assert!(table.accepts_model("v1"));
        assert!(!table.accepts_model("v2"));
    }

    #[test]
    fn open_table_accepts_any_model() {
        let table = LabelTable::new("labels-1", [(0, "network_timeout")]);
        assert!(table.accepts_model("anything"));
    }

    #[test]
    fn rejects_empty_and_blank_labels() {
        assert!(matches!(
            LabelTable::from_json_str(r#"{"version": "x", "labels": {}}"#),
            Err(LabelTableError::Invalid(..))
        ));
        assert!(matches!(
            LabelTable::from_json_str(r#"{"version": "x", "labels": {"0": " "}}"#),
            Err(LabelTableError::Invalid(..))
        ));
    }
}
