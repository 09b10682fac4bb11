// diagnostics-engine-rs/src/schema.rs
// Versioned feature schema shared by a model artifact and the extractor.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric type a raw field is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Int,
    Float,
    Bool,
    Categorical,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Int => write!(f, "int"),
            FeatureKind::Float => write!(f, "float"),
            FeatureKind::Bool => write!(f, "bool"),
            FeatureKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// One declared feature: `{name, type, default}` plus the category codes
/// for categorical features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    pub default: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, i64>,
}

impl FeatureSpec {
    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::plain(name, FeatureKind::Int, default as f64)
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::plain(name, FeatureKind::Float, default)
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::plain(name, FeatureKind::Bool, if default { 1.0 } else { 0.0 })
    }

    pub fn categorical<I, S>(name: impl Into<String>, categories: I, default: i64) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
            default: default as f64,
            categories: categories.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    fn plain(name: impl Into<String>, kind: FeatureKind, default: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            categories: BTreeMap::new(),
        }
    }
}

/// Ordered list of features; the order is the contract the classifier was
/// trained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: String,
    pub features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(version: impl Into<String>, features: Vec<FeatureSpec>) -> Self {
        Self {
            version: version.into(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// First feature name that appears more than once, if any.
    pub fn duplicate_name(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.features.len());
        self.names().find(|name| !seen.insert(*name))
    }

    /// Structural problems that make the schema unusable for extraction.
    /// Duplicate names are reported separately by `duplicate_name`.
    pub fn structural_issue(&self) -> Option<String> {
        if self.features.is_empty() {
            return Some("feature schema declares no features".to_string());
        }
        for spec in &self.features {
            if spec.name.trim().is_empty() {
                return Some("feature schema contains an unnamed feature".to_string());
            }
            if !spec.default.is_finite() {
                return Some(format!("feature '{}' has a non-finite default", spec.name));
            }
            if spec.kind == FeatureKind::Categorical && spec.categories.is_empty() {
                return Some(format!(
                    "categorical feature '{}' declares no categories",
                    spec.name
                ));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptor_json() {
        let schema: FeatureSchema = serde_json::from_str(
            r#"{
                "version": "2024-06",
                "features": [
                    {"name": "error_code", "type": "int", "default": -1},
                    {"name": "region", "type": "categorical", "default": -1,
                     "categories": {"us": 0, "eu": 1}}
                ]
            }"#,
        )
        .expect("schema descriptor should parse");

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.features[0], FeatureSpec::int("error_code", -1));
        assert_eq!(
            schema.features[1],
            FeatureSpec::categorical("region", [("us", 0), ("eu", 1)], -1)
        );
        assert!(schema.structural_issue().is_none());
    }

    #[test]
    fn detects_duplicates_and_structural_issues() {
        let schema = FeatureSchema::new(
            "dup",
            vec![
                FeatureSpec::int("error_code", 0),
                FeatureSpec::float("latency_ms", 0.0),
                FeatureSpec::int("error_code", 0),
            ],
        );
        assert_eq!(schema.duplicate_name(), Some("error_code"));

        assert!(FeatureSchema::new("empty", vec![]).structural_issue().is_some());

        let no_categories = FeatureSchema::new(
            "cat",
            vec![FeatureSpec::categorical("region", Vec::<(String, i64)>::new(), 0)],
        );
        assert!(no_categories.structural_issue().unwrap().contains("region"));
    }
}
