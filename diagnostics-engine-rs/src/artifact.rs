// diagnostics-engine-rs/src/artifact.rs
// Trained classifier artifacts and their prediction routines.
//
// Artifacts are produced by an offline training job and shipped as JSON.
// Three representations are supported; only random forests and logistic
// regression expose calibrated class probabilities.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::FeatureSchema;

/// Why an artifact could not be made available.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("no model artifact has been loaded")]
    NotLoaded,

    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode artifact: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid artifact: {0}")]
    Invalid(String),
}

/// Why a classifier could not produce a prediction for a vector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    #[error("classifier expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("classifier scores are not finite for this feature vector")]
    NonFinite,

    #[error("artifact cannot serve predictions: {0}")]
    InvalidArtifact(String),
}

/// Output of a single classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub class_id: u32,
    /// Per-class probabilities aligned with `ModelArtifact::classes`, when
    /// the classifier can produce them.
    pub probabilities: Option<Vec<f64>>,
}

impl Prediction {
    /// Probability of the predicted class, if calibrated probabilities exist.
    pub fn probability(&self) -> Option<f64> {
        self.probabilities
            .as_ref()
            .and_then(|p| p.get(self.class_index).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `x[feature] <= threshold`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Training sample counts per class, aligned with the artifact classes.
    Leaf { counts: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// `None` when the walk leaves the node list, splits on a missing
    /// feature, or does not reach a leaf within `nodes.len()` steps.
    fn leaf_counts(&self, features: &[f64]) -> Option<&[f64]> {
        let mut idx = 0;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx)? {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if *features.get(*feature)? <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { counts } => return Some(counts),
            }
        }
        None
    }

    // Children must point strictly forward, which rules out cycles.
    fn validate(&self, tree: usize, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err(format!("tree {} has no nodes", tree));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "tree {} node {} splits on feature {} but the schema has {}",
                            tree, i, feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("tree {} node {} has a non-finite threshold", tree, i));
                    }
                    for child in [*left, *right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(format!(
                                "tree {} node {} has out-of-order child {}",
                                tree, i, child
                            ));
                        }
                    }
                }
                TreeNode::Leaf { counts } => {
                    if counts.len() != n_classes {
                        return Err(format!(
                            "tree {} leaf {} has {} counts for {} classes",
                            tree,
                            i,
                            counts.len(),
                            n_classes
                        ));
                    }
                    if counts.iter().any(|c| !c.is_finite() || *c < 0.0)
                        || counts.iter().sum::<f64>() <= 0.0
                    {
                        return Err(format!("tree {} leaf {} has invalid counts", tree, i));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serialized classifier, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierRepr {
    RandomForest {
        trees: Vec<DecisionTree>,
    },
    /// `coefficients[class][feature]`, one intercept per class.
    LogisticRegression {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// `centroids[class][feature]`; no probabilities.
    NearestCentroid {
        centroids: Vec<Vec<f64>>,
    },
}

impl ClassifierRepr {
    pub const fn model_type(&self) -> &'static str {
        match self {
            Self::RandomForest { .. } => "random_forest",
            Self::LogisticRegression { .. } => "logistic_regression",
            Self::NearestCentroid { .. } => "nearest_centroid",
        }
    }

    pub const fn supports_probabilities(&self) -> bool {
        !matches!(self, Self::NearestCentroid { .. })
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        match self {
            Self::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                trees
                    .iter()
                    .enumerate()
                    .try_for_each(|(t, tree)| tree.validate(t, n_features, n_classes))
            }
            Self::LogisticRegression {
                coefficients,
                intercepts,
            } => {
                if intercepts.len() != n_classes || intercepts.iter().any(|b| !b.is_finite()) {
                    return Err(format!(
                        "logistic regression needs {} finite intercepts, got {}",
                        n_classes,
                        intercepts.len()
                    ));
                }
                check_matrix("coefficients", coefficients, n_classes, n_features)
            }
            Self::NearestCentroid { centroids } => {
                check_matrix("centroids", centroids, n_classes, n_features)
            }
        }
    }

    /// Index of the predicted class plus optional per-class probabilities.
    ///
    /// Never indexes out of bounds, so an artifact that skipped `validate`
    /// yields `InvalidArtifact` instead of a panic.
    fn predict(
        &self,
        features: &[f64],
        n_classes: usize,
    ) -> Result<(usize, Option<Vec<f64>>), PredictionError> {
        let invalid = |reason: String| PredictionError::InvalidArtifact(reason);

        match self {
            Self::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(invalid("random forest has no trees".to_string()));
                }
                let mut proba = vec![0.0; n_classes];
                for (t, tree) in trees.iter().enumerate() {
                    let counts = tree
                        .leaf_counts(features)
                        .ok_or_else(|| invalid(format!("tree {} does not reach a leaf", t)))?;
                    if counts.len() != n_classes {
                        return Err(invalid(format!(
                            "tree {} leaf has {} counts for {} classes",
                            t,
                            counts.len(),
                            n_classes
                        )));
                    }
                    let total: f64 = counts.iter().sum();
                    for (p, c) in proba.iter_mut().zip(counts) {
                        *p += c / total;
                    }
                }
                let n_trees = trees.len() as f64;
                proba.iter_mut().for_each(|p| *p /= n_trees);
                finite_proba(proba)
            }
            Self::LogisticRegression {
                coefficients,
                intercepts,
            } => {
                check_matrix("coefficients", coefficients, n_classes, features.len())
                    .map_err(invalid)?;
                if intercepts.len() != n_classes {
                    return Err(invalid(format!(
                        "{} intercepts for {} classes",
                        intercepts.len(),
                        n_classes
                    )));
                }
                let scores: Vec<f64> = coefficients
                    .iter()
                    .zip(intercepts)
                    .map(|(row, b)| b + dot(row, features))
                    .collect();
                let proba = softmax(&scores).ok_or(PredictionError::NonFinite)?;
                finite_proba(proba)
            }
            Self::NearestCentroid { centroids } => {
                check_matrix("centroids", centroids, n_classes, features.len()).map_err(invalid)?;
                let distances: Vec<f64> = centroids
                    .iter()
                    .map(|c| {
                        c.iter()
                            .zip(features)
                            .map(|(a, b)| (a - b).powi(2))
                            .sum::<f64>()
                    })
                    .collect();
                // Overflowed distances make every centroid look equally far.
                if distances.iter().any(|d| !d.is_finite()) {
                    return Err(PredictionError::NonFinite);
                }
                let nearest = distances
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
                    .ok_or_else(|| invalid("no centroids".to_string()))?;
                Ok((nearest, None))
            }
        }
    }
}

/// Trained, versioned classifier plus the schema it was trained against.
///
/// Immutable once published by the `ModelStore`; readers hold it through an
/// `Arc` for the duration of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    /// Raw class identifiers, in the order the classifier emits them.
    pub classes: Vec<u32>,
    pub schema: FeatureSchema,
    pub classifier: ClassifierRepr,
}

impl ModelArtifact {
    /// Check the artifact can actually serve predictions: a usable schema,
    /// a non-empty closed class list, and a classifier whose shape matches
    /// both. Duplicate feature names are left to the engine, which reports
    /// them as schema drift.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.model_version.trim().is_empty() {
            return Err(ArtifactError::Invalid("model_version is empty".to_string()));
        }
        if let Some(issue) = self.schema.structural_issue() {
            return Err(ArtifactError::Invalid(issue));
        }
        if self.classes.is_empty() {
            return Err(ArtifactError::Invalid("artifact declares no classes".to_string()));
        }
        let mut seen = HashSet::with_capacity(self.classes.len());
        if let Some(dup) = self.classes.iter().find(|c| !seen.insert(**c)) {
            return Err(ArtifactError::Invalid(format!("class id {} is declared twice", dup)));
        }
        self.classifier
            .validate(self.schema.len(), self.classes.len())
            .map_err(ArtifactError::Invalid)
    }

    /// Classify an already-extracted feature vector.
    pub fn predict(&self, features: &[f64]) -> Result<Prediction, PredictionError> {
        if features.len() != self.schema.len() {
            return Err(PredictionError::FeatureCount {
                expected: self.schema.len(),
                actual: features.len(),
            });
        }
        let (class_index, probabilities) = self.classifier.predict(features, self.classes.len())?;
        let class_id = *self.classes.get(class_index).ok_or_else(|| {
            PredictionError::InvalidArtifact(format!(
                "class index {} is outside the {} declared classes",
                class_index,
                self.classes.len()
            ))
        })?;
        Ok(Prediction {
            class_index,
            class_id,
            probabilities,
        })
    }
}

fn check_matrix(what: &str, rows: &[Vec<f64>], n_rows: usize, n_cols: usize) -> Result<(), String> {
    if rows.len() != n_rows {
        return Err(format!("{} has {} rows for {} classes", what, rows.len(), n_rows));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n_cols {
            return Err(format!(
                "{} row {} has {} values for {} features",
                what,
                i,
                row.len(),
                n_cols
            ));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(format!("{} row {} contains non-finite values", what, i));
        }
    }
    Ok(())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn finite_proba(proba: Vec<f64>) -> Result<(usize, Option<Vec<f64>>), PredictionError> {
    if proba.is_empty() || proba.iter().any(|p| !p.is_finite()) {
        return Err(PredictionError::NonFinite);
    }
    Ok((argmax(&proba), Some(proba)))
}

/// `None` when a score is NaN or every score is `-inf`. Scores that
/// overflowed to `+inf` share all of the mass.
fn softmax(scores: &[f64]) -> Option<Vec<f64>> {
    if scores.iter().any(|s| s.is_nan()) {
        return None;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return None;
    }
    if max == f64::INFINITY {
        let n_top = scores.iter().filter(|s| **s == f64::INFINITY).count() as f64;
        return Some(
            scores
                .iter()
                .map(|s| if *s == f64::INFINITY { 1.0 / n_top } else { 0.0 })
                .collect(),
        );
    }
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    Some(exps.into_iter().map(|e| e / total).collect())
}

// Ties resolve to the lowest index; NaN never wins.
fn argmax(values: &[f64]) -> usize {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |b| *v > values[b]) {
            best = Some(i);
        }
    }
    best.unwrap_or(0)
}
