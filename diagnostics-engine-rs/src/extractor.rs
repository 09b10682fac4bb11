// diagnostics-engine-rs/src/extractor.rs
// Deterministic FailureEvent -> FeatureVector transform.

use serde::Serialize;

use crate::event::{FailureEvent, FieldValue};
use crate::schema::{FeatureKind, FeatureSchema, FeatureSpec};
use crate::{DiagnosisError, Result};

/// Fixed-order numeric encoding of a failure event, one value per schema
/// feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Pure extractor; holds no state and can be shared freely across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Encode `event` according to `schema`.
    ///
    /// Absent fields (and explicit nulls) take the declared default. A field
    /// that is present but cannot be coerced to its declared type fails with
    /// `ExtractionFailure` naming that field; it is never zero-filled.
    pub fn extract(&self, event: &FailureEvent, schema: &FeatureSchema) -> Result<FeatureVector> {
        let mut values = Vec::with_capacity(schema.len());
        for spec in &schema.features {
            let value = match event.field(&spec.name) {
                None | Some(FieldValue::Null) => spec.default,
                Some(raw) => coerce(spec, raw)?,
            };
            values.push(value);
        }
        Ok(FeatureVector(values))
    }
}

fn coerce(spec: &FeatureSpec, raw: &FieldValue) -> Result<f64> {
    let coerced = match spec.kind {
        FeatureKind::Int => as_int(raw),
        FeatureKind::Float => as_float(raw),
        FeatureKind::Bool => as_bool(raw),
        FeatureKind::Categorical => as_category(spec, raw),
    };

    coerced.ok_or_else(|| DiagnosisError::ExtractionFailure {
        field: spec.name.clone(),
        expected: spec.kind,
        found: raw.to_string(),
    })
}

fn as_int(raw: &FieldValue) -> Option<f64> {
    match raw {
        FieldValue::Int(i) => Some(*i as f64),
        FieldValue::Float(x) => integral(*x),
        FieldValue::Bool(b) => Some(bool_code(*b)),
        FieldValue::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Some(i as f64),
                Err(_) => s.parse::<f64>().ok().and_then(integral),
            }
        }
        FieldValue::Null | FieldValue::Structured(_) => None,
    }
}

fn as_float(raw: &FieldValue) -> Option<f64> {
    match raw {
        FieldValue::Int(i) => Some(*i as f64),
        FieldValue::Float(x) => Some(*x).filter(|x| x.is_finite()),
        FieldValue::Bool(b) => Some(bool_code(*b)),
        FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        FieldValue::Null | FieldValue::Structured(_) => None,
    }
}

fn as_bool(raw: &FieldValue) -> Option<f64> {
    match raw {
        FieldValue::Bool(b) => Some(bool_code(*b)),
        FieldValue::Int(0) => Some(0.0),
        FieldValue::Int(1) => Some(1.0),
        FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(1.0),
            "false" | "0" | "no" | "off" => Some(0.0),
            _ => None,
        },
        _ => None,
    }
}

fn as_category(spec: &FeatureSpec, raw: &FieldValue) -> Option<f64> {
    let key = match raw {
        FieldValue::Text(s) => s.trim().to_string(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    spec.categories.get(&key).map(|code| *code as f64)
}

fn integral(x: f64) -> Option<f64> {
    (x.is_finite() && x.fract() == 0.0).then_some(x)
}

fn bool_code(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
