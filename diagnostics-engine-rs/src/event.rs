// diagnostics-engine-rs/src/event.rs
// Failure telemetry records consumed by the diagnosis pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const INTEGRATION_ID_KEY: &str = "integration_id";
const TIMESTAMP_KEY: &str = "timestamp";

/// A single raw telemetry value.
///
/// Nested arrays and objects are kept as `Structured` rather than dropped, so
/// a declared feature that receives one fails extraction instead of quietly
/// falling back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Structured(Value),
}

impl FieldValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                // u64 beyond i64::MAX and fractional numbers
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Structured(other),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "bool {}", b),
            FieldValue::Int(i) => write!(f, "int {}", i),
            FieldValue::Float(x) => write!(f, "float {}", x),
            FieldValue::Text(s) => write!(f, "text {:?}", s),
            FieldValue::Structured(v) => write!(f, "structured {}", v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Errors raised while turning persisted or live JSON into a `FailureEvent`.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("failure event payload must be a JSON object")]
    NotAnObject,

    #[error("failure event is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("failure event field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Immutable record of one observed integration failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEvent {
    pub integration_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub raw_fields: BTreeMap<String, FieldValue>,
}

impl FailureEvent {
    pub fn new(
        integration_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        raw_fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            integration_id: integration_id.into(),
            timestamp,
            raw_fields,
        }
    }

    /// Builder-style helper, mostly for tests and replay tooling.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.raw_fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.raw_fields.get(name)
    }

    /// Parse the persisted form: a JSON object carrying `integration_id`,
    /// `timestamp` (RFC 3339 string or Unix seconds) and arbitrary fields.
    pub fn from_json(value: Value) -> Result<Self, EventError> {
        let Value::Object(mut object) = value else {
            return Err(EventError::NotAnObject);
        };

        let integration_id = match object.remove(INTEGRATION_ID_KEY) {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(other) => {
                return Err(EventError::InvalidField {
                    field: INTEGRATION_ID_KEY,
                    reason: format!("expected a non-empty string, got {}", other),
                });
            }
            None => return Err(EventError::MissingField(INTEGRATION_ID_KEY)),
        };

        let timestamp = match object.remove(TIMESTAMP_KEY) {
            Some(raw) => parse_timestamp(&raw).map_err(|reason| EventError::InvalidField {
                field: TIMESTAMP_KEY,
                reason,
            })?,
            None => return Err(EventError::MissingField(TIMESTAMP_KEY)),
        };

        let raw_fields = object
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(v)))
            .collect();

        Ok(Self::new(integration_id, timestamp, raw_fields))
    }

    /// Build an event from a collector payload that does not carry its own
    /// identity. The supplied id wins over any id inside the payload; the
    /// payload timestamp is used when present and parseable, else now.
    pub fn from_payload(integration_id: &str, payload: Value) -> Result<Self, EventError> {
        let Value::Object(mut object) = payload else {
            return Err(EventError::NotAnObject);
        };

        object.remove(INTEGRATION_ID_KEY);
        let timestamp = object
            .remove(TIMESTAMP_KEY)
            .and_then(|raw| parse_timestamp(&raw).ok())
            .unwrap_or_else(Utc::now);

        let raw_fields = object
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(v)))
            .collect();

        Ok(Self::new(integration_id, timestamp, raw_fields))
    }
}

fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, String> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("not an RFC 3339 timestamp ({})", e)),
        Value::Number(n) => {
            let parsed = match n.as_i64() {
                Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0),
                None => n.as_f64().and_then(|secs| {
                    let mut whole = secs.floor();
                    let mut nanos = ((secs - whole) * 1e9).round();
                    // A fraction that rounds up to a full second carries over.
                    if nanos >= 1e9 {
                        whole += 1.0;
                        nanos -= 1e9;
                    }
                    DateTime::<Utc>::from_timestamp(whole as i64, nanos as u32)
                }),
            };
            parsed.ok_or_else(|| format!("epoch value {} is out of range", n))
        }
        other => Err(format!("expected a string or number, got {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_splits_identity_from_raw_fields() {
        let event = FailureEvent::from_json(json!({
            "integration_id": "stripe",
            "timestamp": "2024-05-01T12:00:00Z",
            "error_code": 401,
            "latency_ms": 12.5,
            "region": "eu",
            "degraded": true,
            "detail": {"retry": 3},
            "note": null
        }))
        .expect("valid event");

        assert_eq!(event.integration_id, "stripe");
        assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(event.field("error_code"), Some(&FieldValue::Int(401)));
        assert_eq!(event.field("latency_ms"), Some(&FieldValue::Float(12.5)));
        assert_eq!(event.field("region"), Some(&FieldValue::Text("eu".into())));
        assert_eq!(event.field("degraded"), Some(&FieldValue::Bool(true)));
        assert_eq!(event.field("note"), Some(&FieldValue::Null));
        assert!(matches!(
            event.field("detail"),
            Some(FieldValue::Structured(_))
        ));
        assert!(event.field("integration_id").is_none());
        assert!(event.field("timestamp").is_none());
    }

    #[test]
    fn from_json_accepts_epoch_seconds() {
        let event = FailureEvent::from_json(json!({
            "integration_id": "slack",
            "timestamp": 1_700_000_000
        }))
        .expect("valid event");
        assert_eq!(event.timestamp.timestamp(), 1_700_000_000);
        assert!(event.raw_fields.is_empty());
    }

    #[test]
    fn fractional_epoch_rounding_carries_into_next_second() {
        let ts = parse_timestamp(&json!(1.9999999999)).expect("in range");
        assert_eq!(ts.timestamp(), 2);
        assert_eq!(ts.timestamp_subsec_nanos(), 0);

        let ts = parse_timestamp(&json!(1.25)).expect("in range");
        assert_eq!(ts.timestamp(), 1);
        assert_eq!(ts.timestamp_subsec_nanos(), 250_000_000);
    }

    #[test]
    fn from_json_rejects_missing_identity() {
        let err = FailureEvent::from_json(json!({"timestamp": "2024-05-01T12:00:00Z"}))
            .unwrap_err();
        assert!(matches!(err, EventError::MissingField("integration_id")));

        let err = FailureEvent::from_json(json!({"integration_id": "x"})).unwrap_err();
        assert!(matches!(err, EventError::MissingField("timestamp")));

        let err = FailureEvent::from_json(json!({
            "integration_id": "x",
            "timestamp": "yesterday"
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            EventError::InvalidField {
                field: "timestamp",
                ..
            }
        ));

        assert!(matches!(
            FailureEvent::from_json(json!([1, 2])).unwrap_err(),
            EventError::NotAnObject
        ));
    }

    #[test]
    fn from_payload_uses_supplied_integration_id() {
        let event = FailureEvent::from_payload(
            "github",
            json!({"integration_id": "spoofed", "status_code": 503}),
        )
        .expect("valid payload");
        assert_eq!(event.integration_id, "github");
        assert_eq!(event.field("status_code"), Some(&FieldValue::Int(503)));
        assert!(event.field("integration_id").is_none());
    }

    #[test]
    fn serializes_flat() {
        let event = FailureEvent::from_json(json!({
            "integration_id": "stripe",
            "timestamp": "2024-05-01T12:00:00Z",
            "error_code": 401
        }))
        .unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["integration_id"], "stripe");
        assert_eq!(value["error_code"], 401);
    }
}
