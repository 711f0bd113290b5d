//! Classification of raw upstream payloads.
//!
//! The portal answers HTTP 200 for almost everything. A body may be the real
//! document, the document wrapped in one or more `data` envelopes, or a
//! logical error (`status_cd: "0"` plus a message or an `error` object). One
//! specific "error" (no data or no document found) is a legitimate empty
//! result and is kept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that describe an envelope rather than the document inside it.
const META_KEYS: &[&str] = &[
  "code",
  "message",
  "status",
  "data",
  "ret_period",
  "gstin",
  "timestamp",
  "transaction_id",
  "status_cd",
  "status_desc",
  "chksum",
];

/// Lowercased fragments that turn a `status_cd: "0"` response into an empty
/// (but valid) result.
const NO_RECORDS_MARKERS: &[&str] = &["no data found", "no document found"];

/// A logical error embedded in an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalError {
  pub code:    Option<String>,
  pub message: String,
}

impl std::fmt::Display for PortalError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.code {
      Some(code) => write!(f, "{} ({code})", self.message),
      None => f.write_str(&self.message),
    }
  }
}

/// One step of payload inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  /// An object whose only substantial content is a nested `data` value.
  RawEnvelope(Map<String, Value>),
  /// The document itself (possibly a valid "no records" marker).
  Unwrapped(Value),
  /// A logical error; never cached.
  Error(PortalError),
}

impl Payload {
  /// Inspect a single level of `value`.
  pub fn classify(value: Value) -> Self {
    if let Some(err) = logical_error(&value) {
      return Self::Error(err);
    }
    match value {
      Value::Object(map) if is_envelope(&map) => Self::RawEnvelope(map),
      other => Self::Unwrapped(other),
    }
  }

  /// Peel envelopes until the document is reached, validating every level.
  pub fn unwrap_all(value: Value) -> Result<Value, PortalError> {
    let mut current = value;
    loop {
      match Self::classify(current) {
        Self::Error(err) => return Err(err),
        Self::Unwrapped(doc) => return Ok(doc),
        Self::RawEnvelope(mut map) => {
          current = map.remove("data").unwrap_or(Value::Null);
        }
      }
    }
  }
}

/// `Some` when `value` carries an embedded error that is not the benign
/// "no records" case.
pub fn logical_error(value: &Value) -> Option<PortalError> {
  let map = value.as_object()?;

  let error_obj = map.get("error").and_then(Value::as_object);
  let message = map
    .get("message")
    .and_then(value_text)
    .filter(|m| !m.is_empty())
    .or_else(|| error_obj.and_then(|e| e.get("message")).and_then(value_text))
    .unwrap_or_default();
  let code = error_obj
    .and_then(|e| e.get("error_cd").or_else(|| e.get("code")))
    .and_then(value_text);

  let status_zero = map.get("status_cd").is_some_and(is_zero);
  if status_zero && is_no_records_message(&message) {
    return None;
  }

  let has_error = map.get("error").is_some_and(|e| !e.is_null());
  let failed = status_zero
    || has_error
    || map.get("status").and_then(Value::as_str) == Some("error")
    || map.get("success") == Some(&Value::Bool(false));

  failed.then(|| PortalError {
    code,
    message: if message.is_empty() {
      "upstream reported an error without a message".to_owned()
    } else {
      message
    },
  })
}

/// Whether `value` is the benign "no data/document found" marker.
pub fn is_no_records(value: &Value) -> bool {
  let Some(map) = value.as_object() else {
    return false;
  };
  if !map.get("status_cd").is_some_and(is_zero) {
    return false;
  }
  let message = map
    .get("message")
    .and_then(value_text)
    .or_else(|| {
      map
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(value_text)
    })
    .unwrap_or_default();
  is_no_records_message(&message)
}

fn is_envelope(map: &Map<String, Value>) -> bool {
  matches!(map.get("data"), Some(Value::Array(_) | Value::Object(_)))
    && map.keys().all(|k| META_KEYS.contains(&k.as_str()))
}

fn is_no_records_message(message: &str) -> bool {
  let lower = message.to_lowercase();
  NO_RECORDS_MARKERS.iter().any(|m| lower.contains(m))
}

fn is_zero(v: &Value) -> bool {
  match v {
    Value::String(s) => s.trim() == "0",
    Value::Number(n) => n.as_i64() == Some(0),
    _ => false,
  }
}

fn value_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}
