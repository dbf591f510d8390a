//! Normalization of the run-history `data` field.
//!
//! Depending on the endpoint version the service sends the execution detail as
//! a JSON-encoded string, as an object, or as a list whose first element is
//! the real record. [`DetailPayload`] names the three shapes so they can be
//! matched exhaustively before anything looks at the status.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why a `data` field could not be turned into an [`ExecutionDetail`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetailError {
  #[error("response carried no execution detail")]
  Missing,

  #[error("execution detail is not valid JSON: {message}")]
  InvalidJson { message: String },

  #[error("execution detail list is empty")]
  EmptyList,

  #[error("execution detail has unexpected shape: {kind}")]
  UnexpectedShape { kind: &'static str },
}

/// The shapes the `data` field comes in.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailPayload {
  Encoded(String),
  Record(Map<String, Value>),
  List(Vec<Value>),
}

impl DetailPayload {
  pub fn classify(value: Value) -> Result<Self, DetailError> {
    match value {
      Value::String(s) => Ok(DetailPayload::Encoded(s)),
      Value::Object(map) => Ok(DetailPayload::Record(map)),
      Value::Array(items) => Ok(DetailPayload::List(items)),
      Value::Null => Err(DetailError::Missing),
      Value::Bool(_) => Err(DetailError::UnexpectedShape { kind: "boolean" }),
      Value::Number(_) => Err(DetailError::UnexpectedShape { kind: "number" }),
    }
  }

  /// Resolve to the underlying record.
  ///
  /// An encoded string is decoded once and classified again; a list yields
  /// its first element.
  pub fn into_record(self) -> Result<Map<String, Value>, DetailError> {
    match self {
      DetailPayload::Record(map) => Ok(map),
      DetailPayload::List(items) => match items.into_iter().next() {
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Array(_)) => Err(DetailError::UnexpectedShape {
          kind: "nested list",
        }),
        Some(_) => Err(DetailError::UnexpectedShape {
          kind: "list of scalars",
        }),
        None => Err(DetailError::EmptyList),
      },
      DetailPayload::Encoded(text) => {
        let decoded: Value =
          serde_json::from_str(&text).map_err(|e| DetailError::InvalidJson {
            message: e.to_string(),
          })?;
        match DetailPayload::classify(decoded)? {
          DetailPayload::Encoded(_) => Err(DetailError::UnexpectedShape {
            kind: "doubly encoded string",
          }),
          inner => inner.into_record(),
        }
      }
    }
  }
}

/// Normalize a `data` field into one execution detail record.
pub fn normalize_detail(data: Option<&Value>) -> Result<ExecutionDetail, DetailError> {
  let value = data.cloned().ok_or(DetailError::Missing)?;
  let record = DetailPayload::classify(value)?.into_record()?;
  Ok(ExecutionDetail::from_record(record))
}

/// Status of an asynchronous run as reported by the service.
///
/// `Unknown` stands for an absent or non-text status and is not terminal; it
/// serializes as `null`. Any other status text, including the word
/// `Unknown`, is terminal unless it is `Running`, so that a run with an
/// unexpected status cannot poll forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ExecutionStatus {
  Running,
  Success,
  Failed,
  Unknown,
  Other(String),
}

impl ExecutionStatus {
  pub fn from_value(value: Option<&Value>) -> Self {
    match value {
      Some(Value::String(text)) => ExecutionStatus::from(text.clone()),
      _ => ExecutionStatus::Unknown,
    }
  }

  /// Whether polling should stop on this status.
  pub fn is_terminal(&self) -> bool {
    !matches!(self, ExecutionStatus::Running | ExecutionStatus::Unknown)
  }

  pub fn as_str(&self) -> &str {
    match self {
      ExecutionStatus::Running => "Running",
      ExecutionStatus::Success => "Success",
      ExecutionStatus::Failed => "Fail",
      ExecutionStatus::Unknown => "Unknown",
      ExecutionStatus::Other(text) => text,
    }
  }
}

impl From<String> for ExecutionStatus {
  fn from(text: String) -> Self {
    match text.as_str() {
      "Running" => ExecutionStatus::Running,
      "Success" => ExecutionStatus::Success,
      "Fail" | "Failed" => ExecutionStatus::Failed,
      _ => ExecutionStatus::Other(text),
    }
  }
}

impl From<Option<String>> for ExecutionStatus {
  fn from(text: Option<String>) -> Self {
    text.map_or(ExecutionStatus::Unknown, ExecutionStatus::from)
  }
}

impl From<ExecutionStatus> for Option<String> {
  fn from(status: ExecutionStatus) -> Self {
    match status {
      ExecutionStatus::Unknown => None,
      other => Some(other.as_str().to_string()),
    }
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One execution detail record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionDetail {
  pub status: ExecutionStatus,
  /// The raw `execute_status` value, kept for the projection.
  pub raw_status: Option<Value>,
  pub output: Option<Value>,
  pub error_message: Option<String>,
  /// Every other field of the record.
  pub fields: Map<String, Value>,
}

impl ExecutionDetail {
  pub fn from_record(mut record: Map<String, Value>) -> Self {
    let raw_status = record.remove("execute_status");
    let output = record.remove("output");
    let error_message = match record.get("error_message") {
      Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
      _ => None,
    };

    Self {
      status: ExecutionStatus::from_value(raw_status.as_ref()),
      raw_status,
      output,
      error_message,
      fields: record,
    }
  }

  /// Reduce to the fields kept for display.
  pub fn projection(&self) -> ResultProjection {
    let execute_status = match &self.raw_status {
      Some(Value::String(text)) => text.clone(),
      _ => self.status.to_string(),
    };
    ResultProjection {
      execute_status,
      output: self.output.clone(),
    }
  }
}

/// The part of a finished run that is kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultProjection {
  pub execute_status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
}
