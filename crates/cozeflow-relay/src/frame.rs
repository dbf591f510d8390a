//! Classification of decoded upstream frames.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::{RelayEvent, RelayFrame};

/// Upstream error code whose message is replaced by a fixed one.
pub const PARAMETER_ERROR_CODE: i64 = 5000;

/// The record carried by one `data:` line, as the workflow service sends it.
///
/// Every field is optional: the service omits whatever does not apply to the
/// event kind, and older runs send no `event` at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawStreamEvent {
  pub event: Option<String>,
  pub content: Option<Value>,
  pub code: Option<i64>,
  pub msg: Option<String>,
  pub error_code: Option<i64>,
  pub error_message: Option<String>,
  pub node_title: Option<String>,
  pub node_id: Option<String>,
  pub logid: Option<String>,
  pub interrupt_data: Option<Value>,
}

impl RawStreamEvent {
  /// Read the known fields of a decoded record.
  ///
  /// Fields are read one by one so that an oddly typed field never hides the
  /// `event` discriminator: numbers are accepted where text is expected and
  /// numeric text where a number is expected. Anything else counts as absent.
  pub fn from_record(record: &Map<String, Value>) -> Self {
    let text = |key: &str| record.get(key).and_then(lenient_text);
    let int = |key: &str| record.get(key).and_then(lenient_int);
    let value = |key: &str| record.get(key).filter(|v| !v.is_null()).cloned();

    Self {
      event: text("event"),
      content: value("content"),
      code: int("code"),
      msg: text("msg"),
      error_code: int("error_code"),
      error_message: text("error_message"),
      node_title: text("node_title"),
      node_id: text("node_id"),
      logid: text("logid"),
      interrupt_data: value("interrupt_data"),
    }
  }
}

fn lenient_text(value: &Value) -> Option<String> {
  match value {
    Value::String(text) => Some(text.clone()),
    Value::Number(number) => Some(number.to_string()),
    Value::Bool(flag) => Some(flag.to_string()),
    _ => None,
  }
}

fn lenient_int(value: &Value) -> Option<i64> {
  match value {
    Value::Number(number) => number.as_i64(),
    Value::String(text) => text.trim().parse().ok(),
    _ => None,
  }
}

/// One upstream frame, classified by its `event` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
  /// Output of a workflow node.
  Message {
    content: Option<String>,
    node_title: Option<String>,
    node_id: Option<String>,
    logid: Option<String>,
  },

  /// The run failed. Terminal.
  Error {
    error_code: Option<i64>,
    error_message: Option<String>,
    code: Option<i64>,
    msg: Option<String>,
    logid: Option<String>,
  },

  /// The run finished. Terminal.
  Done { logid: Option<String> },

  /// The run stopped to wait for input. Terminal.
  Interrupt {
    interrupt_data: Option<String>,
    logid: Option<String>,
  },

  /// Unknown or missing `event`; content is forwarded if there is any.
  Unclassified {
    content: Option<String>,
    logid: Option<String>,
  },

  /// The payload was not a decodable record.
  Malformed { raw: String },
}

impl UpstreamFrame {
  /// Decode and classify the payload of one `data:` line.
  pub fn parse(payload: &str) -> Self {
    match serde_json::from_str::<Value>(payload) {
      Ok(Value::Object(record)) => Self::from(RawStreamEvent::from_record(&record)),
      _ => UpstreamFrame::Malformed {
        raw: payload.to_string(),
      },
    }
  }

  /// Whether nothing may be relayed after this frame.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      UpstreamFrame::Error { .. } | UpstreamFrame::Done { .. } | UpstreamFrame::Interrupt { .. }
    )
  }

  /// The frame to show the client, if this one produces any.
  pub fn into_relay_frame(self) -> Option<RelayFrame> {
    match self {
      UpstreamFrame::Message {
        content,
        node_title,
        node_id,
        logid,
      } => Some(RelayFrame {
        content: content?,
        event: Some(RelayEvent::Message),
        node_title,
        node_id,
        logid,
        error_code: None,
      }),

      UpstreamFrame::Error {
        error_code,
        error_message,
        code,
        msg,
        logid,
      } => Some(RelayFrame {
        content: describe_error(error_code, error_message.as_deref(), code, msg.as_deref()),
        event: Some(RelayEvent::Error),
        error_code: error_code.filter(|c| *c != 0).or(code),
        logid,
        ..RelayFrame::default()
      }),

      UpstreamFrame::Done { logid } => Some(RelayFrame {
        content: "workflow completed".to_string(),
        event: Some(RelayEvent::Done),
        logid,
        ..RelayFrame::default()
      }),

      UpstreamFrame::Interrupt {
        interrupt_data,
        logid,
      } => Some(RelayFrame {
        content: format!(
          "workflow interrupted: {}",
          interrupt_data.as_deref().unwrap_or("unknown reason")
        ),
        event: Some(RelayEvent::Interrupt),
        logid,
        ..RelayFrame::default()
      }),

      UpstreamFrame::Unclassified { content, logid } => Some(RelayFrame {
        content: content?,
        logid,
        ..RelayFrame::default()
      }),

      UpstreamFrame::Malformed { raw } => {
        if raw.trim().is_empty() {
          None
        } else {
          Some(RelayFrame {
            content: raw,
            ..RelayFrame::default()
          })
        }
      }
    }
  }
}

impl From<RawStreamEvent> for UpstreamFrame {
  fn from(raw: RawStreamEvent) -> Self {
    let content = raw.content.and_then(into_text);

    match raw.event.as_deref() {
      Some("Message") => UpstreamFrame::Message {
        content,
        node_title: raw.node_title,
        node_id: raw.node_id,
        logid: raw.logid,
      },
      Some("Error") => UpstreamFrame::Error {
        error_code: raw.error_code,
        error_message: raw.error_message,
        code: raw.code,
        msg: raw.msg,
        logid: raw.logid,
      },
      Some("Done") => UpstreamFrame::Done { logid: raw.logid },
      Some("Interrupt") => UpstreamFrame::Interrupt {
        interrupt_data: raw.interrupt_data.and_then(into_text),
        logid: raw.logid,
      },
      _ => UpstreamFrame::Unclassified {
        content,
        logid: raw.logid,
      },
    }
  }
}

/// Human readable message for an error frame.
///
/// A dedicated `error_code` wins over the generic result `code`.
fn describe_error(
  error_code: Option<i64>,
  error_message: Option<&str>,
  code: Option<i64>,
  msg: Option<&str>,
) -> String {
  if error_code == Some(PARAMETER_ERROR_CODE) {
    return "parameter error".to_string();
  }

  let or_unknown = |text: Option<&str>| {
    text
      .filter(|t| !t.is_empty())
      .unwrap_or("unknown error")
      .to_string()
  };

  match (error_code, code) {
    (Some(error_code), _) => format!("error ({}): {}", error_code, or_unknown(error_message)),
    (None, Some(code)) if code != 0 => format!("call failed ({}): {}", code, or_unknown(msg)),
    _ => "an unknown error occurred".to_string(),
  }
}

/// Strings pass through, other JSON values keep their JSON text. Empty
/// strings and nulls count as absent.
fn into_text(value: Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) if s.is_empty() => None,
    Value::String(s) => Some(s),
    other => Some(other.to_string()),
  }
}
