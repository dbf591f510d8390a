//! Client-facing frame encoding.

use serde::{Deserialize, Serialize};

/// The literal frame that ends every relay.
pub const TERMINATOR: &str = "data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayEvent {
  Message,
  Error,
  Done,
  Interrupt,
}

/// A normalized frame as sent to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayFrame {
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event: Option<RelayEvent>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logid: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_code: Option<i64>,
}

impl RelayFrame {
  /// A terminal error frame for failures on our side of the stream.
  pub fn error(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      event: Some(RelayEvent::Error),
      ..Self::default()
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(
      self.event,
      Some(RelayEvent::Error | RelayEvent::Done | RelayEvent::Interrupt)
    )
  }

  /// Encode as one `data: <json>` frame.
  pub fn to_sse(&self) -> String {
    // Only strings and integers, so serialization cannot fail.
    let json = serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"));
    format!("data: {}\n\n", json)
  }

  /// Content for human display: escape sequences unfolded, surrounding quotes
  /// removed and a marker prepended for terminal kinds.
  pub fn display_text(&self) -> String {
    let content = clean_content(&self.content);
    match self.event {
      Some(RelayEvent::Error) => format!("❌ {}", content),
      Some(RelayEvent::Done) => format!("✅ {}", content),
      Some(RelayEvent::Interrupt) => format!("⚠️ {}", content),
      Some(RelayEvent::Message) | None => content,
    }
  }
}

/// One item of the client-facing stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
  Frame(RelayFrame),
  Terminator,
}

impl ClientFrame {
  pub fn to_sse(&self) -> String {
    match self {
      ClientFrame::Frame(frame) => frame.to_sse(),
      ClientFrame::Terminator => TERMINATOR.to_string(),
    }
  }
}

/// Strip one leading and one trailing quote and unfold the escape sequences a
/// stringified payload leaves behind.
fn clean_content(content: &str) -> String {
  let is_quote = |c: char| c == '"' || c == '\'';

  let mut text = content;
  if let Some(rest) = text.strip_prefix(is_quote) {
    text = rest;
  }
  if let Some(rest) = text.strip_suffix(is_quote) {
    text = rest;
  }

  text
    .replace("\\n", "\n")
    .replace("\\t", "  ")
    .replace("\\\"", "\"")
    .replace("\\'", "'")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sse_encoding_omits_absent_fields() {
    let frame = RelayFrame {
      content: "A".into(),
      event: Some(RelayEvent::Message),
      node_id: Some("n1".into()),
      ..RelayFrame::default()
    };
    assert_eq!(
      frame.to_sse(),
      "data: {\"content\":\"A\",\"event\":\"Message\",\"nodeId\":\"n1\"}\n\n"
    );
    assert_eq!(ClientFrame::Terminator.to_sse(), "data: [DONE]\n\n");
  }

  #[test]
  fn test_error_code_wire_name() {
    let frame = RelayFrame {
      error_code: Some(5000),
      ..RelayFrame::error("parameter error")
    };
    assert!(frame.to_sse().contains("\"errorCode\":5000"));
    assert!(frame.is_terminal());
  }

  #[test]
  fn test_display_markers() {
    assert_eq!(RelayFrame::error("boom").display_text(), "❌ boom");

    let done = RelayFrame {
      content: "workflow completed".into(),
      event: Some(RelayEvent::Done),
      ..RelayFrame::default()
    };
    assert_eq!(done.display_text(), "✅ workflow completed");

    let untagged = RelayFrame {
      content: "plain".into(),
      ..RelayFrame::default()
    };
    assert_eq!(untagged.display_text(), "plain");
  }

  #[test]
  fn test_display_unfolds_escapes() {
    let frame = RelayFrame {
      content: r#""line one\nline two\tend \"quoted\" it\'s""#.into(),
      event: Some(RelayEvent::Message),
      ..RelayFrame::default()
    };
    assert_eq!(
      frame.display_text(),
      "line one\nline two  end \"quoted\" it's"
    );
  }
}
