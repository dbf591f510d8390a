use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Shown when the image status list is present but empty.
pub const NO_IMAGE_STATUS: &str = "no image status";

const OUTER_LEVEL: &str = "output";
const INNER_LEVEL: &str = "output.Output";

/// Display fields decoded from the innermost level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputContent {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub introduction: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_status: Option<String>,
  /// The output with list items joined by `", "`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,
  /// The output split on commas, one trimmed item per line.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub output_lines: Vec<String>,
}

impl OutputContent {
  /// Text for the clipboard: one output item per line.
  pub fn clipboard_text(&self) -> Option<String> {
    self.output.as_ref().map(|_| self.output_lines.join("\n"))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProjectedBody {
  /// Every level decoded.
  Content(OutputContent),
  /// A level failed; this is the nearest level that decoded, as text.
  Opaque(String),
  /// The run produced no output.
  Empty,
}

/// What is shown for a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedResult {
  pub execute_status: String,
  pub body: ProjectedBody,
  /// Why decoding stopped early, if it did.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub degraded: Option<String>,
}

impl ProjectedResult {
  /// Plain text rendering, one labelled field per block.
  pub fn render_text(&self) -> String {
    let mut out = format!("status: {}\n", self.execute_status);
    match &self.body {
      ProjectedBody::Content(content) => {
        if let Some(introduction) = &content.introduction {
          out.push_str(&format!("introduction: {}\n", introduction));
        }
        if let Some(image_status) = &content.image_status {
          out.push_str(&format!("image status: {}\n", image_status));
        }
        if content.output.is_some() {
          out.push_str("output:\n");
          for line in &content.output_lines {
            out.push_str(&format!("  {}\n", line));
          }
        }
      }
      ProjectedBody::Opaque(text) => {
        out.push_str(&format!("output: {}\n", text));
      }
      ProjectedBody::Empty => {}
    }
    out
  }
}

/// Project a finished run's status and output for display.
pub fn project(execute_status: &str, output: Option<&Value>) -> ProjectedResult {
  let (body, degraded) = match project_body(output) {
    Ok(body) => (body, None),
    Err((fallback, e)) => (fallback, Some(e.to_string())),
  };
  ProjectedResult {
    execute_status: execute_status.to_string(),
    body,
    degraded,
  }
}

fn project_body(output: Option<&Value>) -> Result<ProjectedBody, (ProjectedBody, DecodeError)> {
  let output = match output {
    None | Some(Value::Null) => return Ok(ProjectedBody::Empty),
    Some(Value::String(text)) if text.is_empty() => return Ok(ProjectedBody::Empty),
    Some(value) => value,
  };

  let outer = decode_object(output, OUTER_LEVEL).map_err(|e| (opaque(output), e))?;

  let inner_raw = outer
    .get("Output")
    .filter(|v| !v.is_null())
    .ok_or(DecodeError::Missing { level: INNER_LEVEL })
    .map_err(|e| (ProjectedBody::Opaque(Value::Object(outer.clone()).to_string()), e))?;

  let inner = decode_object(inner_raw, INNER_LEVEL).map_err(|e| (opaque(inner_raw), e))?;

  Ok(ProjectedBody::Content(content_from(&inner)))
}

/// Decode one level: text is parsed as JSON, an object is taken as is.
fn decode_object(value: &Value, level: &'static str) -> Result<Map<String, Value>, DecodeError> {
  let decoded = match value {
    Value::String(text) => serde_json::from_str(text).map_err(|e| DecodeError::Json {
      level,
      message: e.to_string(),
    })?,
    other => other.clone(),
  };

  match decoded {
    Value::Object(map) => Ok(map),
    _ => Err(DecodeError::NotAnObject { level }),
  }
}

fn content_from(inner: &Map<String, Value>) -> OutputContent {
  let introduction = inner.get("Introduction").and_then(joined);

  let image_status = match inner.get("image_status_list") {
    Some(Value::Array(items)) if items.is_empty() => Some(NO_IMAGE_STATUS.to_string()),
    Some(value) => joined(value),
    None => None,
  };

  let output = inner.get("output").and_then(joined);
  let output_lines = output
    .as_deref()
    .map(|text| text.split(',').map(|line| line.trim().to_string()).collect())
    .unwrap_or_default();

  OutputContent {
    introduction,
    image_status,
    output,
    output_lines,
  }
}

/// Lists are joined with `", "`. Null and empty text count as absent.
fn joined(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(text) if text.is_empty() => None,
    Value::Array(items) => Some(
      items
        .iter()
        .map(scalar_text)
        .collect::<Vec<_>>()
        .join(", "),
    ),
    other => Some(scalar_text(other)),
  }
}

fn scalar_text(value: &Value) -> String {
  match value {
    Value::String(text) => text.clone(),
    other => other.to_string(),
  }
}

fn opaque(value: &Value) -> ProjectedBody {
  ProjectedBody::Opaque(scalar_text(value))
}
