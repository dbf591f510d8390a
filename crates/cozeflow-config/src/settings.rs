//! Settings for the upstream adapters and the execution tracker.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top level settings.
///
/// Every field has a default, so a settings file only needs to carry the
/// values it overrides:
///
/// ```json
/// { "poll_interval_ms": 5000, "defaults": { "style": "吉卜力" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Base URL of the workflow orchestration service.
  pub workflow_base_url: String,
  /// Base URL of the draw/image service.
  pub draw_base_url: String,
  /// Base URL of the translation service.
  pub translate_base_url: String,
  /// Base URL of the text-to-speech service.
  pub speech_base_url: String,
  /// Interval between two status queries of an asynchronous execution.
  pub poll_interval_ms: u64,
  /// Timeout applied to every non-streaming upstream request.
  pub request_timeout_ms: u64,
  /// Upper bound on the length of the free text input, in characters.
  pub max_input_chars: usize,
  /// Fallback values for unsupplied request parameters.
  pub defaults: ParameterDefaults,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      workflow_base_url: "https://api.coze.cn".to_string(),
      draw_base_url: "https://grsai.dakka.com.cn".to_string(),
      translate_base_url: "https://api-free.deepl.com".to_string(),
      speech_base_url: "https://api.minimaxi.com".to_string(),
      poll_interval_ms: 15_000,
      request_timeout_ms: 60_000,
      max_input_chars: 10_000,
      defaults: ParameterDefaults::default(),
    }
  }
}

impl Settings {
  /// Load settings from a JSON file.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      message: e.to_string(),
    })
  }

  /// Load settings from `path` if it exists, defaults otherwise.
  pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      Self::from_file(path)
    } else {
      Ok(Self::default())
    }
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_millis(self.request_timeout_ms)
  }
}

/// Fallback values used when a request leaves a parameter out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterDefaults {
  pub workflow_id: String,
  pub voice_id: String,
  pub style: String,
  pub font: String,
  pub emotion: String,
  /// Maximum subtitle length passed to the workflow.
  pub max_len: u32,
  pub target_lang: String,
  /// Model used by the draw service.
  pub draw_model: String,
}

impl Default for ParameterDefaults {
  fn default() -> Self {
    Self {
      workflow_id: "7555704402121506826".to_string(),
      voice_id: "Chinese (Mandarin)_Mature_Woman".to_string(),
      style: "日本动漫".to_string(),
      font: "竹风体".to_string(),
      emotion: "neutral".to_string(),
      max_len: 23,
      target_lang: "中文".to_string(),
      draw_model: "nano-banana-fast".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{ "poll_interval_ms": 5000, "defaults": {{ "style": "吉卜力" }} }}"#
    )
    .unwrap();

    let settings = Settings::from_file(file.path()).unwrap();

    assert_eq!(settings.poll_interval(), Duration::from_secs(5));
    assert_eq!(settings.defaults.style, "吉卜力");
    assert_eq!(settings.defaults.max_len, 23);
    assert_eq!(settings.workflow_base_url, "https://api.coze.cn");
  }

  #[test]
  fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::from_file_or_default(&dir.path().join("config.json")).unwrap();
    assert_eq!(settings, Settings::default());
  }

  #[test]
  fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Settings::from_file(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
  }

  #[test]
  fn test_invalid_json_is_a_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    let err = Settings::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }
}
