//! The user-supplied parameter bag for a workflow run.

use serde::{Deserialize, Serialize};

/// Parameters entered by the user for one workflow submission.
///
/// Field names follow the form that produces them (camelCase, with the one
/// historical `test_mode` exception). Nothing here is validated; see the
/// upstream adapter for credential and key checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub input_text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub style: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub emotion: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub font: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_lang: Option<TargetLang>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub voice_id: Option<String>,
  /// Translation service key.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deepl_api: Option<String>,
  /// Speech service key.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub minimax_api: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub minimax_group_id: Option<String>,
  /// Draw service key, the "secondary key" checked before submission.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cumob_api: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cumob_model: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bailian_api: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auto_expansion: Option<bool>,
  #[serde(rename = "test_mode", skip_serializing_if = "Option::is_none")]
  pub test_mode: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hd: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_len: Option<u32>,
}

/// Target language selection: a single value or a multi-select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetLang {
  One(String),
  Many(Vec<String>),
}

impl TargetLang {
  /// The comma-joined form sent upstream.
  pub fn joined(&self) -> String {
    match self {
      TargetLang::One(lang) => lang.clone(),
      TargetLang::Many(langs) => langs.join(","),
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      TargetLang::One(lang) => lang.is_empty(),
      TargetLang::Many(langs) => langs.is_empty(),
    }
  }
}
