//! Translation service adapter.

use std::sync::LazyLock;
use std::time::Duration;

use cozeflow_config::Settings;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::UpstreamError;
use crate::http::{build_client, endpoint, ensure_success, parse_base_url, read_json, transport};
use crate::provider::Provider;

const PROVIDER: Provider = Provider::Translate;

/// Authorization scheme expected by the translation service.
pub const TRANSLATE_AUTH_SCHEME: &str = "DeepL-Auth-Key";

static TRANSLATION_KEY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[a-zA-Z0-9-]{36}:fx$").expect("translation key pattern is valid")
});

/// Check the shape of a free-tier translation key (`<36 chars>:fx`).
pub fn validate_translation_key(key: &str) -> Result<(), UpstreamError> {
  if TRANSLATION_KEY.is_match(key.trim()) {
    Ok(())
  } else {
    Err(UpstreamError::invalid(
      "deeplApi",
      "expected 36 letters, digits or dashes followed by ':fx'",
    ))
  }
}

/// A translation request. Optional fields are only sent when set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslateRequest {
  #[serde(default)]
  pub text: Vec<String>,
  #[serde(default)]
  pub target_lang: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_lang: Option<String>,
  /// `"0"`, `"1"` or `"nonewlines"`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub split_sentences: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preserve_formatting: Option<String>,
  /// `default`, `more`, `less`, `prefer_more` or `prefer_less`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub formality: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag_handling: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outline_detection: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub non_splitting_tags: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub splitting_tags: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ignore_tags: Option<Vec<String>>,
}

impl TranslateRequest {
  fn validate(&self) -> Result<(), UpstreamError> {
    if self.text.is_empty() {
      return Err(UpstreamError::invalid(
        "text",
        "text array is required and must not be empty",
      ));
    }
    if self.target_lang.trim().is_empty() {
      return Err(UpstreamError::missing("target_lang"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateResponse {
  pub translations: Vec<Translation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
  pub detected_source_language: String,
  pub text: String,
}

/// Client for the translation service.
#[derive(Debug, Clone)]
pub struct TranslateClient {
  http: Client,
  base_url: Url,
  timeout: Duration,
}

impl TranslateClient {
  pub fn new(settings: &Settings) -> Result<Self, UpstreamError> {
    Ok(Self {
      http: build_client(PROVIDER)?,
      base_url: parse_base_url("translate_base_url", &settings.translate_base_url)?,
      timeout: settings.request_timeout(),
    })
  }

  #[instrument(name = "translate", skip_all, fields(target_lang = %request.target_lang, texts = request.text.len()))]
  pub async fn translate(
    &self,
    api_key: &str,
    request: &TranslateRequest,
  ) -> Result<TranslateResponse, UpstreamError> {
    if api_key.trim().is_empty() {
      return Err(UpstreamError::missing("api_key"));
    }
    request.validate()?;

    let url = endpoint(&self.base_url, "/v2/translate")?;
    debug!(url = %url, "sending translation request");

    let response = self
      .http
      .post(url)
      .timeout(self.timeout)
      .header(
        reqwest::header::AUTHORIZATION,
        format!("{} {}", TRANSLATE_AUTH_SCHEME, api_key.trim()),
      )
      .json(request)
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    read_json(PROVIDER, response).await
  }

  /// Translate a fixed sentence to check that a key works.
  pub async fn test_connection(&self, api_key: &str) -> Result<TranslateResponse, UpstreamError> {
    let request = TranslateRequest {
      text: vec!["Hello world!".to_string()],
      target_lang: "DE".to_string(),
      ..Default::default()
    };
    self.translate(api_key, &request).await
  }
}
