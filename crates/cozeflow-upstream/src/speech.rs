//! Text-to-speech service adapter.

use std::time::Duration;

use cozeflow_config::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::error::UpstreamError;
use crate::http::{build_client, endpoint, ensure_success, parse_base_url, read_json, transport};
use crate::provider::Provider;

const PROVIDER: Provider = Provider::Speech;

/// An asynchronous speech synthesis request.
///
/// Exactly one of `text` and `text_file_id` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
  #[serde(default)]
  pub model: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text_file_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub language_boost: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub voice_setting: Option<VoiceSetting>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pronunciation_dict: Option<PronunciationDict>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub audio_setting: Option<AudioSetting>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub voice_modify: Option<VoiceModify>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSetting {
  pub voice_id: String,
  pub speed: f32,
  pub vol: f32,
  pub pitch: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationDict {
  pub tone: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSetting {
  pub audio_sample_rate: u32,
  pub bitrate: u32,
  pub format: String,
  pub channel: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceModify {
  pub pitch: i32,
  pub intensity: i32,
  pub timbre: i32,
  pub sound_effects: String,
}

impl SpeechRequest {
  fn validate(&self) -> Result<(), UpstreamError> {
    if self.model.trim().is_empty() {
      return Err(UpstreamError::missing("model"));
    }
    let has_text = self.text.as_deref().is_some_and(|t| !t.is_empty());
    let has_file = self.text_file_id.as_deref().is_some_and(|t| !t.is_empty());
    match (has_text, has_file) {
      (false, false) => Err(UpstreamError::invalid(
        "text",
        "either text or text_file_id is required",
      )),
      (true, true) => Err(UpstreamError::invalid(
        "text",
        "cannot provide both text and text_file_id",
      )),
      _ => Ok(()),
    }
  }

  /// The fixed sample used to check that a key works.
  pub fn sample() -> Self {
    Self {
      model: "speech-2.5-hd-preview".to_string(),
      text: Some("微风拂过柔软的草地，清新的芳香伴随着鸟儿的歌唱。".to_string()),
      language_boost: Some("auto".to_string()),
      voice_setting: Some(VoiceSetting {
        voice_id: "audiobook_male_1".to_string(),
        speed: 1.0,
        vol: 10.0,
        pitch: 1,
      }),
      audio_setting: Some(AudioSetting {
        audio_sample_rate: 32_000,
        bitrate: 128_000,
        format: "mp3".to_string(),
        channel: 2,
      }),
      ..Default::default()
    }
  }
}

/// Response of the speech service. Only the common envelope is typed; the
/// task payload is passed through as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechResponse {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<serde_json::Value>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Client for the text-to-speech service.
#[derive(Debug, Clone)]
pub struct SpeechClient {
  http: Client,
  base_url: Url,
  timeout: Duration,
}

impl SpeechClient {
  pub fn new(settings: &Settings) -> Result<Self, UpstreamError> {
    Ok(Self {
      http: build_client(PROVIDER)?,
      base_url: parse_base_url("speech_base_url", &settings.speech_base_url)?,
      timeout: settings.request_timeout(),
    })
  }

  #[instrument(name = "speech_synthesize", skip_all, fields(model = %request.model))]
  pub async fn synthesize(
    &self,
    api_key: &str,
    request: &SpeechRequest,
  ) -> Result<SpeechResponse, UpstreamError> {
    if api_key.trim().is_empty() {
      return Err(UpstreamError::missing("api_key"));
    }
    request.validate()?;

    let url = endpoint(&self.base_url, "/v1/t2a_async_v2")?;
    let response = self
      .http
      .post(url)
      .timeout(self.timeout)
      .bearer_auth(api_key.trim())
      .json(request)
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    read_json(PROVIDER, response).await
  }

  pub async fn test_connection(&self, api_key: &str) -> Result<SpeechResponse, UpstreamError> {
    self.synthesize(api_key, &SpeechRequest::sample()).await
  }
}
