//! Image generation service adapter.

use std::time::Duration;

use cozeflow_config::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::credential::strip_bearer;
use crate::error::UpstreamError;
use crate::http::{build_client, endpoint, ensure_success, parse_base_url, read_json, transport};
use crate::provider::Provider;

const PROVIDER: Provider = Provider::Draw;

/// Models the draw endpoint accepts.
pub const DRAW_MODELS: &[&str] = &["nano-banana-fast", "nano-banana"];

/// Webhook value that makes the service return a task id right away.
const POLL_FOR_RESULT: &str = "-1";

/// Envelope code the service uses when a task id is unknown.
const TASK_NOT_FOUND: i64 = -22;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawRequest {
  #[serde(default)]
  pub model: String,
  #[serde(default)]
  pub prompt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub aspect_ratio: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub urls: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub web_hook: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shut_progress: Option<bool>,
}

impl DrawRequest {
  fn validate(&self) -> Result<(), UpstreamError> {
    if self.model.is_empty() {
      return Err(UpstreamError::missing("model"));
    }
    if self.prompt.trim().is_empty() {
      return Err(UpstreamError::missing("prompt"));
    }
    if !DRAW_MODELS.contains(&self.model.as_str()) {
      return Err(UpstreamError::invalid(
        "model",
        format!("supported models: {}", DRAW_MODELS.join(", ")),
      ));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawImage {
  pub url: String,
  #[serde(default)]
  pub content: String,
}

/// State of a draw task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawResult {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub results: Vec<DrawImage>,
  /// 0 to 100.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress: Option<u8>,
  /// `running`, `succeeded` or `failed`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure_reason: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawEnvelope {
  pub code: i64,
  #[serde(default)]
  pub msg: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<DrawResult>,
}

/// The draw endpoint answers either with an envelope or with the task itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DrawResponse {
  Envelope(DrawEnvelope),
  Direct(DrawResult),
}

impl DrawResponse {
  /// The task id, wherever the service put it.
  pub fn task_id(&self) -> Option<&str> {
    match self {
      DrawResponse::Envelope(envelope) => envelope.data.as_ref()?.id.as_deref(),
      DrawResponse::Direct(result) => result.id.as_deref(),
    }
  }
}

/// Client for the image generation service.
#[derive(Debug, Clone)]
pub struct DrawClient {
  http: Client,
  base_url: Url,
  timeout: Duration,
}

impl DrawClient {
  pub fn new(settings: &Settings) -> Result<Self, UpstreamError> {
    Ok(Self {
      http: build_client(PROVIDER)?,
      base_url: parse_base_url("draw_base_url", &settings.draw_base_url)?,
      timeout: settings.request_timeout(),
    })
  }

  /// Submit a draw task.
  ///
  /// Without a webhook the service is asked to return a task id immediately,
  /// to be fetched later with [`DrawClient::result`].
  #[instrument(name = "draw_submit", skip_all, fields(model = %request.model))]
  pub async fn draw(&self, api_key: &str, request: &DrawRequest) -> Result<DrawResponse, UpstreamError> {
    let api_key = strip_bearer(api_key);
    if api_key.is_empty() {
      return Err(UpstreamError::missing("api_key"));
    }
    request.validate()?;

    let mut body = request.clone();
    if body.web_hook.as_deref().is_none_or(str::is_empty) {
      body.web_hook = Some(POLL_FOR_RESULT.to_string());
    }

    let url = endpoint(&self.base_url, "/v1/draw/nano-banana")?;
    debug!(url = %url, "sending draw request");

    let response = self
      .http
      .post(url)
      .timeout(self.timeout)
      .bearer_auth(api_key)
      .json(&body)
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    let response: DrawResponse = read_json(PROVIDER, response).await?;

    if let DrawResponse::Envelope(envelope) = &response {
      check_envelope(envelope)?;
    }
    info!(task_id = response.task_id().unwrap_or_default(), "draw_submitted");
    Ok(response)
  }

  /// Submit the smallest possible task to check that a key works.
  pub async fn test_connection(&self, api_key: &str) -> Result<DrawResponse, UpstreamError> {
    let request = DrawRequest {
      model: "nano-banana-fast".to_string(),
      prompt: "测试提示词".to_string(),
      aspect_ratio: Some("auto".to_string()),
      web_hook: Some(POLL_FOR_RESULT.to_string()),
      shut_progress: Some(false),
      ..Default::default()
    };
    self.draw(api_key, &request).await
  }

  /// Fetch the state of a draw task.
  #[instrument(name = "draw_result", skip(self, api_key))]
  pub async fn result(&self, api_key: &str, id: &str) -> Result<DrawEnvelope, UpstreamError> {
    let api_key = strip_bearer(api_key);
    if api_key.is_empty() {
      return Err(UpstreamError::missing("api_key"));
    }
    if id.trim().is_empty() {
      return Err(UpstreamError::missing("id"));
    }

    let url = endpoint(&self.base_url, "/v1/draw/result")?;
    let response = self
      .http
      .post(url)
      .timeout(self.timeout)
      .bearer_auth(api_key)
      .json(&serde_json::json!({ "id": id.trim() }))
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    let envelope: DrawEnvelope = read_json(PROVIDER, response).await?;
    check_envelope(&envelope)?;
    Ok(envelope)
  }
}

fn check_envelope(envelope: &DrawEnvelope) -> Result<(), UpstreamError> {
  if envelope.code == 0 {
    return Ok(());
  }

  let message = match (envelope.code, envelope.msg.is_empty()) {
    (TASK_NOT_FOUND, true) => "task not found".to_string(),
    (_, true) => "draw request failed".to_string(),
    (_, false) => envelope.msg.clone(),
  };
  Err(UpstreamError::Rejected {
    provider: PROVIDER,
    code: Some(envelope.code),
    message,
    logid: None,
  })
}
