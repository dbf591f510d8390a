//! Workflow orchestration service adapter.

use std::time::Duration;

use bytes::Bytes;
use cozeflow_config::{ParameterDefaults, Settings, WorkflowRequest};
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::credential::{Credential, validate_secondary_key};
use crate::draw::DRAW_MODELS;
use crate::error::UpstreamError;
use crate::http::{build_client, endpoint, ensure_success, parse_base_url, read_json, transport};
use crate::provider::Provider;
use crate::translate::TRANSLATE_AUTH_SCHEME;

const PROVIDER: Provider = Provider::Workflow;

/// Parameters as the workflow expects them. Field names are part of the
/// published workflow and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
  #[serde(rename = "Bailian_API")]
  pub bailian_api: String,
  pub cumob_api: String,
  pub cumob_model: String,
  #[serde(rename = "DeepL_API")]
  pub deepl_api: String,
  #[serde(rename = "HD")]
  pub hd: bool,
  #[serde(rename = "MiniMax_API")]
  pub minimax_api: String,
  #[serde(rename = "MiniMax_GroupID")]
  pub minimax_group_id: String,
  #[serde(rename = "README")]
  pub readme: String,
  pub auto_expansion: bool,
  pub bmg_url: String,
  pub emotion: String,
  pub font: String,
  pub input: String,
  pub max_len: u32,
  pub style: String,
  pub target_lang: String,
  pub test_mode: bool,
  pub voice_id: String,
}

/// Body of a run request, streaming or asynchronous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWorkflowBody {
  pub workflow_id: String,
  pub parameters: RunParameters,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub is_async: bool,
}

/// A validated run, ready to be sent.
#[derive(Debug, Clone)]
pub struct PreparedRun {
  pub credential: Credential,
  pub body: RunWorkflowBody,
}

impl PreparedRun {
  pub fn workflow_id(&self) -> &str {
    &self.body.workflow_id
  }
}

/// Response envelope shared by the run and run-history endpoints.
///
/// `data` is left untyped: depending on the endpoint and the moment it is a
/// JSON-encoded string, an object, or a list holding the real payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEnvelope {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub execute_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub debug_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logid: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub msg: Option<String>,
}

impl WorkflowEnvelope {
  /// A result code of exactly 0 means the call succeeded.
  pub fn is_ok(&self) -> bool {
    self.code == Some(0)
  }
}

/// What the service hands back for an accepted asynchronous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
  pub execute_id: String,
  pub debug_url: Option<String>,
  pub logid: Option<String>,
  pub message: String,
}

/// Validate a request and fill in defaults, without any network access.
///
/// # Errors
/// - [`UpstreamError::InvalidCredential`] if the token is too short
/// - [`UpstreamError::InvalidSecondaryKey`] if the draw key is malformed
/// - [`UpstreamError::InvalidInput`] if the text input exceeds `max_input_chars`
///   or the draw model is not one the draw service accepts
pub fn prepare_run(
  request: &WorkflowRequest,
  raw_token: &str,
  defaults: &ParameterDefaults,
  max_input_chars: usize,
) -> Result<PreparedRun, UpstreamError> {
  let credential = Credential::parse(raw_token)?;

  if let Some(key) = non_empty(&request.cumob_api) {
    validate_secondary_key(key)?;
  }

  let cumob_model = or_default(&request.cumob_model, &defaults.draw_model);
  if !DRAW_MODELS.contains(&cumob_model.as_str()) {
    return Err(UpstreamError::invalid(
      "cumobModel",
      format!("supported models: {}", DRAW_MODELS.join(", ")),
    ));
  }

  let input = request.input_text.clone().unwrap_or_default();
  let input_chars = input.chars().count();
  if input_chars > max_input_chars {
    return Err(UpstreamError::invalid(
      "inputText",
      format!(
        "{} characters exceeds the limit of {}",
        input_chars, max_input_chars
      ),
    ));
  }

  let target_lang = match request.target_lang.as_ref().filter(|lang| !lang.is_empty()) {
    Some(lang) => lang.joined(),
    None => defaults.target_lang.clone(),
  };

  let deepl_api = match non_empty(&request.deepl_api) {
    Some(key) => format!("{} {}", TRANSLATE_AUTH_SCHEME, key),
    None => String::new(),
  };

  let parameters = RunParameters {
    bailian_api: or_empty(&request.bailian_api),
    cumob_api: or_empty(&request.cumob_api),
    cumob_model,
    deepl_api,
    hd: request.hd.unwrap_or(false),
    minimax_api: or_empty(&request.minimax_api),
    minimax_group_id: or_empty(&request.minimax_group_id),
    readme: String::new(),
    auto_expansion: request.auto_expansion.unwrap_or(false),
    bmg_url: String::new(),
    emotion: or_default(&request.emotion, &defaults.emotion),
    font: or_default(&request.font, &defaults.font),
    input,
    max_len: request.max_len.filter(|n| *n > 0).unwrap_or(defaults.max_len),
    style: or_default(&request.style, &defaults.style),
    target_lang,
    test_mode: request.test_mode.unwrap_or(false),
    voice_id: or_default(&request.voice_id, &defaults.voice_id),
  };

  Ok(PreparedRun {
    credential,
    body: RunWorkflowBody {
      workflow_id: or_default(&request.workflow_id, &defaults.workflow_id),
      parameters,
      is_async: false,
    },
  })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().filter(|v| !v.is_empty())
}

fn or_empty(value: &Option<String>) -> String {
  value.clone().unwrap_or_default()
}

fn or_default(value: &Option<String>, default: &str) -> String {
  non_empty(value).unwrap_or(default).to_string()
}

/// Client for the workflow orchestration service.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
  http: Client,
  base_url: Url,
  defaults: ParameterDefaults,
  max_input_chars: usize,
  timeout: Duration,
}

impl WorkflowClient {
  pub fn new(settings: &Settings) -> Result<Self, UpstreamError> {
    Ok(Self {
      http: build_client(PROVIDER)?,
      base_url: parse_base_url("workflow_base_url", &settings.workflow_base_url)?,
      defaults: settings.defaults.clone(),
      max_input_chars: settings.max_input_chars,
      timeout: settings.request_timeout(),
    })
  }

  /// Validate a request against this client's defaults and limits.
  pub fn prepare(
    &self,
    request: &WorkflowRequest,
    raw_token: &str,
  ) -> Result<PreparedRun, UpstreamError> {
    prepare_run(request, raw_token, &self.defaults, self.max_input_chars)
  }

  /// Start a streaming run and hand back the raw response body.
  ///
  /// The body is a sequence of `data: <json>` frames; see `cozeflow-relay`.
  #[instrument(name = "workflow_stream_run", skip_all, fields(workflow_id = %run.workflow_id()))]
  pub async fn stream_run(
    &self,
    run: &PreparedRun,
  ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, UpstreamError> {
    let url = endpoint(&self.base_url, "/v1/workflow/stream_run")?;
    let mut body = run.body.clone();
    body.is_async = false;

    debug!(url = %url, "sending streaming run request");

    let response = self
      .http
      .post(url)
      .header(reqwest::header::AUTHORIZATION, run.credential.header_value())
      .json(&body)
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    info!("stream_opened");
    Ok(response.bytes_stream())
  }

  /// Submit an asynchronous run.
  ///
  /// # Errors
  /// Besides transport and status errors, a 2xx answer with a non-zero code or
  /// without an execution id is reported as [`UpstreamError::Rejected`].
  #[instrument(name = "workflow_submit", skip_all, fields(workflow_id = %run.workflow_id()))]
  pub async fn submit(&self, run: &PreparedRun) -> Result<SubmitReceipt, UpstreamError> {
    let url = endpoint(&self.base_url, "/v1/workflow/run")?;
    let mut body = run.body.clone();
    body.is_async = true;

    let response = self
      .http
      .post(url)
      .timeout(self.timeout)
      .header(reqwest::header::AUTHORIZATION, run.credential.header_value())
      .json(&body)
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    let envelope: WorkflowEnvelope = read_json(PROVIDER, response).await?;
    let receipt = receipt_from_envelope(envelope)?;

    info!(
      execute_id = %receipt.execute_id,
      logid = ?receipt.logid,
      "execution_submitted"
    );
    Ok(receipt)
  }

  /// Query the status of one asynchronous run.
  #[instrument(name = "workflow_run_history", skip(self, credential))]
  pub async fn run_history(
    &self,
    credential: &Credential,
    workflow_id: &str,
    execute_id: &str,
  ) -> Result<WorkflowEnvelope, UpstreamError> {
    let url = endpoint(
      &self.base_url,
      &format!("/v1/workflows/{}/run_histories/{}", workflow_id, execute_id),
    )?;

    let response = self
      .http
      .get(url)
      .timeout(self.timeout)
      .header(reqwest::header::AUTHORIZATION, credential.header_value())
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    read_json(PROVIDER, response).await
  }

  /// Check a credential against the profile endpoint.
  pub async fn verify_token(
    &self,
    credential: &Credential,
  ) -> Result<serde_json::Value, UpstreamError> {
    let url = endpoint(&self.base_url, "/v1/user/profile")?;

    let response = self
      .http
      .get(url)
      .timeout(self.timeout)
      .header(reqwest::header::AUTHORIZATION, credential.header_value())
      .send()
      .await
      .map_err(transport(PROVIDER))?;

    let response = ensure_success(PROVIDER, response).await?;
    read_json(PROVIDER, response).await
  }
}

fn receipt_from_envelope(envelope: WorkflowEnvelope) -> Result<SubmitReceipt, UpstreamError> {
  let rejected = |message: String, envelope: &WorkflowEnvelope| UpstreamError::Rejected {
    provider: PROVIDER,
    code: envelope.code,
    message,
    logid: envelope.logid.clone(),
  };

  if matches!(envelope.code, Some(code) if code != 0) {
    let message = envelope
      .msg
      .clone()
      .unwrap_or_else(|| "workflow submission failed".to_string());
    return Err(rejected(message, &envelope));
  }

  match envelope.execute_id.clone().filter(|id| !id.is_empty()) {
    Some(execute_id) => Ok(SubmitReceipt {
      execute_id,
      debug_url: envelope.debug_url,
      logid: envelope.logid,
      message: envelope
        .msg
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "workflow submitted".to_string()),
    }),
    None => Err(rejected(
      "response carried no execute_id".to_string(),
      &envelope,
    )),
  }
}
