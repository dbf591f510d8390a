//! Upstream adapters for cozeflow.
//!
//! Each adapter turns a loosely-typed parameter bag into a fully-formed upstream
//! request, validates what can be validated before touching the network, and
//! issues exactly one HTTP call per operation. Non-2xx responses are surfaced as
//! [`UpstreamError::Status`] carrying the upstream status code and raw body.
//!
//! # Services
//!
//! ```text
//! WorkflowClient   - stream_run / submit / run_history / verify_token
//! DrawClient       - draw / result / test_connection
//! TranslateClient  - translate / test_connection
//! SpeechClient     - synthesize / test_connection
//! ```

mod credential;
mod draw;
mod error;
mod http;
mod provider;
mod speech;
mod translate;
mod workflow;

pub use credential::{
  Credential, KEY_BYPASS, MIN_TOKEN_LEN, normalize_authorization, strip_bearer,
  validate_secondary_key,
};
pub use draw::{DRAW_MODELS, DrawClient, DrawEnvelope, DrawImage, DrawRequest, DrawResponse, DrawResult};
pub use error::UpstreamError;
pub use provider::Provider;
pub use speech::{
  AudioSetting, PronunciationDict, SpeechClient, SpeechRequest, SpeechResponse, VoiceModify,
  VoiceSetting,
};
pub use translate::{
  TRANSLATE_AUTH_SCHEME, TranslateClient, TranslateRequest, TranslateResponse, Translation,
  validate_translation_key,
};
pub use workflow::{
  PreparedRun, RunParameters, RunWorkflowBody, SubmitReceipt, WorkflowClient, WorkflowEnvelope,
  prepare_run,
};
