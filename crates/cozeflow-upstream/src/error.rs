use crate::provider::Provider;

/// Errors that can occur while talking to an upstream service.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
  /// The bearer credential is missing or too short once its prefix is removed.
  #[error("invalid token format, please check your authorization token")]
  InvalidCredential,

  /// The draw service key does not look like `sk-` followed by 32 alphanumerics.
  #[error("draw service key has an invalid format")]
  InvalidSecondaryKey,

  /// A required field was not supplied.
  #[error("missing required field: {field}")]
  MissingField { field: String },

  /// A field was supplied with an unusable value.
  #[error("invalid input '{field}': {message}")]
  InvalidInput { field: String, message: String },

  /// The upstream answered with a non-2xx status.
  #[error("{provider} returned {status}: {body}")]
  Status {
    provider: Provider,
    status: u16,
    body: String,
  },

  /// The upstream answered 2xx but reported a failure in its envelope.
  #[error("{provider} rejected the request{}: {message}", code.map(|c| format!(" ({})", c)).unwrap_or_default())]
  Rejected {
    provider: Provider,
    code: Option<i64>,
    message: String,
    logid: Option<String>,
  },

  /// The request could not be sent or its body could not be read.
  #[error("{provider} request failed: {source}")]
  Transport {
    provider: Provider,
    #[source]
    source: reqwest::Error,
  },

  /// The upstream response body was not in the expected shape.
  #[error("invalid {provider} response: {message}")]
  Decode { provider: Provider, message: String },
}

impl UpstreamError {
  /// Whether the error was detected before any network call was made.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      UpstreamError::InvalidCredential
        | UpstreamError::InvalidSecondaryKey
        | UpstreamError::MissingField { .. }
        | UpstreamError::InvalidInput { .. }
    )
  }

  /// Upstream correlation id, when the error carries one.
  pub fn logid(&self) -> Option<&str> {
    match self {
      UpstreamError::Rejected { logid, .. } => logid.as_deref(),
      _ => None,
    }
  }

  pub(crate) fn missing(field: &str) -> Self {
    UpstreamError::MissingField {
      field: field.to_string(),
    }
  }

  pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
    UpstreamError::InvalidInput {
      field: field.to_string(),
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validation_classification() {
    assert!(UpstreamError::InvalidCredential.is_validation());
    assert!(UpstreamError::InvalidSecondaryKey.is_validation());
    assert!(UpstreamError::missing("prompt").is_validation());

    let status = UpstreamError::Status {
      provider: Provider::Workflow,
      status: 401,
      body: "unauthorized".to_string(),
    };
    assert!(!status.is_validation());
    assert_eq!(status.to_string(), "workflow service returned 401: unauthorized");
  }

  #[test]
  fn test_rejected_message_includes_code() {
    let err = UpstreamError::Rejected {
      provider: Provider::Workflow,
      code: Some(4000),
      message: "bad workflow".to_string(),
      logid: Some("log-1".to_string()),
    };
    assert_eq!(
      err.to_string(),
      "workflow service rejected the request (4000): bad workflow"
    );
    assert_eq!(err.logid(), Some("log-1"));
  }
}
