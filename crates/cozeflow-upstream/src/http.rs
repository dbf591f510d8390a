//! Shared HTTP plumbing for the adapters.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use crate::error::UpstreamError;
use crate::provider::Provider;

/// Build the HTTP client used by an adapter.
///
/// No total timeout is set on the client so that streaming bodies are not cut
/// off; non-streaming calls set one per request.
pub(crate) fn build_client(provider: Provider) -> Result<Client, UpstreamError> {
  Client::builder()
    .build()
    .map_err(|source| UpstreamError::Transport { provider, source })
}

/// Parse a configured base URL.
pub(crate) fn parse_base_url(field: &str, value: &str) -> Result<Url, UpstreamError> {
  Url::parse(value).map_err(|e| UpstreamError::invalid(field, e.to_string()))
}

/// Join `path` onto a base URL, keeping any path prefix the base carries.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, UpstreamError> {
  if base.cannot_be_a_base() {
    return Err(UpstreamError::invalid(
      "base_url",
      format!("'{}' cannot be a base URL", base),
    ));
  }

  let mut joined = base.clone();
  let prefix = base.path().trim_end_matches('/');
  joined.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
  Ok(joined)
}

/// Pass 2xx responses through, turn anything else into [`UpstreamError::Status`].
///
/// The raw body is kept verbatim so that upstream diagnostics reach the user.
pub(crate) async fn ensure_success(
  provider: Provider,
  response: Response,
) -> Result<Response, UpstreamError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let url = response.url().to_string();
  let body = match response.text().await {
    Ok(body) => body,
    Err(e) => format!("<unreadable body: {}>", e),
  };

  warn!(
    provider = %provider,
    status = status.as_u16(),
    url = %url,
    body = %body,
    "upstream_error_response"
  );

  Err(UpstreamError::Status {
    provider,
    status: status.as_u16(),
    body,
  })
}

/// Read a whole response body and decode it as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
  provider: Provider,
  response: Response,
) -> Result<T, UpstreamError> {
  let body = response
    .text()
    .await
    .map_err(|source| UpstreamError::Transport { provider, source })?;

  serde_json::from_str(&body).map_err(|e| UpstreamError::Decode {
    provider,
    message: format!("{} (body: {})", e, body),
  })
}

/// Map a send failure to [`UpstreamError::Transport`].
pub(crate) fn transport(provider: Provider) -> impl FnOnce(reqwest::Error) -> UpstreamError {
  move |source| UpstreamError::Transport { provider, source }
}
