//! Credential normalization and key format checks.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::UpstreamError;

/// Shortest accepted bearer token, counted after the prefix is stripped.
pub const MIN_TOKEN_LEN: usize = 10;

/// Literal draw service key that skips format validation.
pub const KEY_BYPASS: &str = "cozebackdoor";

static BEARER_PREFIX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)^Bearer\s+").expect("bearer prefix pattern is valid"));

static SECONDARY_KEY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^sk-[a-zA-Z0-9]{32}$").expect("secondary key pattern is valid"));

/// Remove one leading case-insensitive `Bearer ` prefix and surrounding whitespace.
pub fn strip_bearer(raw: &str) -> &str {
  let rest = match BEARER_PREFIX.find(raw) {
    Some(prefix) => &raw[prefix.end()..],
    None => raw,
  };
  rest.trim()
}

/// Build the `Authorization` header value for `raw`, with exactly one prefix.
///
/// Applying it to its own output gives the same value back.
pub fn normalize_authorization(raw: &str) -> String {
  format!("Bearer {}", strip_bearer(raw))
}

/// Check a draw service key.
///
/// [`KEY_BYPASS`] is accepted as is; anything else must match
/// `^sk-[a-zA-Z0-9]{32}$`.
pub fn validate_secondary_key(key: &str) -> Result<(), UpstreamError> {
  if key == KEY_BYPASS || SECONDARY_KEY.is_match(key) {
    Ok(())
  } else {
    Err(UpstreamError::InvalidSecondaryKey)
  }
}

/// A workflow service bearer credential, stored without its prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
  /// Normalize and validate a user supplied token.
  pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
    let token = strip_bearer(raw);
    if token.chars().count() < MIN_TOKEN_LEN {
      return Err(UpstreamError::InvalidCredential);
    }
    Ok(Self(token.to_string()))
  }

  pub fn token(&self) -> &str {
    &self.0
  }

  /// Value for the `Authorization` header.
  pub fn header_value(&self) -> String {
    format!("Bearer {}", self.0)
  }
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Credential(<{} chars>)", self.0.chars().count())
  }
}
