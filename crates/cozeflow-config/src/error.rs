use std::path::PathBuf;

/// Errors that can occur while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The settings file could not be read.
  #[error("failed to read settings file '{path}'")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The settings file is not valid JSON for [`crate::Settings`].
  #[error("failed to parse settings file '{path}': {message}")]
  Parse { path: PathBuf, message: String },
}
