use std::fmt;

/// The third-party services cozeflow talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
  /// Workflow orchestration service.
  Workflow,
  /// Draw/image generation service.
  Draw,
  /// Translation service.
  Translate,
  /// Text-to-speech service.
  Speech,
}

impl fmt::Display for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Provider::Workflow => "workflow service",
      Provider::Draw => "draw service",
      Provider::Translate => "translation service",
      Provider::Speech => "speech service",
    };
    f.write_str(name)
  }
}
