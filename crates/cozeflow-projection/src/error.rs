/// A decode step of the nested output that did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
  #[error("{level} is not valid JSON: {message}")]
  Json { level: &'static str, message: String },

  #[error("{level} is not a JSON object")]
  NotAnObject { level: &'static str },

  #[error("{level} is missing")]
  Missing { level: &'static str },
}
