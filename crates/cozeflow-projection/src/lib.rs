//! Result projector for cozeflow.
//!
//! A finished run's `output` is a JSON-encoded object whose `Output` field is
//! itself JSON-encoded text holding the fields shown to the user:
//!
//! ```text
//! output: "{\"Output\": \"{\\\"Introduction\\\": ..., \\\"image_status_list\\\": [...], \\\"output\\\": ...}\"}"
//! ```
//!
//! [`project`] decodes both levels. When a level fails to decode, the last
//! level that did decode is shown as opaque text instead.

mod error;
mod project;

pub use error::DecodeError;
pub use project::{NO_IMAGE_STATUS, OutputContent, ProjectedBody, ProjectedResult, project};
