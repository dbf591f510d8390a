//! Cozeflow Config
//!
//! This crate contains the serializable types shared by the other cozeflow
//! crates: the [`Settings`] that point the adapters at their upstream services,
//! and the [`WorkflowRequest`] parameter bag a user fills in before a run.
//!
//! Settings can be loaded from:
//! - a JSON file (via CLI with `--config=settings.json`)
//! - `<data-dir>/config.json` when present, defaults otherwise
//!
//! A `WorkflowRequest` is loosely typed on purpose. Every field is optional and
//! the upstream adapter fills the gaps from [`ParameterDefaults`].

mod error;
mod request;
mod settings;

pub use error::ConfigError;
pub use request::{TargetLang, WorkflowRequest};
pub use settings::{ParameterDefaults, Settings};
