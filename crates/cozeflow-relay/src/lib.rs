//! Stream relay for cozeflow.
//!
//! The workflow service answers a streaming run with newline-delimited
//! `data: <json>` frames. This crate decodes them, classifies each one by its
//! `event` field and re-emits a normalized [`RelayFrame`] per upstream frame.
//!
//! The relay never fails: undecodable frames are forwarded as raw content,
//! transport errors become a final error frame, and every exit path ends with
//! exactly one `data: [DONE]` terminator.
//!
//! ```text
//! bytes -> FrameDecoder -> DecodedLine -> UpstreamFrame -> ClientFrame
//! ```

mod client;
mod decoder;
mod frame;
mod relay;

pub use client::{ClientFrame, RelayEvent, RelayFrame, TERMINATOR};
pub use decoder::{DATA_PREFIX, DONE_MARKER, DecodedLine, FrameDecoder};
pub use frame::{PARAMETER_ERROR_CODE, RawStreamEvent, UpstreamFrame};
pub use relay::{StreamRelay, relay};
