//! Execution tracker for cozeflow.
//!
//! Follows one asynchronous workflow run through its lifecycle:
//!
//! ```text
//! Idle -> Submitting -> Polling -> { Completed | Failed | Cancelled }
//! ```
//!
//! The run is submitted through an [`ExecutionBackend`], then queried on a
//! fixed interval until the service reports a terminal status. Queries are
//! serialized: the next tick is only taken once the previous response has been
//! applied.
//!
//! # Example
//!
//! ```ignore
//! use cozeflow_tracker::{ExecutionTracker, TrackerState, DEFAULT_POLL_INTERVAL};
//!
//! let tracker = ExecutionTracker::new(workflow_client, DEFAULT_POLL_INTERVAL);
//! tracker.start(prepared_run);
//!
//! match tracker.wait_terminal().await {
//!   TrackerState::Completed { projection, .. } => println!("{:?}", projection),
//!   other => eprintln!("run ended as {}", other.name()),
//! }
//! ```

mod backend;
mod detail;
mod events;
mod state;
mod tracker;

pub use backend::ExecutionBackend;
pub use detail::{
  DetailError, DetailPayload, ExecutionDetail, ExecutionStatus, ResultProjection, normalize_detail,
};
pub use events::{ChannelNotifier, NoopNotifier, TrackerEvent, TrackerNotifier};
pub use state::{
  CancelOutcome, ExecutionHandle, PollOutcome, TrackerFailure, TrackerState, evaluate,
};
pub use tracker::{DEFAULT_POLL_INTERVAL, ExecutionTracker};
