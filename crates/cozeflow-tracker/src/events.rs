//! Tracker events and notifiers for observability.
//!
//! Events are emitted as the tracked run moves through its lifecycle, so that
//! consumers can log progress, drive a UI, or record attempts in tests.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::detail::{ExecutionStatus, ResultProjection};
use crate::state::TrackerFailure;

/// Events emitted while tracking a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackerEvent {
  /// The service accepted the run.
  Submitted {
    execute_id: String,
    workflow_id: String,
    debug_url: Option<String>,
    logid: Option<String>,
  },

  /// A status query returned.
  Polled {
    execute_id: String,
    attempt: u32,
    status: ExecutionStatus,
  },

  /// The run reached a terminal status.
  Completed {
    execute_id: String,
    projection: ResultProjection,
  },

  /// Submission or polling failed.
  Failed {
    execute_id: Option<String>,
    failure: TrackerFailure,
  },

  /// The run was stopped by the caller.
  Cancelled { execute_id: Option<String> },
}

/// Trait for receiving tracker events.
pub trait TrackerNotifier: Send + Sync {
  /// Called when a tracker event occurs.
  fn notify(&self, event: TrackerEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl TrackerNotifier for NoopNotifier {
  fn notify(&self, _event: TrackerEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never delays the poll loop. There are at most
  // a handful of events per poll interval.
  sender: mpsc::UnboundedSender<TrackerEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<TrackerEvent>) -> Self {
    Self { sender }
  }
}

impl TrackerNotifier for ChannelNotifier {
  fn notify(&self, event: TrackerEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
