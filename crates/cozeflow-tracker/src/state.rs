//! Tracker states and the interpretation of one poll response.

use cozeflow_upstream::{Credential, SubmitReceipt, UpstreamError, WorkflowEnvelope};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detail::{ExecutionDetail, ExecutionStatus, ResultProjection, normalize_detail};

/// Identifies one in-flight asynchronous run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionHandle {
  pub execute_id: String,
  pub workflow_id: String,
  pub credential: Credential,
  pub debug_url: Option<String>,
  pub logid: Option<String>,
}

impl ExecutionHandle {
  pub fn new(receipt: SubmitReceipt, workflow_id: &str, credential: Credential) -> Self {
    Self {
      execute_id: receipt.execute_id,
      workflow_id: workflow_id.to_string(),
      credential,
      debug_url: receipt.debug_url,
      logid: receipt.logid,
    }
  }

  /// Take newer diagnostics from a poll response.
  pub(crate) fn refresh(&mut self, envelope: &WorkflowEnvelope) {
    if let Some(debug_url) = envelope.debug_url.as_ref().filter(|u| !u.is_empty()) {
      self.debug_url = Some(debug_url.clone());
    }
    if let Some(logid) = envelope.logid.as_ref().filter(|l| !l.is_empty()) {
      self.logid = Some(logid.clone());
    }
  }
}

/// Why a run ended in [`TrackerState::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerFailure {
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logid: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub debug_url: Option<String>,
}

impl TrackerFailure {
  pub fn from_error(error: &UpstreamError) -> Self {
    let code = match error {
      UpstreamError::Rejected { code, .. } => *code,
      UpstreamError::Status { status, .. } => Some(i64::from(*status)),
      _ => None,
    };
    Self {
      message: error.to_string(),
      code,
      logid: error.logid().map(str::to_string),
      debug_url: None,
    }
  }
}

/// Lifecycle of the tracked run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrackerState {
  #[default]
  Idle,
  Submitting {
    workflow_id: String,
  },
  Polling {
    handle: ExecutionHandle,
    attempts: u32,
    status: ExecutionStatus,
  },
  Completed {
    handle: ExecutionHandle,
    projection: ResultProjection,
  },
  Failed {
    handle: Option<ExecutionHandle>,
    failure: TrackerFailure,
  },
  Cancelled {
    handle: Option<ExecutionHandle>,
  },
}

impl TrackerState {
  /// Submitting or polling.
  pub fn is_active(&self) -> bool {
    matches!(
      self,
      TrackerState::Submitting { .. } | TrackerState::Polling { .. }
    )
  }

  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      TrackerState::Completed { .. } | TrackerState::Failed { .. } | TrackerState::Cancelled { .. }
    )
  }

  pub fn handle(&self) -> Option<&ExecutionHandle> {
    match self {
      TrackerState::Polling { handle, .. } | TrackerState::Completed { handle, .. } => Some(handle),
      TrackerState::Failed { handle, .. } | TrackerState::Cancelled { handle } => handle.as_ref(),
      TrackerState::Idle | TrackerState::Submitting { .. } => None,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      TrackerState::Idle => "idle",
      TrackerState::Submitting { .. } => "submitting",
      TrackerState::Polling { .. } => "polling",
      TrackerState::Completed { .. } => "completed",
      TrackerState::Failed { .. } => "failed",
      TrackerState::Cancelled { .. } => "cancelled",
    }
  }
}

/// What [`crate::ExecutionTracker::cancel`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
  /// A run was in flight and has been stopped.
  Stopped,
  /// A finished run's result was cleared.
  Cleared,
  /// Nothing to cancel.
  Nothing,
}

/// Interpretation of one poll response.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
  /// Keep polling.
  Pending {
    status: ExecutionStatus,
  },
  /// The run reached a terminal status.
  Finished {
    detail: ExecutionDetail,
  },
  /// The service reported a failure for the query itself.
  Rejected {
    failure: TrackerFailure,
  },
}

/// Decide what a poll response means for the run.
///
/// A non-zero result code fails the run. Otherwise the `data` field is
/// normalized; a missing or undecodable detail counts as an unknown status
/// and polling continues.
pub fn evaluate(envelope: &WorkflowEnvelope) -> PollOutcome {
  if !envelope.is_ok() {
    let message = envelope
      .msg
      .clone()
      .filter(|m| !m.is_empty())
      .unwrap_or_else(|| "execution failed".to_string());
    return PollOutcome::Rejected {
      failure: TrackerFailure {
        message,
        code: envelope.code,
        logid: envelope.logid.clone(),
        debug_url: envelope.debug_url.clone(),
      },
    };
  }

  match normalize_detail(envelope.data.as_ref()) {
    Ok(detail) if detail.status.is_terminal() => PollOutcome::Finished { detail },
    Ok(detail) => PollOutcome::Pending {
      status: detail.status,
    },
    Err(e) => {
      debug!(error = %e, "execution detail unavailable, treating status as unknown");
      PollOutcome::Pending {
        status: ExecutionStatus::Unknown,
      }
    }
  }
}

impl PollOutcome {
  pub fn status(&self) -> Option<&ExecutionStatus> {
    match self {
      PollOutcome::Pending { status } => Some(status),
      PollOutcome::Finished { detail } => Some(&detail.status),
      PollOutcome::Rejected { .. } => None,
    }
  }

  pub fn projection(&self) -> Option<ResultProjection> {
    match self {
      PollOutcome::Finished { detail } => Some(detail.projection()),
      _ => None,
    }
  }
}
