//! The execution tracker.
//!
//! One tracker owns at most one run. Its poll timer lives in a spawned task
//! that only the tracker can stop, and every state write is tagged with the
//! generation of the run that produced it: starting, cancelling or clearing
//! bumps the generation, so a response that lands after any of those is
//! discarded instead of overwriting the newer state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cozeflow_upstream::PreparedRun;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::backend::ExecutionBackend;
use crate::detail::ExecutionStatus;
use crate::events::{NoopNotifier, TrackerEvent, TrackerNotifier};
use crate::state::{
  CancelOutcome, ExecutionHandle, PollOutcome, TrackerFailure, TrackerState, evaluate,
};

/// Interval between status queries when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

struct Shared<B, N> {
  backend: B,
  notifier: N,
  interval: Duration,
  state: watch::Sender<TrackerState>,
  generation: AtomicU64,
}

impl<B, N> Shared<B, N> {
  fn is_current(&self, generation: u64) -> bool {
    self.generation.load(Ordering::SeqCst) == generation
  }

  /// Replace the state if `generation` is still the current one.
  ///
  /// The check runs under the channel's write lock, the same lock that
  /// start, cancel and clear bump the generation under.
  fn transition(&self, generation: u64, next: TrackerState) -> bool {
    self.state.send_if_modified(|state| {
      if !self.is_current(generation) {
        return false;
      }
      *state = next;
      true
    })
  }
}

/// Tracks one asynchronous run from submission to a terminal state.
///
/// Generic over `N: TrackerNotifier`; use [`ExecutionTracker::new`] when events
/// are not needed, or [`ExecutionTracker::with_notifier`] to observe them.
pub struct ExecutionTracker<B, N = NoopNotifier> {
  shared: Arc<Shared<B, N>>,
  active: Mutex<Option<CancellationToken>>,
}

impl<B: ExecutionBackend + 'static> ExecutionTracker<B, NoopNotifier> {
  pub fn new(backend: B, interval: Duration) -> Self {
    Self::with_notifier(backend, NoopNotifier, interval)
  }
}

impl<B, N> ExecutionTracker<B, N>
where
  B: ExecutionBackend + 'static,
  N: TrackerNotifier + 'static,
{
  pub fn with_notifier(backend: B, notifier: N, interval: Duration) -> Self {
    let (state, _) = watch::channel(TrackerState::Idle);
    Self {
      shared: Arc::new(Shared {
        backend,
        notifier,
        interval,
        state,
        generation: AtomicU64::new(0),
      }),
      active: Mutex::new(None),
    }
  }

  /// A snapshot of the current state.
  pub fn state(&self) -> TrackerState {
    self.shared.state.borrow().clone()
  }

  /// Watch state changes.
  pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
    self.shared.state.subscribe()
  }

  /// Submit `run` and start polling it.
  ///
  /// Any run already being tracked is stopped first. The first status query
  /// happens one interval after the service accepts the run. Must be called
  /// from within a tokio runtime.
  pub fn start(&self, run: PreparedRun) -> u64 {
    let token = CancellationToken::new();
    if let Some(previous) = self.replace_active(Some(token.clone())) {
      previous.cancel();
    }

    let mut generation = 0;
    self.shared.state.send_modify(|state| {
      generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
      *state = TrackerState::Submitting {
        workflow_id: run.workflow_id().to_string(),
      };
    });

    let span = info_span!("track_execution", generation, workflow_id = %run.workflow_id());
    tokio::spawn(drive(Arc::clone(&self.shared), run, generation, token).instrument(span));
    generation
  }

  /// Stop tracking.
  ///
  /// While a run is in flight this stops its timer and moves to
  /// [`TrackerState::Cancelled`]. Once a run has finished it clears the stored
  /// result instead, back to [`TrackerState::Idle`].
  pub fn cancel(&self) -> CancelOutcome {
    if let Some(token) = self.replace_active(None) {
      token.cancel();
    }

    let mut outcome = CancelOutcome::Nothing;
    let mut stopped_id = None;
    self.shared.state.send_if_modified(|state| {
      self.shared.generation.fetch_add(1, Ordering::SeqCst);
      match std::mem::take(state) {
        TrackerState::Idle => {
          return false;
        }
        TrackerState::Submitting { .. } => {
          *state = TrackerState::Cancelled { handle: None };
          outcome = CancelOutcome::Stopped;
        }
        TrackerState::Polling { handle, .. } => {
          stopped_id = Some(handle.execute_id.clone());
          *state = TrackerState::Cancelled {
            handle: Some(handle),
          };
          outcome = CancelOutcome::Stopped;
        }
        TrackerState::Completed { .. } | TrackerState::Failed { .. } | TrackerState::Cancelled { .. } => {
          outcome = CancelOutcome::Cleared;
        }
      }
      true
    });

    match outcome {
      CancelOutcome::Stopped => {
        info!(execute_id = ?stopped_id, "execution_cancelled");
        self.shared.notifier.notify(TrackerEvent::Cancelled {
          execute_id: stopped_id,
        });
      }
      CancelOutcome::Cleared => debug!("tracker result cleared"),
      CancelOutcome::Nothing => {}
    }
    outcome
  }

  /// Stop any run and forget everything, whatever the current state.
  pub fn clear(&self) {
    if let Some(token) = self.replace_active(None) {
      token.cancel();
    }
    self.shared.state.send_modify(|state| {
      self.shared.generation.fetch_add(1, Ordering::SeqCst);
      *state = TrackerState::Idle;
    });
  }

  /// Wait until no run is in flight and return the state it settled in.
  pub async fn wait_terminal(&self) -> TrackerState {
    let mut receiver = self.shared.state.subscribe();
    match receiver.wait_for(|state| !state.is_active()).await {
      Ok(state) => state.clone(),
      // The sender lives as long as `self`.
      Err(_) => self.state(),
    }
  }

  fn replace_active(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
    let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *active, next)
  }
}

impl<B, N> Drop for ExecutionTracker<B, N> {
  fn drop(&mut self) {
    let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = active.take() {
      token.cancel();
    }
  }
}

/// Submit, then poll until the run settles, the token fires, or the
/// generation moves on.
async fn drive<B, N>(
  shared: Arc<Shared<B, N>>,
  run: PreparedRun,
  generation: u64,
  cancel: CancellationToken,
) where
  B: ExecutionBackend,
  N: TrackerNotifier,
{
  let submitted = shared.backend.submit(&run).await;
  if !shared.is_current(generation) {
    debug!("submission result for a superseded run dropped");
    return;
  }

  let receipt = match submitted {
    Ok(receipt) => receipt,
    Err(e) => {
      warn!(error = %e, "execution_submit_failed");
      let failure = TrackerFailure::from_error(&e);
      if shared.transition(
        generation,
        TrackerState::Failed {
          handle: None,
          failure: failure.clone(),
        },
      ) {
        shared.notifier.notify(TrackerEvent::Failed {
          execute_id: None,
          failure,
        });
      }
      return;
    }
  };

  let mut handle = ExecutionHandle::new(receipt, run.workflow_id(), run.credential.clone());
  let execute_id = handle.execute_id.clone();

  if !shared.transition(
    generation,
    TrackerState::Polling {
      handle: handle.clone(),
      attempts: 0,
      status: ExecutionStatus::Unknown,
    },
  ) {
    return;
  }
  shared.notifier.notify(TrackerEvent::Submitted {
    execute_id: execute_id.clone(),
    workflow_id: handle.workflow_id.clone(),
    debug_url: handle.debug_url.clone(),
    logid: handle.logid.clone(),
  });
  info!(execute_id = %execute_id, interval_ms = shared.interval.as_millis() as u64, "polling_started");

  // A query is awaited before the next tick is taken, so ticks never overlap;
  // ticks missed while a slow query was in flight are not replayed.
  let mut ticker = tokio::time::interval_at(Instant::now() + shared.interval, shared.interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  let mut attempt: u32 = 0;
  loop {
    tokio::select! {
      _ = cancel.cancelled() => {
        debug!(execute_id = %execute_id, "poll loop stopped");
        return;
      }
      _ = ticker.tick() => {}
    }

    attempt += 1;
    let response = shared.backend.query(&handle).await;
    if !shared.is_current(generation) {
      debug!(execute_id = %execute_id, attempt, "late poll result dropped");
      return;
    }

    let envelope = match response {
      Ok(envelope) => envelope,
      Err(e) => {
        warn!(execute_id = %execute_id, attempt, error = %e, "poll_failed");
        let mut failure = TrackerFailure::from_error(&e);
        failure.debug_url = handle.debug_url.clone();
        failure.logid = failure.logid.or_else(|| handle.logid.clone());
        finish_failed(&shared, generation, handle, failure);
        return;
      }
    };
    handle.refresh(&envelope);

    match evaluate(&envelope) {
      PollOutcome::Pending { status } => {
        debug!(execute_id = %execute_id, attempt, status = %status, "poll_completed");
        if !shared.transition(
          generation,
          TrackerState::Polling {
            handle: handle.clone(),
            attempts: attempt,
            status: status.clone(),
          },
        ) {
          return;
        }
        shared.notifier.notify(TrackerEvent::Polled {
          execute_id: execute_id.clone(),
          attempt,
          status,
        });
      }
      PollOutcome::Finished { detail } => {
        let projection = detail.projection();
        info!(
          execute_id = %execute_id,
          attempt,
          status = %detail.status,
          logid = ?handle.logid,
          "execution_completed"
        );
        if !shared.transition(
          generation,
          TrackerState::Completed {
            handle,
            projection: projection.clone(),
          },
        ) {
          return;
        }
        shared.notifier.notify(TrackerEvent::Polled {
          execute_id: execute_id.clone(),
          attempt,
          status: detail.status,
        });
        shared.notifier.notify(TrackerEvent::Completed {
          execute_id,
          projection,
        });
        return;
      }
      PollOutcome::Rejected { mut failure } => {
        warn!(
          execute_id = %execute_id,
          attempt,
          code = ?failure.code,
          message = %failure.message,
          "execution_failed"
        );
        failure.debug_url = failure.debug_url.or_else(|| handle.debug_url.clone());
        finish_failed(&shared, generation, handle, failure);
        return;
      }
    }
  }
}

fn finish_failed<B, N: TrackerNotifier>(
  shared: &Shared<B, N>,
  generation: u64,
  handle: ExecutionHandle,
  failure: TrackerFailure,
) {
  let execute_id = handle.execute_id.clone();
  if shared.transition(
    generation,
    TrackerState::Failed {
      handle: Some(handle),
      failure: failure.clone(),
    },
  ) {
    shared.notifier.notify(TrackerEvent::Failed {
      execute_id: Some(execute_id),
      failure,
    });
  }
}
