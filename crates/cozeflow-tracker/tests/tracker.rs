//! Integration tests for cozeflow-tracker against an in-memory backend.
//!
//! All tests run on tokio's paused clock, so 15 second intervals elapse
//! instantly while keeping their ordering.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cozeflow_config::{ParameterDefaults, WorkflowRequest};
use cozeflow_tracker::{
  CancelOutcome, ChannelNotifier, ExecutionBackend, ExecutionHandle, ExecutionStatus,
  ExecutionTracker, TrackerEvent, TrackerState,
};
use cozeflow_upstream::{
  PreparedRun, Provider, SubmitReceipt, UpstreamError, WorkflowEnvelope, prepare_run,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(15);

/// Scripted backend: answers queries from a queue, then keeps answering
/// `Running` once the queue is empty.
#[derive(Clone, Default)]
struct FakeBackend {
  inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
  submit_error: Mutex<Option<UpstreamError>>,
  responses: Mutex<VecDeque<Result<WorkflowEnvelope, UpstreamError>>>,
  query_delay: Mutex<Option<Duration>>,
  queries: AtomicUsize,
  query_times: Mutex<Vec<Instant>>,
}

impl FakeBackend {
  fn with_responses(responses: Vec<serde_json::Value>) -> Self {
    let backend = Self::default();
    {
      let mut queue = backend.inner.responses.lock().unwrap();
      for response in responses {
        queue.push_back(Ok(serde_json::from_value(response).unwrap()));
      }
    }
    backend
  }

  fn queries(&self) -> usize {
    self.inner.queries.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
  async fn submit(&self, _run: &PreparedRun) -> Result<SubmitReceipt, UpstreamError> {
    if let Some(error) = self.inner.submit_error.lock().unwrap().take() {
      return Err(error);
    }
    Ok(SubmitReceipt {
      execute_id: "e1".to_string(),
      debug_url: Some("https://debug/e1".to_string()),
      logid: Some("submit-log".to_string()),
      message: "workflow submitted".to_string(),
    })
  }

  async fn query(&self, handle: &ExecutionHandle) -> Result<WorkflowEnvelope, UpstreamError> {
    assert_eq!(handle.execute_id, "e1");
    self.inner.queries.fetch_add(1, Ordering::SeqCst);
    self.inner.query_times.lock().unwrap().push(Instant::now());

    let delay = *self.inner.query_delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let next = self.inner.responses.lock().unwrap().pop_front();
    next.unwrap_or_else(|| Ok(running()))
  }
}

fn running() -> WorkflowEnvelope {
  serde_json::from_value(json!({ "code": 0, "data": [{ "execute_status": "Running" }] })).unwrap()
}

fn prepared_run() -> PreparedRun {
  prepare_run(
    &WorkflowRequest {
      input_text: Some("hello".to_string()),
      ..Default::default()
    },
    "Bearer pat_0123456789",
    &ParameterDefaults::default(),
    10_000,
  )
  .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_submit_poll_complete() {
  let backend = FakeBackend::with_responses(vec![
    json!({ "code": 0, "data": { "execute_status": "Running" } }),
    json!({
      "code": 0,
      "data": { "execute_status": "Success", "output": "{\"Output\":\"...\"}" },
      "logid": "poll-log"
    }),
  ]);
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  let started = Instant::now();
  tracker.start(prepared_run());
  let state = tracker.wait_terminal().await;

  match state {
    TrackerState::Completed { handle, projection } => {
      assert_eq!(handle.execute_id, "e1");
      assert_eq!(handle.logid.as_deref(), Some("poll-log"));
      assert_eq!(projection.execute_status, "Success");
      assert_eq!(projection.output, Some(json!("{\"Output\":\"...\"}")));
    }
    other => panic!("expected completed, got {:?}", other),
  }
  assert_eq!(backend.queries(), 2);
  assert_eq!(started.elapsed(), INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_within_one_interval() {
  let backend = FakeBackend::default();
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  let started = Instant::now();
  tracker.start(prepared_run());
  tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;

  let times = backend.inner.query_times.lock().unwrap().clone();
  assert_eq!(times.len(), 1);
  assert!(times[0] - started <= INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_running_and_absent_status_keep_polling() {
  let backend = FakeBackend::with_responses(vec![
    json!({ "code": 0, "data": [{ "execute_status": "Running" }] }),
    json!({ "code": 0, "data": [{ "execute_id": "e1" }] }),
    json!({ "code": 0, "data": "not json" }),
    json!({ "code": 0 }),
  ]);
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  tokio::time::sleep(INTERVAL * 4 + Duration::from_secs(1)).await;

  assert_eq!(backend.queries(), 4);
  match tracker.state() {
    TrackerState::Polling {
      attempts, status, ..
    } => {
      assert_eq!(attempts, 4);
      assert_eq!(status, ExecutionStatus::Unknown);
    }
    other => panic!("expected polling, got {:?}", other),
  }
}

#[tokio::test(start_paused = true)]
async fn test_data_shapes_complete_identically() {
  let record = json!({ "execute_status": "Success", "output": "{\"Output\":\"x\"}" });
  let shapes = vec![
    json!({ "code": 0, "data": record.to_string() }),
    json!({ "code": 0, "data": record.clone() }),
    json!({ "code": 0, "data": [record.clone()] }),
  ];

  let mut projections = Vec::new();
  for shape in shapes {
    let tracker = ExecutionTracker::new(FakeBackend::with_responses(vec![shape]), INTERVAL);
    tracker.start(prepared_run());
    match tracker.wait_terminal().await {
      TrackerState::Completed { projection, .. } => projections.push(projection),
      other => panic!("expected completed, got {:?}", other),
    }
  }

  assert_eq!(projections[0], projections[1]);
  assert_eq!(projections[1], projections[2]);
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_status_is_terminal() {
  let backend = FakeBackend::with_responses(vec![json!({
    "code": 0,
    "data": [{ "execute_status": "Timeout", "output": "" }]
  })]);
  let tracker = ExecutionTracker::new(backend, INTERVAL);

  tracker.start(prepared_run());
  match tracker.wait_terminal().await {
    TrackerState::Completed { projection, .. } => {
      assert_eq!(projection.execute_status, "Timeout")
    }
    other => panic!("expected completed, got {:?}", other),
  }
}

#[tokio::test(start_paused = true)]
async fn test_unknown_status_text_completes() {
  let backend = FakeBackend::with_responses(vec![json!({
    "code": 0,
    "data": [{ "execute_status": "Unknown", "output": "x" }]
  })]);
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  match tracker.wait_terminal().await {
    TrackerState::Completed { projection, .. } => {
      assert_eq!(projection.execute_status, "Unknown");
      assert_eq!(projection.output, Some(json!("x")));
    }
    other => panic!("expected completed, got {:?}", other),
  }

  tokio::time::sleep(INTERVAL * 3).await;
  assert_eq!(backend.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_zero_code_fails() {
  let backend = FakeBackend::with_responses(vec![
    json!({ "code": 0, "data": [{ "execute_status": "Running" }] }),
    json!({ "code": 4015, "msg": "execute record not found", "logid": "L-err" }),
  ]);
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  match tracker.wait_terminal().await {
    TrackerState::Failed { handle, failure } => {
      assert_eq!(handle.unwrap().execute_id, "e1");
      assert_eq!(failure.message, "execute record not found");
      assert_eq!(failure.code, Some(4015));
      assert_eq!(failure.logid.as_deref(), Some("L-err"));
      assert_eq!(failure.debug_url.as_deref(), Some("https://debug/e1"));
    }
    other => panic!("expected failed, got {:?}", other),
  }

  // Timer is stopped after failure.
  tokio::time::sleep(INTERVAL * 3).await;
  assert_eq!(backend.queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_transport_error_fails() {
  let backend = FakeBackend::default();
  backend
    .inner
    .responses
    .lock()
    .unwrap()
    .push_back(Err(UpstreamError::Status {
      provider: Provider::Workflow,
      status: 503,
      body: "unavailable".to_string(),
    }));
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  match tracker.wait_terminal().await {
    TrackerState::Failed { failure, .. } => {
      assert_eq!(failure.code, Some(503));
      assert!(failure.message.contains("unavailable"));
    }
    other => panic!("expected failed, got {:?}", other),
  }
}

#[tokio::test(start_paused = true)]
async fn test_submit_error_fails_without_polling() {
  let backend = FakeBackend::default();
  *backend.inner.submit_error.lock().unwrap() = Some(UpstreamError::Rejected {
    provider: Provider::Workflow,
    code: Some(4200),
    message: "workflow not published".to_string(),
    logid: Some("L-submit".to_string()),
  });
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  match tracker.wait_terminal().await {
    TrackerState::Failed { handle, failure } => {
      assert!(handle.is_none());
      assert_eq!(failure.code, Some(4200));
      assert_eq!(failure.logid.as_deref(), Some("L-submit"));
    }
    other => panic!("expected failed, got {:?}", other),
  }
  assert_eq!(backend.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_makes_timer_inert() {
  let backend = FakeBackend::default();
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);
  let mut receiver = tracker.subscribe();

  tracker.start(prepared_run());
  tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
  assert_eq!(backend.queries(), 1);

  assert_eq!(tracker.cancel(), CancelOutcome::Stopped);
  assert!(matches!(
    tracker.state(),
    TrackerState::Cancelled { handle: Some(_) }
  ));
  receiver.borrow_and_update();

  tokio::time::sleep(INTERVAL * 10).await;
  assert_eq!(backend.queries(), 1);
  assert!(!receiver.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_late_result_after_cancel_is_dropped() {
  let backend = FakeBackend::with_responses(vec![json!({
    "code": 0,
    "data": [{ "execute_status": "Success", "output": "late" }]
  })]);
  *backend.inner.query_delay.lock().unwrap() = Some(Duration::from_secs(5));
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  // First query is in flight between 15s and 20s.
  tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
  assert_eq!(backend.queries(), 1);
  assert_eq!(tracker.cancel(), CancelOutcome::Stopped);

  tokio::time::sleep(Duration::from_secs(10)).await;
  assert!(matches!(tracker.state(), TrackerState::Cancelled { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_result_clears_it() {
  let backend = FakeBackend::with_responses(vec![json!({
    "code": 0,
    "data": [{ "execute_status": "Success", "output": "done" }]
  })]);
  let tracker = ExecutionTracker::new(backend, INTERVAL);

  tracker.start(prepared_run());
  assert!(matches!(
    tracker.wait_terminal().await,
    TrackerState::Completed { .. }
  ));

  assert_eq!(tracker.cancel(), CancelOutcome::Cleared);
  assert_eq!(tracker.state(), TrackerState::Idle);
  assert_eq!(tracker.cancel(), CancelOutcome::Nothing);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_previous_timer() {
  let backend = FakeBackend::default();
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  let first = tracker.start(prepared_run());
  tokio::time::sleep(Duration::from_secs(10)).await;
  let second = tracker.start(prepared_run());
  assert!(second > first);

  // Only the second run's timer fires: at 25s, then 40s.
  tokio::time::sleep(Duration::from_secs(31)).await;
  assert_eq!(backend.queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_queries_do_not_overlap() {
  let backend = FakeBackend::default();
  *backend.inner.query_delay.lock().unwrap() = Some(Duration::from_secs(40));
  let tracker = ExecutionTracker::new(backend.clone(), INTERVAL);

  tracker.start(prepared_run());
  tokio::time::sleep(Duration::from_secs(100)).await;

  let times = backend.inner.query_times.lock().unwrap().clone();
  for pair in times.windows(2) {
    assert!(pair[1] - pair[0] >= Duration::from_secs(40));
  }
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_lifecycle() {
  let backend = FakeBackend::with_responses(vec![
    json!({ "code": 0, "data": [{ "execute_status": "Running" }] }),
    json!({ "code": 0, "data": [{ "execute_status": "Success", "output": "ok" }] }),
  ]);
  let (sender, mut receiver) = mpsc::unbounded_channel();
  let tracker = ExecutionTracker::with_notifier(backend, ChannelNotifier::new(sender), INTERVAL);

  tracker.start(prepared_run());
  tracker.wait_terminal().await;

  let mut events = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    events.push(event);
  }

  assert_eq!(events.len(), 4);
  assert!(matches!(&events[0], TrackerEvent::Submitted { execute_id, .. } if execute_id == "e1"));
  assert!(matches!(
    &events[1],
    TrackerEvent::Polled { attempt: 1, status: ExecutionStatus::Running, .. }
  ));
  assert!(matches!(
    &events[2],
    TrackerEvent::Polled { attempt: 2, status: ExecutionStatus::Success, .. }
  ));
  assert!(matches!(&events[3], TrackerEvent::Completed { .. }));
}
