use async_trait::async_trait;
use cozeflow_upstream::{PreparedRun, SubmitReceipt, UpstreamError, WorkflowClient, WorkflowEnvelope};

use crate::state::ExecutionHandle;

/// The two upstream calls the tracker needs.
///
/// Implemented by [`WorkflowClient`]; tests substitute an in-memory fake.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
  /// Submit a run asynchronously.
  async fn submit(&self, run: &PreparedRun) -> Result<SubmitReceipt, UpstreamError>;

  /// Query the current status of a submitted run.
  async fn query(&self, handle: &ExecutionHandle) -> Result<WorkflowEnvelope, UpstreamError>;
}

#[async_trait]
impl ExecutionBackend for WorkflowClient {
  async fn submit(&self, run: &PreparedRun) -> Result<SubmitReceipt, UpstreamError> {
    WorkflowClient::submit(self, run).await
  }

  async fn query(&self, handle: &ExecutionHandle) -> Result<WorkflowEnvelope, UpstreamError> {
    self
      .run_history(&handle.credential, &handle.workflow_id, &handle.execute_id)
      .await
  }
}
