//! The execution engine.
//!
//! An [`Engine`] owns the collaborators and the store, and tracks every run
//! it has started until the run reaches a terminal status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument, warn};
use weft_config::WorkflowDef;
use weft_host::Collaborators;
use weft_runtime::{ExecutionEvent, ProgressPublisher, ProgressStream, Scheduler};
use weft_store::{Execution, ExecutionStatus, ExecutionStore};
use weft_workflow::Workflow;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
  /// The run will stop before its next node.
  Requested,
  /// The run had already reached this terminal status.
  AlreadyFinished(ExecutionStatus),
}

/// Handles to a run that has not finished yet.
struct LiveRun {
  cancel: CancellationToken,
  progress: Arc<ProgressPublisher>,
}

type LiveRuns = Arc<Mutex<HashMap<String, LiveRun>>>;

/// Starts, observes and cancels workflow executions.
///
/// # Usage
///
/// ```ignore
/// let engine = Engine::new(EngineConfig::default(), collaborators, store);
///
/// let id = engine.start_execution(&def, json!({ "city": "Bangkok" })).await?;
/// let mut progress = engine.subscribe_progress(&id).await?;
/// while let Some(event) = progress.next().await {
///   println!("{event:?}");
/// }
/// let execution = engine.get_execution(&id).await?;
/// ```
pub struct Engine {
  config: EngineConfig,
  collaborators: Collaborators,
  store: Arc<dyn ExecutionStore>,
  live: LiveRuns,
  shutdown: CancellationToken,
  tasks: TaskTracker,
}

impl Engine {
  pub fn new(
    config: EngineConfig,
    collaborators: Collaborators,
    store: Arc<dyn ExecutionStore>,
  ) -> Self {
    Self {
      config,
      collaborators,
      store,
      live: Arc::new(Mutex::new(HashMap::new())),
      shutdown: CancellationToken::new(),
      tasks: TaskTracker::new(),
    }
  }

  /// Validate, snapshot and start a run in the background.
  ///
  /// Returns as soon as the pending record is stored. An invalid workflow is
  /// rejected with every violation and no record is created.
  pub async fn start_execution(
    &self,
    def: &WorkflowDef,
    inputs: serde_json::Value,
  ) -> Result<String, EngineError> {
    let (execution_id, _handle) = self.launch(def, inputs).await?;
    Ok(execution_id)
  }

  /// Start a run and wait for its terminal record.
  pub async fn execute(
    &self,
    def: &WorkflowDef,
    inputs: serde_json::Value,
  ) -> Result<Execution, EngineError> {
    let (execution_id, handle) = self.launch(def, inputs).await?;
    handle.await.map_err(|e| EngineError::Aborted {
      execution_id,
      message: e.to_string(),
    })
  }

  /// Progress events of a run, ending after its terminal event.
  ///
  /// A run that already finished yields just its terminal event, rebuilt from
  /// the stored record. A stored run that is not live and not finished (left
  /// over from a previous process) yields nothing.
  pub async fn subscribe_progress(
    &self,
    execution_id: &str,
  ) -> Result<ProgressStream, EngineError> {
    let progress = lock(&self.live)
      .get(execution_id)
      .map(|run| Arc::clone(&run.progress));
    if let Some(progress) = progress {
      return Ok(progress.subscribe());
    }

    let execution = self.store.get_execution(execution_id).await?;
    Ok(match terminal_event(&execution) {
      Some(event) => stream::iter([event]).boxed(),
      None => stream::empty().boxed(),
    })
  }

  pub async fn get_execution(&self, execution_id: &str) -> Result<Execution, EngineError> {
    Ok(self.store.get_execution(execution_id).await?)
  }

  /// Executions of a workflow, newest first.
  pub async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, EngineError> {
    Ok(self.store.list_executions(workflow_id).await?)
  }

  /// Ask a run to stop. Cancellation is observed between nodes, so the node
  /// in flight still finishes and is recorded.
  #[instrument(name = "cancel_execution", skip(self))]
  pub async fn cancel_execution(&self, execution_id: &str) -> Result<CancelAck, EngineError> {
    let cancel = lock(&self.live)
      .get(execution_id)
      .map(|run| run.cancel.clone());
    if let Some(cancel) = cancel {
      cancel.cancel();
      info!(execution_id, "cancellation_requested");
      return Ok(CancelAck::Requested);
    }

    let mut execution = self.store.get_execution(execution_id).await?;
    if execution.is_terminal() {
      return Ok(CancelAck::AlreadyFinished(execution.status));
    }

    // Not live but not finished either: nothing will ever drive it, so close
    // the record here.
    execution.transition(ExecutionStatus::Cancelled)?;
    self.store.update_execution(&execution).await?;
    warn!(execution_id, status = %execution.status, "orphaned_execution_cancelled");
    Ok(CancelAck::Requested)
  }

  /// Cancel every live run, refuse new ones, and wait for the runs to record
  /// their final status.
  pub async fn shutdown(&self) {
    let live = lock(&self.live).len();
    info!(live_executions = live, "engine_shutdown");
    self.shutdown.cancel();
    self.tasks.close();
    self.tasks.wait().await;
  }

  #[instrument(name = "start_execution", skip_all, fields(workflow_id = %def.id))]
  async fn launch(
    &self,
    def: &WorkflowDef,
    inputs: serde_json::Value,
  ) -> Result<(String, JoinHandle<Execution>), EngineError> {
    if self.shutdown.is_cancelled() {
      return Err(EngineError::ShuttingDown);
    }

    let workflow = match Workflow::snapshot(def) {
      Ok(workflow) => Arc::new(workflow),
      Err(report) => {
        warn!(violations = report.errors.len(), error = %report, "workflow_rejected");
        return Err(report.into());
      }
    };

    let execution = Execution::new(
      uuid::Uuid::new_v4().to_string(),
      &workflow.workflow_id,
      &workflow.snapshot_id,
      inputs,
    );
    let execution_id = execution.id.clone();

    // Registered before the record is visible, so a cancel that races the
    // create reaches the token instead of the stored record.
    let cancel = self.shutdown.child_token();
    let progress = Arc::new(ProgressPublisher::new(self.config.progress_capacity));
    lock(&self.live).insert(
      execution_id.clone(),
      LiveRun {
        cancel: cancel.clone(),
        progress: Arc::clone(&progress),
      },
    );
    if let Err(e) = self.store.create_execution(&execution).await {
      lock(&self.live).remove(&execution_id);
      return Err(e.into());
    }

    let scheduler = Scheduler::new(
      workflow,
      self.collaborators.clone(),
      self.config.runtime.clone(),
      Arc::clone(&self.store),
    )
    .with_notifier(progress)
    .with_cancel(cancel);

    let entry = LiveEntry {
      live: Arc::clone(&self.live),
      execution_id: execution_id.clone(),
    };
    let handle = self.tasks.spawn(async move {
      let _entry = entry;
      scheduler.run(execution).await
    });

    info!(execution_id = %execution_id, "execution_queued");
    Ok((execution_id, handle))
  }
}

/// Removes a run from the live map when its task ends, even by unwinding.
struct LiveEntry {
  live: LiveRuns,
  execution_id: String,
}

impl Drop for LiveEntry {
  fn drop(&mut self) {
    lock(&self.live).remove(&self.execution_id);
  }
}

fn lock(live: &Mutex<HashMap<String, LiveRun>>) -> MutexGuard<'_, HashMap<String, LiveRun>> {
  live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The event a finished run ended with, rebuilt from its record.
fn terminal_event(execution: &Execution) -> Option<ExecutionEvent> {
  let execution_id = execution.id.clone();
  let timestamp = execution.completed_at.unwrap_or_else(Utc::now);
  match execution.status {
    ExecutionStatus::Completed => Some(ExecutionEvent::ExecutionCompleted {
      execution_id,
      outputs: execution.outputs.clone(),
      timestamp,
    }),
    ExecutionStatus::Failed => Some(ExecutionEvent::ExecutionFailed {
      execution_id,
      error: execution
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_default(),
      timestamp,
    }),
    ExecutionStatus::Cancelled => Some(ExecutionEvent::ExecutionCancelled {
      execution_id,
      timestamp,
    }),
    ExecutionStatus::Pending | ExecutionStatus::Running => None,
  }
}
