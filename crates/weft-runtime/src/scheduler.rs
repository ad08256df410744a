//! The run loop.
//!
//! A [`Scheduler`] walks one execution from the start node, dispatching one
//! node at a time and following the edge each node selects, until an end node
//! completes the run, a node fails it, or cancellation stops it between nodes.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use weft_config::NodeDef;
use weft_host::Collaborators;
use weft_store::{
  ErrorCode, Execution, ExecutionError, ExecutionStatus, ExecutionStore, LogEntry, NodeState,
};
use weft_workflow::Workflow;

use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::error::{NodeError, SafetyLimit};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::executor::{self, ExecEnv, NextEdge};
use crate::retry::RetryNotice;

/// How a walk ended.
enum Finish {
  Completed,
  Failed(ExecutionError),
  Cancelled,
}

/// Runs one execution of a workflow snapshot.
pub struct Scheduler {
  workflow: Arc<Workflow>,
  collaborators: Collaborators,
  config: RuntimeConfig,
  store: Arc<dyn ExecutionStore>,
  notifier: Arc<dyn ExecutionNotifier>,
  cancel: CancellationToken,
}

impl Scheduler {
  pub fn new(
    workflow: Arc<Workflow>,
    collaborators: Collaborators,
    config: RuntimeConfig,
    store: Arc<dyn ExecutionStore>,
  ) -> Self {
    Self {
      workflow,
      collaborators,
      config,
      store,
      notifier: Arc::new(NoopNotifier),
      cancel: CancellationToken::new(),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Token checked between nodes. Cancelling it stops the run after the
  /// node in flight finishes.
  pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  /// Walk `execution` to a terminal status and return the final record.
  ///
  /// The pending record must already exist in the store. Node failures and
  /// store errors never escape: the first fails the run, the second is logged.
  #[instrument(
    name = "workflow_execute",
    skip_all,
    fields(workflow_id = %execution.workflow_id, execution_id = %execution.id)
  )]
  pub async fn run(self, mut execution: Execution) -> Execution {
    if execution.is_terminal() {
      return execution;
    }

    let mut ctx = ExecutionContext::new(execution.inputs.clone());
    let finish = self.walk(&mut execution, &mut ctx).await;
    self.finish(execution, ctx, finish).await
  }

  async fn walk(&self, execution: &mut Execution, ctx: &mut ExecutionContext) -> Finish {
    let Some(mut node) = self.workflow.start_node() else {
      let message = "workflow has no start node".to_string();
      ctx.append_log(LogEntry::error(None, message.clone()));
      return Finish::Failed(ExecutionError {
        node_id: None,
        code: ErrorCode::NodeExecution,
        message,
      });
    };
    let mut steps: u64 = 0;

    loop {
      if self.cancel.is_cancelled() {
        return Finish::Cancelled;
      }

      if steps >= self.config.max_steps {
        let err = NodeError::from(SafetyLimit::StepLimitExceeded {
          limit: self.config.max_steps,
        });
        ctx.append_log(LogEntry::error(Some(&node.id), err.to_string()));
        return Finish::Failed(ExecutionError {
          node_id: Some(node.id.clone()),
          code: err.code(),
          message: err.to_string(),
        });
      }
      steps += 1;

      execution.current_node_id = Some(node.id.clone());
      if execution.status == ExecutionStatus::Pending {
        self.begin(execution, ctx).await;
      }

      let (next_edge, output) = match self.step(execution, ctx, node).await {
        Ok(step) => step,
        Err(err) => return Finish::Failed(err),
      };

      let branch = match next_edge {
        NextEdge::Finish { output_key } => {
          execution.outputs.insert(output_key, output);
          return Finish::Completed;
        }
        NextEdge::Default => None,
        NextEdge::Branch(branch) => Some(branch),
      };

      node = match self.workflow.next(&node.id, branch.as_deref()) {
        Some(next) => next,
        None => {
          let err = NodeError::MissingEdge { branch };
          let message = format!("node '{}': {err}", node.id);
          ctx.append_log(LogEntry::error(Some(&node.id), message.clone()));
          return Finish::Failed(ExecutionError {
            node_id: Some(node.id.clone()),
            code: err.code(),
            message,
          });
        }
      };
    }
  }

  async fn begin(&self, execution: &mut Execution, ctx: &mut ExecutionContext) {
    if let Err(e) = execution.transition(ExecutionStatus::Running) {
      warn!(error = %e, "status_transition_rejected");
    }
    ctx.append_log(LogEntry::info(None, "execution started"));
    self.save_execution(execution).await;

    info!(
      workflow_id = %execution.workflow_id,
      execution_id = %execution.id,
      snapshot_id = %execution.snapshot_id,
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution.id.clone(),
      workflow_id: execution.workflow_id.clone(),
      timestamp: Utc::now(),
    });
  }

  /// Run one node, recording its state. Returns the edge to follow and the
  /// node output.
  async fn step(
    &self,
    execution: &mut Execution,
    ctx: &mut ExecutionContext,
    node: &NodeDef,
  ) -> Result<(NextEdge, serde_json::Value), ExecutionError> {
    let node_type = node.kind.name();
    let mut state = execution
      .node_states
      .entry(node.id.clone())
      .and_modify(NodeState::revisit)
      .or_insert_with(|| NodeState::started(&node.id, node_type))
      .clone();
    self.save_node_state(&execution.id, &state).await;

    debug!(node_id = %node.id, node_type, visit = state.visits, "node_started");
    self.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: execution.id.clone(),
      node_id: node.id.clone(),
      node_type: node_type.to_string(),
      timestamp: Utc::now(),
    });

    let retries = Mutex::new(Vec::new());
    let on_retry = |notice: RetryNotice| {
      warn!(
        node_id = %node.id,
        attempt = notice.attempt,
        delay_ms = notice.delay.as_millis() as u64,
        error = %notice.error,
        "node_retry"
      );
      self.notifier.notify(ExecutionEvent::NodeRetrying {
        execution_id: execution.id.clone(),
        node_id: node.id.clone(),
        node_type: node_type.to_string(),
        attempt: notice.attempt,
        error: notice.error.to_string(),
        delay_ms: notice.delay.as_millis() as u64,
        timestamp: Utc::now(),
      });
      retries
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(notice);
    };
    let env = ExecEnv {
      collaborators: &self.collaborators,
      config: &self.config,
      on_retry: &on_retry,
    };
    let result = AssertUnwindSafe(executor::execute(node, &env, ctx))
      .catch_unwind()
      .await
      .unwrap_or_else(|payload| {
        Err(NodeError::Panicked {
          message: panic_message(payload.as_ref()),
        })
      });

    for notice in retries.into_inner().unwrap_or_else(PoisonError::into_inner) {
      ctx.append_log(LogEntry::warn(
        Some(&node.id),
        format!(
          "retry: attempt {} failed: {}; retrying in {}ms",
          notice.attempt,
          notice.error,
          notice.delay.as_millis()
        ),
      ));
    }

    match result {
      Ok(outcome) => {
        ctx.set_output(&node.id, outcome.output.clone());
        ctx.record_tokens(outcome.tokens);
        state.succeed(outcome.output.clone(), outcome.attempts);
        self.record_node_state(execution, state).await;

        debug!(
          node_id = %node.id,
          node_type,
          tokens = outcome.tokens,
          attempts = outcome.attempts,
          "node_completed"
        );
        self.notifier.notify(ExecutionEvent::NodeCompleted {
          execution_id: execution.id.clone(),
          node_id: node.id.clone(),
          node_type: node_type.to_string(),
          output: outcome.output.clone(),
          timestamp: Utc::now(),
        });
        Ok((outcome.next_edge, outcome.output))
      }
      Err(err) => {
        let message = err.to_string();
        ctx.append_log(LogEntry::error(Some(&node.id), message.clone()));
        state.fail(message.clone(), err.attempts());
        self.record_node_state(execution, state).await;

        warn!(node_id = %node.id, node_type, error = %message, "node_failed");
        self.notifier.notify(ExecutionEvent::NodeFailed {
          execution_id: execution.id.clone(),
          node_id: node.id.clone(),
          node_type: node_type.to_string(),
          error: message.clone(),
          attempts: err.attempts(),
          timestamp: Utc::now(),
        });
        Err(ExecutionError {
          node_id: Some(node.id.clone()),
          code: err.code(),
          message,
        })
      }
    }
  }

  async fn finish(
    &self,
    mut execution: Execution,
    mut ctx: ExecutionContext,
    finish: Finish,
  ) -> Execution {
    let timestamp = Utc::now();
    let (status, event) = match finish {
      Finish::Completed => {
        ctx.append_log(LogEntry::info(None, "execution completed"));
        let event = ExecutionEvent::ExecutionCompleted {
          execution_id: execution.id.clone(),
          outputs: execution.outputs.clone(),
          timestamp,
        };
        (ExecutionStatus::Completed, event)
      }
      Finish::Failed(err) => {
        let event = ExecutionEvent::ExecutionFailed {
          execution_id: execution.id.clone(),
          error: err.message.clone(),
          timestamp,
        };
        execution.error = Some(err);
        (ExecutionStatus::Failed, event)
      }
      Finish::Cancelled => {
        ctx.append_log(LogEntry::warn(
          execution.current_node_id.as_deref(),
          "execution cancelled",
        ));
        let event = ExecutionEvent::ExecutionCancelled {
          execution_id: execution.id.clone(),
          timestamp,
        };
        (ExecutionStatus::Cancelled, event)
      }
    };

    if let Err(e) = execution.transition(status) {
      warn!(error = %e, "status_transition_rejected");
    }
    execution.total_tokens = ctx.total_tokens();
    execution.log = ctx.log().to_vec();
    self.save_execution(&execution).await;

    match &execution.error {
      None if status == ExecutionStatus::Completed => info!(
        workflow_id = %execution.workflow_id,
        execution_id = %execution.id,
        nodes_executed = execution.node_states.len(),
        total_tokens = execution.total_tokens,
        "workflow_completed"
      ),
      None => info!(
        workflow_id = %execution.workflow_id,
        execution_id = %execution.id,
        current_node_id = ?execution.current_node_id,
        "workflow_cancelled"
      ),
      Some(err) => error!(
        workflow_id = %execution.workflow_id,
        execution_id = %execution.id,
        node_id = ?err.node_id,
        error = %err.message,
        "workflow_failed"
      ),
    }
    self.notifier.notify(event);
    execution
  }

  async fn record_node_state(&self, execution: &mut Execution, state: NodeState) {
    self.save_node_state(&execution.id, &state).await;
    execution.node_states.insert(state.node_id.clone(), state);
  }

  async fn save_node_state(&self, execution_id: &str, state: &NodeState) {
    if let Err(e) = self.store.put_node_state(execution_id, state).await {
      warn!(node_id = %state.node_id, error = %e, "node_state_write_failed");
    }
  }

  async fn save_execution(&self, execution: &Execution) {
    if let Err(e) = self.store.update_execution(execution).await {
      warn!(error = %e, "execution_write_failed");
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
