use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl ExecutionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExecutionStatus::Pending => "pending",
      ExecutionStatus::Running => "running",
      ExecutionStatus::Completed => "completed",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Cancelled => "cancelled",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
    )
  }

  /// Statuses only move forward: pending -> running -> terminal, or straight
  /// from pending to a terminal status.
  pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
    match self {
      ExecutionStatus::Pending => next != ExecutionStatus::Pending,
      ExecutionStatus::Running => next.is_terminal(),
      _ => false,
    }
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Status of a single node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NodeStatus {
  Running,
  Success,
  Failure,
}

/// Classification of a terminal execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
  /// A node could not produce an output.
  NodeExecution,
  /// A loop or step bound was hit.
  SafetyLimit,
}

/// Structured error recorded on a failed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub code: ErrorCode,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
  Info,
  Warn,
  Error,
}

/// One line of the execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub level: LogLevel,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub message: String,
}

impl LogEntry {
  pub fn new(level: LogLevel, node_id: Option<&str>, message: impl Into<String>) -> Self {
    Self {
      timestamp: Utc::now(),
      level,
      node_id: node_id.map(str::to_string),
      message: message.into(),
    }
  }

  pub fn info(node_id: Option<&str>, message: impl Into<String>) -> Self {
    Self::new(LogLevel::Info, node_id, message)
  }

  pub fn warn(node_id: Option<&str>, message: impl Into<String>) -> Self {
    Self::new(LogLevel::Warn, node_id, message)
  }

  pub fn error(node_id: Option<&str>, message: impl Into<String>) -> Self {
    Self::new(LogLevel::Error, node_id, message)
  }
}

/// Live status of a node within an execution.
///
/// Created the moment the node begins. A node re-entered by a loop keeps its
/// entry; `visits` counts the entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
  pub node_id: String,
  pub node_type: String,
  pub status: NodeStatus,
  pub visits: u32,
  /// Collaborator attempts made on the latest visit.
  pub attempts: u32,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub output: Option<serde_json::Value>,
  pub error: Option<String>,
}

impl NodeState {
  /// A node that has just started its first visit.
  pub fn started(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      node_type: node_type.into(),
      status: NodeStatus::Running,
      visits: 1,
      attempts: 0,
      started_at: Utc::now(),
      completed_at: None,
      output: None,
      error: None,
    }
  }

  /// Begin another visit of the same node.
  pub fn revisit(&mut self) {
    self.visits += 1;
    self.status = NodeStatus::Running;
    self.attempts = 0;
    self.started_at = Utc::now();
    self.completed_at = None;
    self.output = None;
    self.error = None;
  }

  pub fn succeed(&mut self, output: serde_json::Value, attempts: u32) {
    self.status = NodeStatus::Success;
    self.attempts = attempts;
    self.output = Some(output);
    self.completed_at = Some(Utc::now());
  }

  pub fn fail(&mut self, error: impl Into<String>, attempts: u32) {
    self.status = NodeStatus::Failure;
    self.attempts = attempts;
    self.error = Some(error.into());
    self.completed_at = Some(Utc::now());
  }
}

/// One run of a workflow snapshot against concrete inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
  pub id: String,
  pub workflow_id: String,
  pub snapshot_id: String,
  pub status: ExecutionStatus,
  pub current_node_id: Option<String>,
  pub node_states: BTreeMap<String, NodeState>,
  pub inputs: serde_json::Value,
  pub outputs: serde_json::Map<String, serde_json::Value>,
  pub log: Vec<LogEntry>,
  pub total_tokens: u64,
  pub created_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub error: Option<ExecutionError>,
}

impl Execution {
  /// A freshly triggered execution.
  pub fn new(
    id: impl Into<String>,
    workflow_id: impl Into<String>,
    snapshot_id: impl Into<String>,
    inputs: serde_json::Value,
  ) -> Self {
    Self {
      id: id.into(),
      workflow_id: workflow_id.into(),
      snapshot_id: snapshot_id.into(),
      status: ExecutionStatus::Pending,
      current_node_id: None,
      node_states: BTreeMap::new(),
      inputs,
      outputs: serde_json::Map::new(),
      log: Vec::new(),
      total_tokens: 0,
      created_at: Utc::now(),
      started_at: None,
      completed_at: None,
      error: None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  /// Move to `next`, stamping start and completion times.
  pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), Error> {
    if !self.status.can_transition_to(next) {
      return Err(Error::InvalidTransition {
        from: self.status,
        to: next,
      });
    }

    let now = Utc::now();
    if next == ExecutionStatus::Running {
      self.started_at = Some(now);
    }
    if next.is_terminal() {
      self.completed_at = Some(now);
    }
    self.status = next;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_forward_transitions() {
    let mut execution = Execution::new("ex-1", "wf-1", "sha256:abc", serde_json::json!({}));
    assert_eq!(execution.status, ExecutionStatus::Pending);

    execution.transition(ExecutionStatus::Running).unwrap();
    assert!(execution.started_at.is_some());

    execution.transition(ExecutionStatus::Completed).unwrap();
    assert!(execution.completed_at.is_some());
    assert!(execution.is_terminal());
  }

  #[test]
  fn test_pending_may_finish_directly() {
    let mut execution = Execution::new("ex-1", "wf-1", "sha256:abc", serde_json::json!({}));
    execution.transition(ExecutionStatus::Cancelled).unwrap();
    assert!(execution.started_at.is_none());
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
  }

  #[test]
  fn test_terminal_is_final() {
    let mut execution = Execution::new("ex-1", "wf-1", "sha256:abc", serde_json::json!({}));
    execution.transition(ExecutionStatus::Running).unwrap();
    execution.transition(ExecutionStatus::Failed).unwrap();

    let err = execution
      .transition(ExecutionStatus::Completed)
      .unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidTransition {
        from: ExecutionStatus::Failed,
        to: ExecutionStatus::Completed
      }
    ));
    assert_eq!(execution.status, ExecutionStatus::Failed);

    assert!(execution.transition(ExecutionStatus::Running).is_err());
  }

  #[test]
  fn test_running_never_goes_back() {
    assert!(!ExecutionStatus::Running.can_transition_to(ExecutionStatus::Pending));
    assert!(!ExecutionStatus::Running.can_transition_to(ExecutionStatus::Running));
    assert!(!ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Pending));
  }

  #[test]
  fn test_node_state_revisit() {
    let mut state = NodeState::started("loop", "loop");
    state.succeed(serde_json::json!({ "iterations": 0 }), 1);
    state.revisit();

    assert_eq!(state.visits, 2);
    assert_eq!(state.status, NodeStatus::Running);
    assert!(state.completed_at.is_none());
    assert_eq!(state.output, None);
  }
}
