//! Node error types.

use weft_host::HostError;
use weft_store::ErrorCode;

/// A bound that stops runaway executions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyLimit {
  #[error("loop limit exceeded after {limit} iterations")]
  LoopLimitExceeded { limit: u32 },

  #[error("step limit exceeded after {limit} steps")]
  StepLimitExceeded { limit: u64 },
}

/// Errors a node can fail with. Any of them fails the execution.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  /// A collaborator call failed permanently or ran out of retries.
  #[error("{source} (after {attempts} attempt(s))")]
  Collaborator {
    attempts: u32,
    #[source]
    source: HostError,
  },

  /// A template in the node config failed to render.
  #[error("template error in '{field}': {message}")]
  Template { field: String, message: String },

  /// A condition expression failed to compile or evaluate.
  #[error("expression error: {message}")]
  Expression { message: String },

  /// A custom function failed, ran out of fuel, timed out or panicked.
  #[error("custom function failed: {message}")]
  Function { message: String },

  /// The node's executor or one of its collaborators panicked.
  #[error("node panicked: {message}")]
  Panicked { message: String },

  /// No outgoing edge matches the node's result.
  #[error("no outgoing edge for branch '{}'", branch.as_deref().unwrap_or("default"))]
  MissingEdge { branch: Option<String> },

  #[error(transparent)]
  SafetyLimit(#[from] SafetyLimit),
}

impl NodeError {
  /// Collaborator attempts made before the node failed.
  pub fn attempts(&self) -> u32 {
    match self {
      NodeError::Collaborator { attempts, .. } => *attempts,
      _ => 0,
    }
  }

  /// Persisted error classification.
  pub fn code(&self) -> ErrorCode {
    match self {
      NodeError::SafetyLimit(_) => ErrorCode::SafetyLimit,
      _ => ErrorCode::NodeExecution,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_codes_and_messages() {
    let err = NodeError::from(SafetyLimit::LoopLimitExceeded { limit: 5 });
    assert_eq!(err.code(), ErrorCode::SafetyLimit);
    assert_eq!(err.to_string(), "loop limit exceeded after 5 iterations");

    let err = NodeError::Collaborator {
      attempts: 3,
      source: HostError::Status {
        status: 503,
        body: "busy".to_string(),
      },
    };
    assert_eq!(err.code(), ErrorCode::NodeExecution);
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.to_string(), "HTTP 503: busy (after 3 attempt(s))");

    let err = NodeError::Panicked {
      message: "provider bug".to_string(),
    };
    assert_eq!(err.code(), ErrorCode::NodeExecution);
    assert_eq!(err.to_string(), "node panicked: provider bug");

    let err = NodeError::MissingEdge { branch: None };
    assert_eq!(err.to_string(), "no outgoing edge for branch 'default'");
  }
}
