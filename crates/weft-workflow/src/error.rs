use thiserror::Error;

/// A single static problem found in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("duplicate node id: {node_id}")]
  DuplicateNodeId { node_id: String },

  #[error("workflow has no start node")]
  MissingStart,

  #[error("workflow has more than one start node: {}", node_ids.join(", "))]
  MultipleStarts { node_ids: Vec<String> },

  #[error("duplicate edge id: {edge_id}")]
  DuplicateEdgeId { edge_id: String },

  #[error("edge '{edge_id}' references unknown node '{node_id}'")]
  DanglingEdge { edge_id: String, node_id: String },

  #[error("node '{node_id}' has no incoming edge")]
  NoIncomingEdge { node_id: String },

  #[error("no end node is reachable from the start node")]
  NoReachableEnd,

  #[error("node '{node_id}' is missing its '{branch}' edge")]
  MissingBranch { node_id: String, branch: String },

  #[error("node '{node_id}' has more than one '{branch}' edge")]
  DuplicateBranch { node_id: String, branch: String },

  #[error("edge '{edge_id}' from node '{node_id}' has unexpected branch tag '{branch}'")]
  UnexpectedBranch {
    node_id: String,
    edge_id: String,
    branch: String,
  },

  #[error("node '{node_id}' must have exactly one outgoing edge, found {count}")]
  AmbiguousNext { node_id: String, count: usize },

  #[error("end node '{node_id}' must not have outgoing edges")]
  EndHasOutgoing { node_id: String },

  #[error("node '{node_id}' is missing required field '{field}'")]
  MissingField { node_id: String, field: String },

  #[error("node '{node_id}' has invalid field '{field}': {message}")]
  InvalidField {
    node_id: String,
    field: String,
    message: String,
  },
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("invalid workflow: {}", join(.errors))]
pub struct ValidationReport {
  pub errors: Vec<ValidationError>,
}

impl ValidationReport {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  pub(crate) fn push(&mut self, error: ValidationError) {
    self.errors.push(error);
  }

  /// Turn a non-empty report into an error carrying every violation.
  pub fn into_result(self) -> Result<(), ValidationReport> {
    if self.is_valid() { Ok(()) } else { Err(self) }
  }
}

fn join(errors: &[ValidationError]) -> String {
  errors
    .iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}
