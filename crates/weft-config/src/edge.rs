use serde::{Deserialize, Serialize};

/// Branch tag taken by a condition node that evaluated to true.
pub const BRANCH_TRUE: &str = "true";
/// Branch tag taken by a condition node that evaluated to false.
pub const BRANCH_FALSE: &str = "false";
/// Branch tag taken by a loop node while items remain.
pub const BRANCH_CONTINUE: &str = "continue";
/// Branch tag taken by a loop node once the collection is exhausted.
pub const BRANCH_EXIT: &str = "exit";

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub id: String,
  pub source: String,
  pub target: String,
  /// Branch selector for condition and loop nodes. The editor stores this as
  /// the edge label.
  #[serde(default, alias = "label", skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
}

impl EdgeDef {
  /// Create an untagged edge.
  pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      source: source.into(),
      target: target.into(),
      branch: None,
    }
  }

  /// Create an edge carrying a branch tag.
  pub fn tagged(
    id: impl Into<String>,
    source: impl Into<String>,
    target: impl Into<String>,
    branch: impl Into<String>,
  ) -> Self {
    Self {
      branch: Some(branch.into()),
      ..Self::new(id, source, target)
    }
  }
}
