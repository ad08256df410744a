use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
  #[default]
  Draft,
  Active,
  Archived,
}

/// Comparison used by structured condition nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperator {
  #[default]
  Equals,
  NotEquals,
  Contains,
  NotContains,
  GreaterThan,
  LessThan,
  IsEmpty,
  IsNotEmpty,
}
