use std::collections::HashMap;

use sha2::{Digest, Sha256};
use weft_config::{NodeDef, NodeKind, WorkflowDef};

use crate::error::ValidationReport;
use crate::graph::Graph;
use crate::validate::validate;

/// An immutable, validated copy of a workflow definition.
///
/// Executions hold a snapshot for their whole lifetime, so later edits to the
/// definition never affect a run in flight.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  /// `sha256:<hex>` of the canonical JSON of the definition.
  pub snapshot_id: String,
  nodes: HashMap<String, NodeDef>,
  start_node: Option<String>,
  graph: Graph,
}

impl Workflow {
  /// Validate a definition and capture it.
  pub fn snapshot(def: &WorkflowDef) -> Result<Self, ValidationReport> {
    validate(def).into_result()?;
    Ok(Self::unchecked(def))
  }

  /// Capture a definition without validating it.
  ///
  /// The runtime still fails cleanly on a malformed graph; this exists for
  /// callers that validated elsewhere.
  pub fn unchecked(def: &WorkflowDef) -> Self {
    let mut nodes = HashMap::new();
    for node in &def.nodes {
      nodes.entry(node.id.clone()).or_insert_with(|| node.clone());
    }
    let start_node = def
      .nodes
      .iter()
      .find(|n| matches!(n.kind, NodeKind::Start))
      .map(|n| n.id.clone());
    let graph = Graph::new(def.nodes.iter().map(|n| n.id.as_str()), &def.edges);

    Self {
      workflow_id: def.id.clone(),
      name: def.name.clone(),
      snapshot_id: snapshot_id(def),
      nodes,
      start_node,
      graph,
    }
  }

  /// The traversal graph.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.get(node_id)
  }

  pub fn start_node(&self) -> Option<&NodeDef> {
    self.start_node.as_deref().and_then(|id| self.get_node(id))
  }

  /// Resolve the node that follows `node_id` along `branch`.
  pub fn next(&self, node_id: &str, branch: Option<&str>) -> Option<&NodeDef> {
    self
      .graph
      .next(node_id, branch)
      .and_then(|target| self.get_node(target))
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }
}

/// Content-derived id of a definition.
///
/// Config maps are `BTreeMap`s and JSON objects are sorted, so serializing the
/// same definition always yields the same bytes.
pub fn snapshot_id(def: &WorkflowDef) -> String {
  let canonical = serde_json::to_vec(def).unwrap_or_default();
  format!("sha256:{}", hex::encode(Sha256::digest(&canonical)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_config::{EdgeDef, EndConfig, LlmConfig, WorkflowStatus};

  fn def() -> WorkflowDef {
    WorkflowDef {
      id: "wf-1".to_string(),
      name: "Summarize".to_string(),
      description: None,
      status: WorkflowStatus::Active,
      nodes: vec![
        NodeDef::new("start", NodeKind::Start),
        NodeDef::new(
          "summarize",
          NodeKind::Llm(LlmConfig {
            prompt: "Summarize {{ text }}".to_string(),
            ..Default::default()
          }),
        ),
        NodeDef::new("end", NodeKind::End(EndConfig::default())),
      ],
      edges: vec![
        EdgeDef::new("e1", "start", "summarize"),
        EdgeDef::new("e2", "summarize", "end"),
      ],
    }
  }

  #[test]
  fn test_snapshot_valid_definition() {
    let workflow = Workflow::snapshot(&def()).unwrap();

    assert_eq!(workflow.workflow_id, "wf-1");
    assert_eq!(workflow.node_count(), 3);
    assert_eq!(workflow.start_node().map(|n| n.id.as_str()), Some("start"));
    assert_eq!(
      workflow.next("start", None).map(|n| n.id.as_str()),
      Some("summarize")
    );
    assert!(workflow.next("end", None).is_none());
  }

  #[test]
  fn test_snapshot_rejects_invalid_definition() {
    let mut invalid = def();
    invalid.edges.pop();

    let report = Workflow::snapshot(&invalid).unwrap_err();
    assert!(!report.errors.is_empty());
  }

  #[test]
  fn test_snapshot_id_is_content_derived() {
    let a = Workflow::snapshot(&def()).unwrap();
    let b = Workflow::snapshot(&def()).unwrap();
    assert_eq!(a.snapshot_id, b.snapshot_id);
    assert!(a.snapshot_id.starts_with("sha256:"));
    assert_eq!(a.snapshot_id.len(), "sha256:".len() + 64);

    let mut edited = def();
    edited.name = "Summarize v2".to_string();
    let c = Workflow::snapshot(&edited).unwrap();
    assert_ne!(a.snapshot_id, c.snapshot_id);
  }
}
