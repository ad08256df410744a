use std::collections::{HashMap, HashSet};

use weft_config::{EdgeDef, NodeDef, NodeKind, WorkflowDef};

use crate::error::{ValidationError, ValidationReport};
use crate::graph::Graph;

/// HTTP methods an http node may use.
const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Statically check a workflow definition.
///
/// Every violation is collected; the report is empty for a runnable graph.
pub fn validate(def: &WorkflowDef) -> ValidationReport {
  let mut report = ValidationReport::default();

  // Collect node IDs and check for duplicates. The first definition wins.
  let mut nodes: HashMap<&str, &NodeDef> = HashMap::new();
  let mut ordered: Vec<&NodeDef> = Vec::new();
  for node in &def.nodes {
    if nodes.contains_key(node.id.as_str()) {
      report.push(ValidationError::DuplicateNodeId {
        node_id: node.id.clone(),
      });
    } else {
      nodes.insert(node.id.as_str(), node);
      ordered.push(node);
    }
  }

  let starts: Vec<&str> = ordered
    .iter()
    .filter(|n| matches!(n.kind, NodeKind::Start))
    .map(|n| n.id.as_str())
    .collect();
  match starts.len() {
    0 => report.push(ValidationError::MissingStart),
    1 => {}
    _ => report.push(ValidationError::MultipleStarts {
      node_ids: starts.iter().map(|s| s.to_string()).collect(),
    }),
  }

  let mut edge_ids = HashSet::new();
  for edge in &def.edges {
    if !edge_ids.insert(edge.id.as_str()) {
      report.push(ValidationError::DuplicateEdgeId {
        edge_id: edge.id.clone(),
      });
    }
    for endpoint in [&edge.source, &edge.target] {
      if !nodes.contains_key(endpoint.as_str()) {
        report.push(ValidationError::DanglingEdge {
          edge_id: edge.id.clone(),
          node_id: endpoint.clone(),
        });
      }
    }
  }

  // Dangling edges are already reported; traversal only follows the rest.
  let edges: Vec<EdgeDef> = def
    .edges
    .iter()
    .filter(|e| nodes.contains_key(e.source.as_str()) && nodes.contains_key(e.target.as_str()))
    .cloned()
    .collect();
  let graph = Graph::new(ordered.iter().map(|n| n.id.as_str()), &edges);

  for node in &ordered {
    if matches!(node.kind, NodeKind::Start) {
      continue;
    }
    if graph.upstream(&node.id).is_empty() {
      report.push(ValidationError::NoIncomingEdge {
        node_id: node.id.clone(),
      });
    }
  }

  let end_reachable = match starts.as_slice() {
    [start] => graph.reachable_from(start).iter().any(|id| {
      nodes
        .get(id.as_str())
        .is_some_and(|n| matches!(n.kind, NodeKind::End(_)))
    }),
    _ => ordered.iter().any(|n| matches!(n.kind, NodeKind::End(_))),
  };
  if !end_reachable {
    report.push(ValidationError::NoReachableEnd);
  }

  for node in &ordered {
    check_outgoing(node, &graph, &mut report);
    check_config(node, &mut report);
  }

  report
}

fn check_outgoing(node: &NodeDef, graph: &Graph, report: &mut ValidationReport) {
  let outgoing = graph.outgoing(&node.id);

  if matches!(node.kind, NodeKind::End(_)) {
    if !outgoing.is_empty() {
      report.push(ValidationError::EndHasOutgoing {
        node_id: node.id.clone(),
      });
    }
    return;
  }

  let required = node.kind.required_branches();
  if required.is_empty() {
    if outgoing.len() != 1 {
      report.push(ValidationError::AmbiguousNext {
        node_id: node.id.clone(),
        count: outgoing.len(),
      });
    }
    for edge in outgoing {
      if let Some(branch) = &edge.branch {
        report.push(ValidationError::UnexpectedBranch {
          node_id: node.id.clone(),
          edge_id: edge.edge_id.clone(),
          branch: branch.clone(),
        });
      }
    }
    return;
  }

  for tag in required {
    let count = outgoing
      .iter()
      .filter(|e| e.branch.as_deref() == Some(*tag))
      .count();
    match count {
      0 => report.push(ValidationError::MissingBranch {
        node_id: node.id.clone(),
        branch: tag.to_string(),
      }),
      1 => {}
      _ => report.push(ValidationError::DuplicateBranch {
        node_id: node.id.clone(),
        branch: tag.to_string(),
      }),
    }
  }
  for edge in outgoing {
    let tag = edge.branch.as_deref().unwrap_or_default();
    if !required.contains(&tag) {
      report.push(ValidationError::UnexpectedBranch {
        node_id: node.id.clone(),
        edge_id: edge.edge_id.clone(),
        branch: tag.to_string(),
      });
    }
  }
}

fn check_config(node: &NodeDef, report: &mut ValidationReport) {
  let mut require = |field: &str, value: &str| {
    if value.trim().is_empty() {
      report.push(ValidationError::MissingField {
        node_id: node.id.clone(),
        field: field.to_string(),
      });
    }
  };

  match &node.kind {
    NodeKind::Start | NodeKind::End(_) => {}
    NodeKind::Llm(cfg) => require("prompt", &cfg.prompt),
    NodeKind::Agent(cfg) => require("agent_id", &cfg.agent_id),
    NodeKind::Rag(cfg) => require("query", &cfg.query),
    NodeKind::Tool(cfg) => require("tool_name", &cfg.tool_name),
    NodeKind::Loop(cfg) => require("collection", &cfg.collection),
    NodeKind::CustomFunction(cfg) => require("expression", &cfg.expression),
    NodeKind::Http(cfg) => {
      require("url", &cfg.url);
      if !HTTP_METHODS.contains(&cfg.method.to_uppercase().as_str()) {
        report.push(ValidationError::InvalidField {
          node_id: node.id.clone(),
          field: "method".to_string(),
          message: format!("unsupported HTTP method: {}", cfg.method),
        });
      }
    }
    NodeKind::Condition(cfg) => {
      let expression = cfg.expression.as_deref().is_some_and(|s| !s.trim().is_empty());
      let variable = cfg.variable.as_deref().is_some_and(|s| !s.trim().is_empty());
      match (expression, variable) {
        (true, false) | (false, true) => {}
        (false, false) => report.push(ValidationError::MissingField {
          node_id: node.id.clone(),
          field: "expression".to_string(),
        }),
        (true, true) => report.push(ValidationError::InvalidField {
          node_id: node.id.clone(),
          field: "expression".to_string(),
          message: "expression and variable are mutually exclusive".to_string(),
        }),
      }
    }
  }
}
