use std::collections::{HashMap, HashSet, VecDeque};

use weft_config::EdgeDef;

/// An outgoing connection, as seen from its source node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
  pub edge_id: String,
  pub target: String,
  pub branch: Option<String>,
}

/// Graph structure for traversal and analysis.
///
/// Adjacency is keyed by node id. Edges that reference unknown nodes are kept
/// so the validator can report them, but they never resolve as a next node.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// node_id -> outgoing edges in definition order.
  adjacency: HashMap<String, Vec<Outgoing>>,
  /// node_id -> upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from node ids and edges.
  pub fn new<'a>(node_ids: impl IntoIterator<Item = &'a str>, edges: &[EdgeDef]) -> Self {
    let mut adjacency: HashMap<String, Vec<Outgoing>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node_id in node_ids {
      adjacency.entry(node_id.to_string()).or_default();
      reverse_adjacency.entry(node_id.to_string()).or_default();
    }

    for edge in edges {
      adjacency
        .entry(edge.source.clone())
        .or_default()
        .push(Outgoing {
          edge_id: edge.id.clone(),
          target: edge.target.clone(),
          branch: edge.branch.clone(),
        });
      reverse_adjacency
        .entry(edge.target.clone())
        .or_default()
        .push(edge.source.clone());
    }

    Self {
      adjacency,
      reverse_adjacency,
    }
  }

  /// Outgoing edges of a node.
  pub fn outgoing(&self, node_id: &str) -> &[Outgoing] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Resolve the node that follows `node_id`.
  ///
  /// With a branch tag, the edge carrying that tag is followed. Without one,
  /// the node must have exactly one untagged outgoing edge. Fan-out would
  /// return several targets here.
  pub fn next(&self, node_id: &str, branch: Option<&str>) -> Option<&str> {
    let outgoing = self.outgoing(node_id);
    match branch {
      Some(tag) => outgoing
        .iter()
        .find(|e| e.branch.as_deref() == Some(tag))
        .map(|e| e.target.as_str()),
      None => {
        let mut untagged = outgoing.iter().filter(|e| e.branch.is_none());
        match (untagged.next(), untagged.next()) {
          (Some(edge), None) => Some(edge.target.as_str()),
          _ => None,
        }
      }
    }
  }

  /// All nodes reachable from `start`, including `start` itself.
  pub fn reachable_from(&self, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);

    while let Some(node_id) = queue.pop_front() {
      if !seen.insert(node_id.clone()) {
        continue;
      }
      for edge in self.outgoing(&node_id) {
        if !seen.contains(&edge.target) {
          queue.push_back(edge.target.clone());
        }
      }
    }

    seen
  }
}
