//! Per-execution variable state.
//!
//! Variables are addressed by dot-separated paths rooted at one of:
//! - `inputs.<name>` - trigger inputs
//! - `nodes.<node_id>` - output of a completed node
//! - `loop.<node_id>` - current item binding of a loop node
//!
//! A path with any other first segment is looked up in node outputs first,
//! then in inputs, so `fetch.body` and `city` both resolve. Array elements
//! are addressed by numeric segments (`nodes.search.passages.0.content`).

use std::collections::HashMap;

use serde_json::{Map, Value};
use weft_store::LogEntry;

/// Mutable state of one execution. Owned by the scheduler, never shared.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
  inputs: Value,
  outputs: Map<String, Value>,
  last_output: Option<Value>,
  loop_counters: HashMap<String, u32>,
  loop_bindings: Map<String, Value>,
  total_tokens: u64,
  log: Vec<LogEntry>,
}

impl ExecutionContext {
  /// Seed a context with trigger inputs.
  pub fn new(inputs: Value) -> Self {
    Self {
      inputs,
      ..Default::default()
    }
  }

  pub fn inputs(&self) -> &Value {
    &self.inputs
  }

  /// Resolve a variable path. Missing segments yield `None`.
  pub fn get_variable(&self, path: &str) -> Option<Value> {
    let path = path.trim();
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let root = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match root {
      "inputs" => walk(&self.inputs, &rest),
      "nodes" => match rest.split_first() {
        Some((node_id, tail)) => walk(self.outputs.get(*node_id)?, tail),
        None => Some(Value::Object(self.outputs.clone())),
      },
      "loop" => match rest.split_first() {
        Some((node_id, tail)) => walk(self.loop_bindings.get(*node_id)?, tail),
        None => Some(Value::Object(self.loop_bindings.clone())),
      },
      name => match self.outputs.get(name) {
        Some(output) => walk(output, &rest),
        None => walk(self.inputs.get(name)?, &rest),
      },
    }
  }

  /// Record a node's output under its id.
  pub fn set_output(&mut self, node_id: &str, value: Value) {
    self.last_output = Some(value.clone());
    self.outputs.insert(node_id.to_string(), value);
  }

  /// Output of the most recently completed node.
  pub fn last_output(&self) -> Option<&Value> {
    self.last_output.as_ref()
  }

  pub fn record_tokens(&mut self, tokens: u64) {
    self.total_tokens = self.total_tokens.saturating_add(tokens);
  }

  pub fn total_tokens(&self) -> u64 {
    self.total_tokens
  }

  pub fn append_log(&mut self, entry: LogEntry) {
    self.log.push(entry);
  }

  pub fn log(&self) -> &[LogEntry] {
    &self.log
  }

  /// Iterations a loop node has run since it last exited.
  pub fn loop_counter(&self, node_id: &str) -> u32 {
    self.loop_counters.get(node_id).copied().unwrap_or(0)
  }

  /// Start the next iteration of a loop, binding its current item.
  pub fn advance_loop(&mut self, node_id: &str, binding: Value) -> u32 {
    let counter = self.loop_counters.entry(node_id.to_string()).or_insert(0);
    *counter += 1;
    self.loop_bindings.insert(node_id.to_string(), binding);
    *counter
  }

  /// Clear a loop's counter so an enclosing loop can re-enter it.
  pub fn reset_loop(&mut self, node_id: &str) {
    self.loop_counters.remove(node_id);
    self.loop_bindings.remove(node_id);
  }

  /// Variables exposed to templates and expressions: every input at top
  /// level, plus `inputs`, `nodes` and `loop` maps.
  pub fn template_context(&self) -> Value {
    let mut root = match &self.inputs {
      Value::Object(map) => map.clone(),
      _ => Map::new(),
    };
    root.insert("inputs".to_string(), self.inputs.clone());
    root.insert("nodes".to_string(), Value::Object(self.outputs.clone()));
    root.insert("loop".to_string(), Value::Object(self.loop_bindings.clone()));
    Value::Object(root)
  }
}

fn walk(value: &Value, segments: &[&str]) -> Option<Value> {
  let mut current = value;
  for segment in segments {
    current = match current {
      Value::Object(map) => map.get(*segment)?,
      Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(current.clone())
}
