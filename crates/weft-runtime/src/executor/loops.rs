use serde_json::{Value, json};
use weft_config::{BRANCH_CONTINUE, BRANCH_EXIT, LoopConfig, NodeDef};

use super::{ExecEnv, NodeOutcome};
use crate::context::ExecutionContext;
use crate::error::{NodeError, SafetyLimit};

/// Advance the loop by one item, or leave it.
///
/// Each visit either binds the next item to `loop.<id>` and takes the
/// `continue` branch, or resets the counter and takes `exit`. Running out of
/// budget with items left fails the run instead of silently truncating.
pub(super) fn execute(
  node: &NodeDef,
  config: &LoopConfig,
  env: &ExecEnv<'_>,
  ctx: &mut ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let items = match ctx.get_variable(collection_path(&config.collection)) {
    Some(Value::Array(items)) => items,
    _ => Vec::new(),
  };
  let limit = match config.max_iterations {
    Some(max) => max.min(env.config.max_iterations),
    None => env.config.max_iterations,
  };
  let ran = ctx.loop_counter(&node.id) as usize;

  if ran < items.len().min(limit as usize) {
    let binding = json!({
      "item": items[ran],
      "index": ran,
      "count": items.len(),
    });
    ctx.advance_loop(&node.id, binding.clone());
    return Ok(NodeOutcome::new(binding).with_branch(BRANCH_CONTINUE));
  }

  if ran < items.len() {
    return Err(SafetyLimit::LoopLimitExceeded { limit }.into());
  }

  ctx.reset_loop(&node.id);
  Ok(NodeOutcome::new(json!({ "iterations": ran })).with_branch(BRANCH_EXIT))
}

/// Accept `inputs.items` as well as `{{ inputs.items }}`.
fn collection_path(collection: &str) -> &str {
  let trimmed = collection.trim();
  trimmed
    .strip_prefix("{{")
    .and_then(|rest| rest.strip_suffix("}}"))
    .map(str::trim)
    .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RuntimeConfig;
  use crate::executor::{NextEdge, test_env};
  use weft_config::NodeKind;
  use weft_host::Collaborators;

  fn loop_node(collection: &str, max_iterations: Option<u32>) -> (NodeDef, LoopConfig) {
    let config = LoopConfig {
      collection: collection.to_string(),
      max_iterations,
    };
    (NodeDef::new("each", NodeKind::Loop(config.clone())), config)
  }

  #[test]
  fn test_iterates_then_exits() {
    let collaborators = Collaborators::new();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);
    let (node, loop_config) = loop_node("inputs.cities", None);
    let mut ctx = ExecutionContext::new(json!({ "cities": ["Hanoi", "Hue"] }));

    let first = execute(&node, &loop_config, &env, &mut ctx).unwrap();
    assert_eq!(first.next_edge, NextEdge::Branch("continue".to_string()));
    assert_eq!(first.output, json!({ "item": "Hanoi", "index": 0, "count": 2 }));
    assert_eq!(ctx.get_variable("loop.each.item"), Some(json!("Hanoi")));

    execute(&node, &loop_config, &env, &mut ctx).unwrap();
    assert_eq!(ctx.get_variable("loop.each.item"), Some(json!("Hue")));

    let done = execute(&node, &loop_config, &env, &mut ctx).unwrap();
    assert_eq!(done.next_edge, NextEdge::Branch("exit".to_string()));
    assert_eq!(done.output, json!({ "iterations": 2 }));
    assert_eq!(ctx.loop_counter("each"), 0);
  }

  #[test]
  fn test_limit_exceeded_after_exactly_limit_iterations() {
    let collaborators = Collaborators::new();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);
    let (node, loop_config) = loop_node("inputs.items", Some(5));
    let items: Vec<u32> = (0..100).collect();
    let mut ctx = ExecutionContext::new(json!({ "items": items }));

    for _ in 0..5 {
      let outcome = execute(&node, &loop_config, &env, &mut ctx).unwrap();
      assert_eq!(outcome.next_edge, NextEdge::Branch("continue".to_string()));
    }
    let err = execute(&node, &loop_config, &env, &mut ctx).unwrap_err();
    assert!(matches!(
      err,
      NodeError::SafetyLimit(SafetyLimit::LoopLimitExceeded { limit: 5 })
    ));
    assert_eq!(ctx.loop_counter("each"), 5);
  }

  #[test]
  fn test_engine_bound_caps_node_limit() {
    let collaborators = Collaborators::new();
    let config = RuntimeConfig {
      max_iterations: 2,
      ..Default::default()
    };
    let env = test_env(&collaborators, &config);
    let (node, loop_config) = loop_node("inputs.items", Some(50));
    let mut ctx = ExecutionContext::new(json!({ "items": [1, 2, 3] }));

    execute(&node, &loop_config, &env, &mut ctx).unwrap();
    execute(&node, &loop_config, &env, &mut ctx).unwrap();
    let err = execute(&node, &loop_config, &env, &mut ctx).unwrap_err();
    assert_eq!(err.to_string(), "loop limit exceeded after 2 iterations");
  }

  #[test]
  fn test_missing_or_scalar_collection_exits() {
    let collaborators = Collaborators::new();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);
    let mut ctx = ExecutionContext::new(json!({ "name": "not a list" }));

    for collection in ["inputs.absent", "{{ inputs.name }}"] {
      let (node, loop_config) = loop_node(collection, None);
      let outcome = execute(&node, &loop_config, &env, &mut ctx).unwrap();
      assert_eq!(outcome.next_edge, NextEdge::Branch("exit".to_string()));
      assert_eq!(outcome.output, json!({ "iterations": 0 }));
    }
  }

  #[test]
  fn test_collection_path_accepts_template_braces() {
    assert_eq!(collection_path(" {{ inputs.items }} "), "inputs.items");
    assert_eq!(collection_path("nodes.search.passages"), "nodes.search.passages");
  }
}
