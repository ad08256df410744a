//! Node executors.
//!
//! One executor per [`NodeKind`]. Dispatch is an exhaustive match, so adding a
//! node kind without an executor does not compile.

mod agent;
mod condition;
mod function;
mod http;
mod llm;
mod loops;
mod rag;
mod tool;

use std::time::Duration;

use serde_json::Value;
use weft_config::{EndConfig, NodeDef, NodeKind};
use weft_host::Collaborators;

use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::retry::{RetryNotice, RetryPolicy};

/// Output key used by end nodes that do not name one.
pub const DEFAULT_OUTPUT_KEY: &str = "final";

/// Which edge the scheduler follows after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextEdge {
  /// The single untagged outgoing edge.
  Default,
  /// The edge tagged with this branch.
  Branch(String),
  /// No edge: the run completes, publishing the output under `output_key`.
  Finish { output_key: String },
}

/// Result of running one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
  pub output: Value,
  pub next_edge: NextEdge,
  /// Tokens consumed by collaborator calls.
  pub tokens: u64,
  /// Collaborator attempts made; 0 for nodes that call nothing.
  pub attempts: u32,
}

impl NodeOutcome {
  pub fn new(output: Value) -> Self {
    Self {
      output,
      next_edge: NextEdge::Default,
      tokens: 0,
      attempts: 0,
    }
  }

  pub fn with_branch(mut self, branch: &str) -> Self {
    self.next_edge = NextEdge::Branch(branch.to_string());
    self
  }

  pub fn with_tokens(mut self, tokens: u64) -> Self {
    self.tokens = tokens;
    self
  }

  pub fn with_attempts(mut self, attempts: u32) -> Self {
    self.attempts = attempts;
    self
  }
}

/// Everything an executor needs besides the node and the context.
pub struct ExecEnv<'a> {
  pub collaborators: &'a Collaborators,
  pub config: &'a RuntimeConfig,
  /// Told about every collaborator attempt that is about to be retried.
  pub on_retry: &'a (dyn Fn(RetryNotice) + Send + Sync),
}

impl ExecEnv<'_> {
  /// The engine retry policy, with the node's attempt budget if it sets one.
  pub fn retry_policy(&self, node: &NodeDef) -> RetryPolicy {
    match node.max_retry_attempts {
      Some(attempts) => self.config.retry.with_max_attempts(attempts),
      None => self.config.retry,
    }
  }

  /// The node's own timeout, or `default`.
  pub fn timeout(&self, node: &NodeDef, default: Duration) -> Duration {
    node.timeout_ms.map(Duration::from_millis).unwrap_or(default)
  }
}

/// Run a node against the current context.
///
/// Only loop nodes write to the context; everything else reads it and returns
/// an outcome for the scheduler to record.
pub async fn execute(
  node: &NodeDef,
  env: &ExecEnv<'_>,
  ctx: &mut ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  match &node.kind {
    NodeKind::Start => Ok(NodeOutcome::new(ctx.inputs().clone())),
    NodeKind::End(config) => Ok(end(config, ctx)),
    NodeKind::Llm(config) => llm::execute(node, config, env, ctx).await,
    NodeKind::Agent(config) => agent::execute(node, config, env, ctx).await,
    NodeKind::Rag(config) => rag::execute(node, config, env, ctx).await,
    NodeKind::Tool(config) => tool::execute(node, config, env, ctx).await,
    NodeKind::Http(config) => http::execute(node, config, env, ctx).await,
    NodeKind::Condition(config) => condition::execute(config, ctx, env.config.function_fuel),
    NodeKind::Loop(config) => loops::execute(node, config, env, ctx),
    NodeKind::CustomFunction(config) => function::execute(node, config, env, ctx).await,
  }
}

fn end(config: &EndConfig, ctx: &ExecutionContext) -> NodeOutcome {
  let output = match &config.output_from {
    Some(path) => ctx.get_variable(path),
    None => ctx.last_output().cloned(),
  }
  .unwrap_or(Value::Null);

  NodeOutcome {
    next_edge: NextEdge::Finish {
      output_key: config
        .output_key
        .clone()
        .unwrap_or_else(|| DEFAULT_OUTPUT_KEY.to_string()),
    },
    ..NodeOutcome::new(output)
  }
}

/// Template variables for the current context.
fn template_vars(ctx: &ExecutionContext) -> minijinja::Value {
  minijinja::Value::from_serialize(ctx.template_context())
}

#[cfg(test)]
static IGNORE_RETRIES: fn(RetryNotice) = |_| {};

#[cfg(test)]
pub(crate) fn test_env<'a>(
  collaborators: &'a Collaborators,
  config: &'a RuntimeConfig,
) -> ExecEnv<'a> {
  ExecEnv {
    collaborators,
    config,
    on_retry: &IGNORE_RETRIES,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_start_outputs_inputs() {
    let collaborators = Collaborators::new();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);
    let mut ctx = ExecutionContext::new(json!({ "city": "Bangkok" }));

    let outcome = execute(&NodeDef::new("start", NodeKind::Start), &env, &mut ctx)
      .await
      .unwrap();
    assert_eq!(outcome.output, json!({ "city": "Bangkok" }));
    assert_eq!(outcome.next_edge, NextEdge::Default);
    assert_eq!(outcome.attempts, 0);
  }

  #[test]
  fn test_end_defaults_to_last_output() {
    let mut ctx = ExecutionContext::new(json!({}));
    ctx.set_output("summarize", json!("sunny"));

    let outcome = end(&EndConfig::default(), &ctx);
    assert_eq!(outcome.output, json!("sunny"));
    assert_eq!(
      outcome.next_edge,
      NextEdge::Finish {
        output_key: "final".to_string()
      }
    );
  }

  #[test]
  fn test_end_reads_configured_variable() {
    let mut ctx = ExecutionContext::new(json!({}));
    ctx.set_output("fetch", json!({ "body": { "temp": 31 } }));
    ctx.set_output("later", json!("ignored"));

    let config = EndConfig {
      output_from: Some("nodes.fetch.body.temp".to_string()),
      output_key: Some("temperature".to_string()),
    };
    let outcome = end(&config, &ctx);
    assert_eq!(outcome.output, json!(31));
    assert_eq!(
      outcome.next_edge,
      NextEdge::Finish {
        output_key: "temperature".to_string()
      }
    );
  }

  #[test]
  fn test_node_overrides() {
    let collaborators = Collaborators::new();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);
    let mut node = NodeDef::new("n", NodeKind::Start);
    assert_eq!(env.retry_policy(&node).max_attempts, 3);
    assert_eq!(env.timeout(&node, Duration::from_secs(9)), Duration::from_secs(9));

    node.max_retry_attempts = Some(1);
    node.timeout_ms = Some(250);
    assert_eq!(env.retry_policy(&node).max_attempts, 1);
    assert_eq!(env.timeout(&node, Duration::from_secs(9)), Duration::from_millis(250));
  }
}
