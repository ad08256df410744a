use serde_json::json;
use weft_config::{NodeDef, RagConfig};

use super::{ExecEnv, NodeOutcome, template_vars};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::retry::call_with_retry;
use crate::template::render;

/// Passages returned when a rag node does not set `top_k`.
pub const DEFAULT_TOP_K: usize = 5;

pub(super) async fn execute(
  node: &NodeDef,
  config: &RagConfig,
  env: &ExecEnv<'_>,
  ctx: &ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let query = render("query", &config.query, &template_vars(ctx))?;
  let top_k = config.top_k.unwrap_or(DEFAULT_TOP_K);

  let retrieval = &env.collaborators.retrieval;
  let (passages, attempts) = call_with_retry(
    &env.retry_policy(node),
    env.timeout(node, env.config.collaborator_timeout()),
    env.on_retry,
    || retrieval.search(&query, &config.scope, top_k),
  )
  .await?;

  let context = passages
    .iter()
    .map(|p| p.content.as_str())
    .collect::<Vec<_>>()
    .join("\n\n");
  let output = json!({
    "context": context,
    "count": passages.len(),
    "passages": passages,
  });
  Ok(NodeOutcome::new(output).with_attempts(attempts))
}
