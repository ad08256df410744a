use weft_config::{FunctionConfig, NodeDef};

use super::{ExecEnv, NodeOutcome};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::expression::evaluate_function;

pub(super) async fn execute(
  node: &NodeDef,
  config: &FunctionConfig,
  env: &ExecEnv<'_>,
  ctx: &ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let fuel = config.fuel.unwrap_or(env.config.function_fuel);
  let timeout = env.timeout(node, env.config.function_timeout());

  let output = evaluate_function(
    config.expression.clone(),
    ctx.template_context(),
    fuel,
    timeout,
  )
  .await?;
  Ok(NodeOutcome::new(output))
}
