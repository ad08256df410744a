use serde_json::Value;
use weft_config::{BRANCH_FALSE, BRANCH_TRUE, ConditionConfig};

use super::{NodeOutcome, template_vars};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::expression::{compare, evaluate_condition};
use crate::template::render_value;

/// Evaluate the condition and pick the `true` or `false` branch.
pub(super) fn execute(
  config: &ConditionConfig,
  ctx: &ExecutionContext,
  fuel: u64,
) -> Result<NodeOutcome, NodeError> {
  let vars = template_vars(ctx);

  let result = match (&config.expression, &config.variable) {
    (Some(expression), _) => evaluate_condition(expression, &vars, fuel)?,
    (None, Some(variable)) => {
      let expected = render_value("value", &config.value, &vars)?;
      compare(config.operator, ctx.get_variable(variable).as_ref(), &expected)
    }
    (None, None) => {
      return Err(NodeError::Expression {
        message: "condition has neither an expression nor a variable".to_string(),
      });
    }
  };

  let branch = if result { BRANCH_TRUE } else { BRANCH_FALSE };
  Ok(NodeOutcome::new(Value::Bool(result)).with_branch(branch))
}
