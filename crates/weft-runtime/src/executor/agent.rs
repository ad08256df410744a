use serde_json::json;
use weft_config::{AgentConfig, NodeDef};

use super::{ExecEnv, NodeOutcome, template_vars};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::retry::call_with_retry;
use crate::template::render;

pub(super) async fn execute(
  node: &NodeDef,
  config: &AgentConfig,
  env: &ExecEnv<'_>,
  ctx: &ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let vars = template_vars(ctx);
  let input = render("input", &config.input, &vars)?;
  let hint = config
    .context
    .as_deref()
    .map(|hint| render("context", hint, &vars))
    .transpose()?;

  let agents = &env.collaborators.agents;
  let (reply, attempts) = call_with_retry(
    &env.retry_policy(node),
    env.timeout(node, env.config.collaborator_timeout()),
    env.on_retry,
    || agents.run(&config.agent_id, &input, hint.as_deref()),
  )
  .await?;

  let output = json!({
    "text": reply.text,
    "tools_used": reply.tools_used,
    "sources": reply.sources,
  });
  Ok(
    NodeOutcome::new(output)
      .with_tokens(reply.tokens_used)
      .with_attempts(attempts),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RuntimeConfig;
  use crate::executor::test_env;
  use weft_config::NodeKind;
  use weft_test_utils::TestCollaborators;

  #[tokio::test]
  async fn test_delegates_rendered_input() {
    let doubles = TestCollaborators::new();
    let collaborators = doubles.collaborators();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);

    let agent_config = AgentConfig {
      agent_id: "planner".to_string(),
      input: "Plan a trip to {{ city }}".to_string(),
      context: Some("budget {{ inputs.budget }}".to_string()),
    };
    let node = NodeDef::new("plan", NodeKind::Agent(agent_config.clone()));
    let ctx = ExecutionContext::new(json!({ "city": "Hanoi", "budget": 300 }));

    let outcome = execute(&node, &agent_config, &env, &ctx).await.unwrap();

    assert_eq!(outcome.output["text"], "planner: Plan a trip to Hanoi");
    assert!(outcome.output["tools_used"].is_array());
    assert_eq!(outcome.tokens, 3);
    assert_eq!(
      doubles.agents.calls(),
      vec![(
        "planner".to_string(),
        "Plan a trip to Hanoi".to_string(),
        Some("budget 300".to_string())
      )]
    );
  }
}
