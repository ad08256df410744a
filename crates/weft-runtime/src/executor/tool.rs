use weft_config::{NodeDef, ToolConfig};

use super::{ExecEnv, NodeOutcome, template_vars};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::retry::call_with_retry;
use crate::template::render_value;

pub(super) async fn execute(
  node: &NodeDef,
  config: &ToolConfig,
  env: &ExecEnv<'_>,
  ctx: &ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let args = render_value("args", &config.args, &template_vars(ctx))?;

  let tools = &env.collaborators.tools;
  let (output, attempts) = call_with_retry(
    &env.retry_policy(node),
    env.timeout(node, env.config.collaborator_timeout()),
    env.on_retry,
    || tools.invoke(&config.tool_name, args.clone()),
  )
  .await?;

  Ok(NodeOutcome::new(output).with_attempts(attempts))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RuntimeConfig;
  use crate::executor::test_env;
  use serde_json::json;
  use weft_config::NodeKind;
  use weft_host::HostError;
  use weft_test_utils::{TestCollaborators, ToolBox};

  fn tool_node(tool_name: &str, args: serde_json::Value) -> (NodeDef, ToolConfig) {
    let config = ToolConfig {
      tool_name: tool_name.to_string(),
      args,
    };
    (NodeDef::new("convert", NodeKind::Tool(config.clone())), config)
  }

  #[tokio::test]
  async fn test_invokes_with_rendered_args() {
    let doubles = TestCollaborators::new().with_tools(
      ToolBox::new().with_tool("fx", |args| Ok(json!({ "converted": args["amount"] }))),
    );
    let collaborators = doubles.collaborators();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);

    let (node, tool_config) = tool_node("fx", json!({ "amount": 10, "to": "{{ currency }}" }));
    let ctx = ExecutionContext::new(json!({ "currency": "THB" }));
    let outcome = execute(&node, &tool_config, &env, &ctx).await.unwrap();

    assert_eq!(outcome.output, json!({ "converted": 10 }));
    assert_eq!(
      doubles.tools.calls(),
      vec![("fx".to_string(), json!({ "amount": 10, "to": "THB" }))]
    );
  }

  #[tokio::test]
  async fn test_unknown_tool_is_not_retried() {
    let doubles = TestCollaborators::new();
    let collaborators = doubles.collaborators();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);

    let (node, tool_config) = tool_node("missing", json!({}));
    let err = execute(&node, &tool_config, &env, &ExecutionContext::new(json!({})))
      .await
      .unwrap_err();

    match err {
      NodeError::Collaborator { attempts, source } => {
        assert_eq!(attempts, 1);
        assert!(matches!(source, HostError::Rejected(_)));
      }
      other => panic!("expected collaborator error, got {other:?}"),
    }
  }
}
