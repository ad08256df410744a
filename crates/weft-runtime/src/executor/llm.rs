use serde_json::Value;
use weft_config::{LlmConfig, NodeDef};
use weft_host::{CompletionParams, Prompt};

use super::{ExecEnv, NodeOutcome, template_vars};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::retry::call_with_retry;
use crate::template::render;

/// Render the prompts and ask the language model. Output is the generated text.
pub(super) async fn execute(
  node: &NodeDef,
  config: &LlmConfig,
  env: &ExecEnv<'_>,
  ctx: &ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let vars = template_vars(ctx);
  let prompt = Prompt {
    system: config
      .system_prompt
      .as_deref()
      .map(|system| render("system_prompt", system, &vars))
      .transpose()?,
    user: render("prompt", &config.prompt, &vars)?,
  };
  let params = CompletionParams {
    model: config.model.clone(),
    temperature: config.temperature,
    max_tokens: config.max_tokens,
  };

  let llm = &env.collaborators.llm;
  let (completion, attempts) = call_with_retry(
    &env.retry_policy(node),
    env.timeout(node, env.config.collaborator_timeout()),
    env.on_retry,
    || llm.complete(&prompt, &params),
  )
  .await?;

  Ok(
    NodeOutcome::new(Value::String(completion.text))
      .with_tokens(completion.tokens_used)
      .with_attempts(attempts),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RuntimeConfig;
  use crate::executor::test_env;
  use serde_json::json;
  use weft_host::{Completion, HostError};
  use weft_test_utils::{ScriptedModel, TestCollaborators};

  fn llm_node(config: LlmConfig) -> NodeDef {
    NodeDef::new("summarize", weft_config::NodeKind::Llm(config))
  }

  #[tokio::test]
  async fn test_renders_prompts_and_records_tokens() {
    let doubles = TestCollaborators::new().with_llm(ScriptedModel::replying("Hot and humid", 42));
    let collaborators = doubles.collaborators();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);

    let mut ctx = crate::ExecutionContext::new(json!({ "city": "Bangkok" }));
    ctx.set_output("fetch", json!({ "body": { "temp": 31 } }));

    let llm_config = LlmConfig {
      prompt: "Weather in {{ city }} is {{ nodes.fetch.body.temp }}C".to_string(),
      system_prompt: Some("You are terse.".to_string()),
      model: Some("small".to_string()),
      temperature: Some(0.2),
      max_tokens: Some(64),
    };
    let outcome = execute(&llm_node(llm_config.clone()), &llm_config, &env, &ctx)
      .await
      .unwrap();

    assert_eq!(outcome.output, json!("Hot and humid"));
    assert_eq!(outcome.tokens, 42);
    assert_eq!(outcome.attempts, 1);

    let calls = doubles.llm.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.user, "Weather in Bangkok is 31C");
    assert_eq!(calls[0].0.system.as_deref(), Some("You are terse."));
    assert_eq!(calls[0].1.model.as_deref(), Some("small"));
    assert_eq!(calls[0].1.max_tokens, Some(64));
  }

  #[tokio::test]
  async fn test_retries_transient_model_errors() {
    let model = ScriptedModel::replying("fine", 5)
      .then(Err(HostError::Status {
        status: 429,
        body: "slow down".to_string(),
      }))
      .then(Ok(Completion {
        text: "second try".to_string(),
        tokens_used: 7,
      }));
    let doubles = TestCollaborators::new().with_llm(model);
    let collaborators = doubles.collaborators();
    let mut config = RuntimeConfig::default();
    config.retry.initial_delay_ms = 1;
    let env = test_env(&collaborators, &config);

    let llm_config = LlmConfig {
      prompt: "hi".to_string(),
      ..Default::default()
    };
    let ctx = crate::ExecutionContext::new(json!({}));
    let outcome = execute(&llm_node(llm_config.clone()), &llm_config, &env, &ctx)
      .await
      .unwrap();

    assert_eq!(outcome.output, json!("second try"));
    assert_eq!(outcome.attempts, 2);
  }

  #[tokio::test]
  async fn test_bad_template_fails_before_calling() {
    let doubles = TestCollaborators::new();
    let collaborators = doubles.collaborators();
    let config = RuntimeConfig::default();
    let env = test_env(&collaborators, &config);

    let llm_config = LlmConfig {
      prompt: "{% if %}".to_string(),
      ..Default::default()
    };
    let ctx = crate::ExecutionContext::new(json!({}));
    let err = execute(&llm_node(llm_config.clone()), &llm_config, &env, &ctx)
      .await
      .unwrap_err();

    assert!(matches!(err, NodeError::Template { ref field, .. } if field == "prompt"));
    assert!(doubles.llm.calls().is_empty());
  }
}
