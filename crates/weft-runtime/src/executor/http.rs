use std::collections::BTreeMap;

use serde_json::json;
use weft_config::{HttpConfig, NodeDef};
use weft_host::{HostError, HttpRequest};

use super::{ExecEnv, NodeOutcome, template_vars};
use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::retry::call_with_retry;
use crate::template::{render, render_value};

/// Issue the configured request. Any non-2xx response is an error, so 5xx and
/// 429 go through the retry policy and everything else fails the node.
pub(super) async fn execute(
  node: &NodeDef,
  config: &HttpConfig,
  env: &ExecEnv<'_>,
  ctx: &ExecutionContext,
) -> Result<NodeOutcome, NodeError> {
  let vars = template_vars(ctx);

  let mut headers = BTreeMap::new();
  for (name, value) in &config.headers {
    headers.insert(
      name.clone(),
      render(&format!("headers.{name}"), value, &vars)?,
    );
  }

  let timeout = env.timeout(node, env.config.http_timeout());
  let request = HttpRequest {
    method: config.method.to_uppercase(),
    url: render("url", &config.url, &vars)?,
    headers,
    body: config
      .body
      .as_ref()
      .map(|body| render_value("body", body, &vars))
      .transpose()?,
    timeout,
  };

  let http = &env.collaborators.http;
  let (response, attempts) =
    call_with_retry(&env.retry_policy(node), timeout, env.on_retry, || {
      let request = request.clone();
      async move {
        let response = http.request(request).await?;
        if !response.is_success() {
          return Err(HostError::Status {
            status: response.status,
            body: match response.body {
              serde_json::Value::String(text) => text,
              other => other.to_string(),
            },
          });
        }
        Ok(response)
      }
    })
    .await?;

  let output = json!({
    "status": response.status,
    "headers": response.headers,
    "body": response.body,
  });
  Ok(NodeOutcome::new(output).with_attempts(attempts))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RuntimeConfig;
  use crate::executor::test_env;
  use weft_config::NodeKind;
  use weft_test_utils::{ScriptedHttp, TestCollaborators};

  fn http_node(config: HttpConfig) -> NodeDef {
    NodeDef::new("fetch", NodeKind::Http(config))
  }

  fn fast_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.retry.initial_delay_ms = 1;
    config
  }

  #[tokio::test]
  async fn test_renders_request_and_shapes_output() {
    let doubles = TestCollaborators::new()
      .with_http(ScriptedHttp::new().respond(200, json!({ "temp": 31 })));
    let collaborators = doubles.collaborators();
    let config = fast_config();
    let env = test_env(&collaborators, &config);

    let http_config = HttpConfig {
      method: "post".to_string(),
      url: "https://api.example.com/weather?q={{ city }}".to_string(),
      headers: [("x-city".to_string(), "{{ city | upper }}".to_string())]
        .into_iter()
        .collect(),
      body: Some(json!({ "city": "{{ city }}", "days": 3 })),
    };
    let mut node = http_node(http_config.clone());
    node.timeout_ms = Some(1_500);
    let ctx = ExecutionContext::new(json!({ "city": "Bangkok" }));

    let outcome = execute(&node, &http_config, &env, &ctx).await.unwrap();
    assert_eq!(outcome.output["status"], 200);
    assert_eq!(outcome.output["body"]["temp"], 31);
    assert_eq!(outcome.output["headers"]["content-type"], "application/json");
    assert_eq!(outcome.attempts, 1);

    let requests = doubles.http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].url, "https://api.example.com/weather?q=Bangkok");
    assert_eq!(requests[0].headers["x-city"], "BANGKOK");
    assert_eq!(requests[0].body, Some(json!({ "city": "Bangkok", "days": 3 })));
    assert_eq!(requests[0].timeout, std::time::Duration::from_millis(1_500));
  }

  #[tokio::test]
  async fn test_server_errors_are_retried() {
    let doubles = TestCollaborators::new().with_http(
      ScriptedHttp::new()
        .respond(503, json!("busy"))
        .respond(200, json!({ "ok": true })),
    );
    let collaborators = doubles.collaborators();
    let config = fast_config();
    let env = test_env(&collaborators, &config);

    let http_config = HttpConfig {
      url: "https://api.example.com".to_string(),
      ..Default::default()
    };
    let node = http_node(http_config.clone());
    let ctx = ExecutionContext::new(json!({}));
    let outcome = execute(&node, &http_config, &env, &ctx).await.unwrap();

    assert_eq!(outcome.output["body"], json!({ "ok": true }));
    assert_eq!(outcome.attempts, 2);
    assert_eq!(doubles.http.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_client_errors_fail_immediately() {
    let doubles =
      TestCollaborators::new().with_http(ScriptedHttp::new().respond(404, json!("not found")));
    let collaborators = doubles.collaborators();
    let config = fast_config();
    let env = test_env(&collaborators, &config);

    let http_config = HttpConfig {
      url: "https://api.example.com/missing".to_string(),
      ..Default::default()
    };
    let node = http_node(http_config.clone());
    let ctx = ExecutionContext::new(json!({}));
    let err = execute(&node, &http_config, &env, &ctx).await.unwrap_err();

    assert_eq!(err.to_string(), "HTTP 404: not found (after 1 attempt(s))");
    assert_eq!(doubles.http.requests().len(), 1);
  }
}
