use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::edge::{BRANCH_CONTINUE, BRANCH_EXIT, BRANCH_FALSE, BRANCH_TRUE};
use crate::enums::CompareOperator;

/// A single typed step in a workflow graph.
///
/// String fields in the kind config are minijinja templates unless noted
/// otherwise; they are rendered against the execution context at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(flatten)]
  pub kind: NodeKind,
  /// Per-call timeout for collaborator calls made by this node.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Overrides the engine retry policy's attempt budget for this node.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
}

impl NodeDef {
  pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
    Self {
      id: id.into(),
      label: None,
      kind,
      timeout_ms: None,
      max_retry_attempts: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
  /// Entry point. Publishes the trigger inputs.
  Start,
  /// Exit point. Collects the workflow output.
  End(EndConfig),
  Llm(LlmConfig),
  Agent(AgentConfig),
  Rag(RagConfig),
  Tool(ToolConfig),
  Condition(ConditionConfig),
  Loop(LoopConfig),
  CustomFunction(FunctionConfig),
  Http(HttpConfig),
}

impl NodeKind {
  /// The wire name of this kind.
  pub fn name(&self) -> &'static str {
    match self {
      NodeKind::Start => "start",
      NodeKind::End(_) => "end",
      NodeKind::Llm(_) => "llm",
      NodeKind::Agent(_) => "agent",
      NodeKind::Rag(_) => "rag",
      NodeKind::Tool(_) => "tool",
      NodeKind::Condition(_) => "condition",
      NodeKind::Loop(_) => "loop",
      NodeKind::CustomFunction(_) => "custom_function",
      NodeKind::Http(_) => "http",
    }
  }

  /// Branch tags this kind must have exactly one outgoing edge for.
  ///
  /// Empty for kinds that follow a single untagged edge.
  pub fn required_branches(&self) -> &'static [&'static str] {
    match self {
      NodeKind::Condition(_) => &[BRANCH_TRUE, BRANCH_FALSE],
      NodeKind::Loop(_) => &[BRANCH_CONTINUE, BRANCH_EXIT],
      _ => &[],
    }
  }

  pub fn is_branching(&self) -> bool {
    !self.required_branches().is_empty()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndConfig {
  /// Variable path to publish as the workflow output. Defaults to the output
  /// of the most recently completed node.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_from: Option<String>,
  /// Key under which the value lands in the execution outputs. Defaults to
  /// `final`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
  #[serde(default)]
  pub prompt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub system_prompt: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
  /// Identifier of the agent in the agent engine. Not templated.
  #[serde(default)]
  pub agent_id: String,
  #[serde(default)]
  pub input: String,
  /// Optional context handed to the agent alongside the input.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
  #[serde(default)]
  pub query: String,
  /// Document or collection ids to restrict the search to. Empty means all.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub scope: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
  #[serde(default)]
  pub tool_name: String,
  /// Tool arguments. Every string leaf is rendered as a template.
  #[serde(default)]
  pub args: serde_json::Value,
}

/// Either a boolean `expression`, or a structured comparison of `variable`
/// against `value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expression: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variable: Option<String>,
  #[serde(default)]
  pub operator: CompareOperator,
  #[serde(default)]
  pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
  /// Variable path of the array to iterate.
  #[serde(default)]
  pub collection: String,
  /// Per-node bound, capped by the engine-wide maximum.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
  /// Expression evaluated against the context variables.
  #[serde(default)]
  pub expression: String,
  /// Overrides the engine's default fuel budget.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fuel: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default)]
  pub url: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub headers: BTreeMap<String, String>,
  /// Request body sent as JSON. String leaves are rendered as templates.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<serde_json::Value>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      method: default_method(),
      url: String::new(),
      headers: BTreeMap::new(),
      body: None,
    }
  }
}

fn default_method() -> String {
  "GET".to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_llm_node_ignores_layout() {
    let node: NodeDef = serde_json::from_value(json!({
      "id": "summarize",
      "type": "llm",
      "prompt": "Summarize {{ nodes.fetch.body }}",
      "temperature": 0.2,
      "position": { "x": 100, "y": 40 },
      "width": 180
    }))
    .unwrap();

    assert_eq!(node.id, "summarize");
    match node.kind {
      NodeKind::Llm(cfg) => {
        assert_eq!(cfg.prompt, "Summarize {{ nodes.fetch.body }}");
        assert_eq!(cfg.temperature, Some(0.2));
        assert!(cfg.model.is_none());
      }
      other => panic!("expected llm node, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_start_and_end() {
    let start: NodeDef = serde_json::from_value(json!({ "id": "s", "type": "start" })).unwrap();
    assert_eq!(start.kind, NodeKind::Start);

    let end: NodeDef = serde_json::from_value(json!({
      "id": "e",
      "type": "end",
      "output_from": "nodes.summarize"
    }))
    .unwrap();
    assert_eq!(
      end.kind,
      NodeKind::End(EndConfig {
        output_from: Some("nodes.summarize".to_string()),
        output_key: None,
      })
    );
  }

  #[test]
  fn test_http_defaults_to_get() {
    let node: NodeDef = serde_json::from_value(json!({
      "id": "fetch",
      "type": "http",
      "url": "https://example.com/{{ city }}",
      "timeout_ms": 5000
    }))
    .unwrap();

    assert_eq!(node.timeout_ms, Some(5000));
    match node.kind {
      NodeKind::Http(cfg) => assert_eq!(cfg.method, "GET"),
      other => panic!("expected http node, got {:?}", other),
    }
  }

  #[test]
  fn test_missing_required_fields_still_parse() {
    // Required fields are enforced by the validator so that every violation
    // can be reported at once.
    let node: NodeDef = serde_json::from_value(json!({ "id": "t", "type": "tool" })).unwrap();
    match node.kind {
      NodeKind::Tool(cfg) => assert!(cfg.tool_name.is_empty()),
      other => panic!("expected tool node, got {:?}", other),
    }
  }

  #[test]
  fn test_structured_condition() {
    let node: NodeDef = serde_json::from_value(json!({
      "id": "check",
      "type": "condition",
      "variable": "inputs.score",
      "operator": "greater_than",
      "value": 10
    }))
    .unwrap();

    match node.kind {
      NodeKind::Condition(cfg) => {
        assert_eq!(cfg.operator, CompareOperator::GreaterThan);
        assert_eq!(cfg.value, json!(10));
        assert!(cfg.expression.is_none());
      }
      other => panic!("expected condition node, got {:?}", other),
    }
  }

  #[test]
  fn test_required_branches() {
    assert_eq!(
      NodeKind::Condition(ConditionConfig::default()).required_branches(),
      &["true", "false"]
    );
    assert_eq!(
      NodeKind::Loop(LoopConfig::default()).required_branches(),
      &["continue", "exit"]
    );
    assert!(!NodeKind::Http(HttpConfig::default()).is_branching());
    assert_eq!(NodeKind::CustomFunction(FunctionConfig::default()).name(), "custom_function");
  }
}
