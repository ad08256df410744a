use weft_config::{
  ConditionConfig, EdgeDef, EndConfig, FunctionConfig, HttpConfig, LlmConfig, LoopConfig, NodeDef,
  NodeKind, WorkflowDef, WorkflowStatus,
};

/// Fluent builder for workflow definitions in tests.
pub struct WorkflowBuilder {
  def: WorkflowDef,
}

impl WorkflowBuilder {
  pub fn new(id: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      def: WorkflowDef {
        name: id.clone(),
        id,
        description: None,
        status: WorkflowStatus::Active,
        nodes: Vec::new(),
        edges: Vec::new(),
      },
    }
  }

  pub fn node(mut self, node: NodeDef) -> Self {
    self.def.nodes.push(node);
    self
  }

  pub fn kind(self, id: &str, kind: NodeKind) -> Self {
    self.node(NodeDef::new(id, kind))
  }

  pub fn start(self, id: &str) -> Self {
    self.kind(id, NodeKind::Start)
  }

  pub fn end(self, id: &str) -> Self {
    self.kind(id, NodeKind::End(EndConfig::default()))
  }

  pub fn end_from(self, id: &str, output_from: &str) -> Self {
    self.kind(
      id,
      NodeKind::End(EndConfig {
        output_from: Some(output_from.to_string()),
        output_key: None,
      }),
    )
  }

  pub fn llm(self, id: &str, prompt: &str) -> Self {
    self.kind(
      id,
      NodeKind::Llm(LlmConfig {
        prompt: prompt.to_string(),
        ..Default::default()
      }),
    )
  }

  pub fn http(self, id: &str, url: &str) -> Self {
    self.kind(
      id,
      NodeKind::Http(HttpConfig {
        url: url.to_string(),
        ..Default::default()
      }),
    )
  }

  pub fn condition(self, id: &str, expression: &str) -> Self {
    self.kind(
      id,
      NodeKind::Condition(ConditionConfig {
        expression: Some(expression.to_string()),
        ..Default::default()
      }),
    )
  }

  pub fn loop_over(self, id: &str, collection: &str, max_iterations: Option<u32>) -> Self {
    self.kind(
      id,
      NodeKind::Loop(LoopConfig {
        collection: collection.to_string(),
        max_iterations,
      }),
    )
  }

  pub fn function(self, id: &str, expression: &str) -> Self {
    self.kind(
      id,
      NodeKind::CustomFunction(FunctionConfig {
        expression: expression.to_string(),
        fuel: None,
      }),
    )
  }

  /// Untagged edge.
  pub fn edge(mut self, source: &str, target: &str) -> Self {
    let id = format!("e{}", self.def.edges.len() + 1);
    self.def.edges.push(EdgeDef::new(id, source, target));
    self
  }

  /// Edge carrying a branch tag.
  pub fn branch(mut self, source: &str, target: &str, tag: &str) -> Self {
    let id = format!("e{}", self.def.edges.len() + 1);
    self.def.edges.push(EdgeDef::tagged(id, source, target, tag));
    self
  }

  /// Chain untagged edges through `ids` in order.
  pub fn chain(mut self, ids: &[&str]) -> Self {
    for pair in ids.windows(2) {
      self = self.edge(pair[0], pair[1]);
    }
    self
  }

  pub fn build(self) -> WorkflowDef {
    self.def
  }
}
