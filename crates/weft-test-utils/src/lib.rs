//! Test doubles for Weft.
//!
//! Every collaborator here records the calls it receives so tests can assert
//! on what the runtime sent, and replays a script of results so tests can
//! drive failure paths deterministically.

mod builder;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use weft_host::{
  AgentEngine, AgentReply, Collaborators, Completion, CompletionParams, HostError, HttpClient,
  HttpRequest, HttpResponse, LanguageModel, Passage, Prompt, Retrieval, ToolRegistry,
};

pub use builder::WorkflowBuilder;

/// Language model that replays scripted results, then repeats a fallback.
pub struct ScriptedModel {
  script: Mutex<VecDeque<Result<Completion, HostError>>>,
  fallback: Completion,
  delay: Option<Duration>,
  panic: Option<String>,
  calls: Mutex<Vec<(Prompt, CompletionParams)>>,
}

impl ScriptedModel {
  /// Always answers `text`, reporting `tokens` used.
  pub fn replying(text: impl Into<String>, tokens: u64) -> Self {
    Self {
      script: Mutex::new(VecDeque::new()),
      fallback: Completion {
        text: text.into(),
        tokens_used: tokens,
      },
      delay: None,
      panic: None,
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Panics on every call, like a provider client with a bug.
  pub fn panicking(message: impl Into<String>) -> Self {
    Self {
      panic: Some(message.into()),
      ..Self::replying("", 0)
    }
  }

  /// Queue one result ahead of the fallback.
  pub fn then(self, result: Result<Completion, HostError>) -> Self {
    self.script.lock().unwrap().push_back(result);
    self
  }

  /// Sleep before every answer.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn calls(&self) -> Vec<(Prompt, CompletionParams)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
  async fn complete(
    &self,
    prompt: &Prompt,
    params: &CompletionParams,
  ) -> Result<Completion, HostError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((prompt.clone(), params.clone()));
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if let Some(message) = &self.panic {
      panic!("{message}");
    }
    let next = self.script.lock().unwrap().pop_front();
    next.unwrap_or_else(|| Ok(self.fallback.clone()))
  }
}

/// HTTP client that replays scripted responses, then repeats the last one.
pub struct ScriptedHttp {
  script: Mutex<VecDeque<Result<HttpResponse, HostError>>>,
  last: Mutex<Option<Result<HttpResponse, HostError>>>,
  requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
  pub fn new() -> Self {
    Self {
      script: Mutex::new(VecDeque::new()),
      last: Mutex::new(None),
      requests: Mutex::new(Vec::new()),
    }
  }

  /// Queue a response with a JSON body.
  pub fn respond(self, status: u16, body: Value) -> Self {
    self.then(Ok(HttpResponse {
      status,
      headers: [("content-type".to_string(), "application/json".to_string())]
        .into_iter()
        .collect(),
      body,
    }))
  }

  /// Queue an arbitrary result.
  pub fn then(self, result: Result<HttpResponse, HostError>) -> Self {
    self.script.lock().unwrap().push_back(result);
    self
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }
}

impl Default for ScriptedHttp {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
  async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HostError> {
    self.requests.lock().unwrap().push(request);
    let next = self.script.lock().unwrap().pop_front();
    let mut last = self.last.lock().unwrap();
    match next {
      Some(result) => {
        *last = Some(result.clone());
        result
      }
      None => last
        .clone()
        .unwrap_or(Err(HostError::Rejected("no scripted response".to_string()))),
    }
  }
}

/// Retrieval that returns a fixed passage list, truncated to `top_k`.
pub struct StaticRetrieval {
  passages: Vec<Passage>,
  queries: Mutex<Vec<(String, Vec<String>, usize)>>,
}

impl StaticRetrieval {
  pub fn new(passages: Vec<Passage>) -> Self {
    Self {
      passages,
      queries: Mutex::new(Vec::new()),
    }
  }

  pub fn queries(&self) -> Vec<(String, Vec<String>, usize)> {
    self.queries.lock().unwrap().clone()
  }
}

#[async_trait]
impl Retrieval for StaticRetrieval {
  async fn search(
    &self,
    query: &str,
    scope: &[String],
    top_k: usize,
  ) -> Result<Vec<Passage>, HostError> {
    self
      .queries
      .lock()
      .unwrap()
      .push((query.to_string(), scope.to_vec(), top_k));
    Ok(self.passages.iter().take(top_k).cloned().collect())
  }
}

/// Agent engine that echoes its input back.
#[derive(Default)]
pub struct EchoAgent {
  calls: Mutex<Vec<(String, String, Option<String>)>>,
}

impl EchoAgent {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn calls(&self) -> Vec<(String, String, Option<String>)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl AgentEngine for EchoAgent {
  async fn run(
    &self,
    agent_id: &str,
    input: &str,
    context: Option<&str>,
  ) -> Result<AgentReply, HostError> {
    self.calls.lock().unwrap().push((
      agent_id.to_string(),
      input.to_string(),
      context.map(str::to_string),
    ));
    Ok(AgentReply {
      text: format!("{agent_id}: {input}"),
      tools_used: vec!["echo".to_string()],
      sources: Vec::new(),
      tokens_used: 3,
    })
  }
}

type ToolFn = Box<dyn Fn(Value) -> Result<Value, HostError> + Send + Sync>;

/// Tool registry backed by closures.
#[derive(Default)]
pub struct ToolBox {
  tools: HashMap<String, ToolFn>,
  calls: Mutex<Vec<(String, Value)>>,
}

impl ToolBox {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_tool(
    mut self,
    name: impl Into<String>,
    tool: impl Fn(Value) -> Result<Value, HostError> + Send + Sync + 'static,
  ) -> Self {
    self.tools.insert(name.into(), Box::new(tool));
    self
  }

  pub fn calls(&self) -> Vec<(String, Value)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl ToolRegistry for ToolBox {
  async fn invoke(&self, tool_name: &str, args: Value) -> Result<Value, HostError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((tool_name.to_string(), args.clone()));
    match self.tools.get(tool_name) {
      Some(tool) => tool(args),
      None => Err(HostError::Rejected(format!("unknown tool: {tool_name}"))),
    }
  }
}

/// Collaborators with every slot filled by a test double.
///
/// The concrete doubles are returned alongside so tests can inspect calls.
pub struct TestCollaborators {
  pub llm: Arc<ScriptedModel>,
  pub http: Arc<ScriptedHttp>,
  pub retrieval: Arc<StaticRetrieval>,
  pub agents: Arc<EchoAgent>,
  pub tools: Arc<ToolBox>,
}

impl TestCollaborators {
  pub fn new() -> Self {
    Self {
      llm: Arc::new(ScriptedModel::replying("ok", 1)),
      http: Arc::new(ScriptedHttp::new().respond(200, serde_json::json!({}))),
      retrieval: Arc::new(StaticRetrieval::new(Vec::new())),
      agents: Arc::new(EchoAgent::new()),
      tools: Arc::new(ToolBox::new()),
    }
  }

  pub fn with_llm(mut self, llm: ScriptedModel) -> Self {
    self.llm = Arc::new(llm);
    self
  }

  pub fn with_http(mut self, http: ScriptedHttp) -> Self {
    self.http = Arc::new(http);
    self
  }

  pub fn with_retrieval(mut self, retrieval: StaticRetrieval) -> Self {
    self.retrieval = Arc::new(retrieval);
    self
  }

  pub fn with_tools(mut self, tools: ToolBox) -> Self {
    self.tools = Arc::new(tools);
    self
  }

  pub fn collaborators(&self) -> Collaborators {
    Collaborators {
      llm: self.llm.clone(),
      retrieval: self.retrieval.clone(),
      agents: self.agents.clone(),
      tools: self.tools.clone(),
      http: self.http.clone(),
    }
  }
}

impl Default for TestCollaborators {
  fn default() -> Self {
    Self::new()
  }
}
