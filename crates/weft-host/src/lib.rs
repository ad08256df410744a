//! Weft Host
//!
//! Contracts for the external collaborators a workflow calls out to. The
//! runtime only ever sees these traits; concrete providers live behind them.
//!
//! Provided implementations:
//! - [`ReqwestHttpClient`] for http nodes
//! - [`OpenAiCompatibleModel`] for any chat-completions endpoint
//! - [`Unconfigured`] for every trait, failing with [`HostError::NotConfigured`]

mod agent;
mod error;
mod http;
mod llm;
mod retrieval;
mod tool;
mod unconfigured;

use std::sync::Arc;

pub use agent::{AgentEngine, AgentReply};
pub use error::HostError;
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use llm::{Completion, CompletionParams, LanguageModel, OpenAiCompatibleModel, Prompt};
pub use retrieval::{Passage, Retrieval};
pub use tool::ToolRegistry;
pub use unconfigured::Unconfigured;

/// The set of collaborators one engine hands to every execution.
#[derive(Clone)]
pub struct Collaborators {
  pub llm: Arc<dyn LanguageModel>,
  pub retrieval: Arc<dyn Retrieval>,
  pub agents: Arc<dyn AgentEngine>,
  pub tools: Arc<dyn ToolRegistry>,
  pub http: Arc<dyn HttpClient>,
}

impl Collaborators {
  /// Every collaborator unconfigured except HTTP, which uses reqwest.
  pub fn new() -> Self {
    Self {
      llm: Arc::new(Unconfigured),
      retrieval: Arc::new(Unconfigured),
      agents: Arc::new(Unconfigured),
      tools: Arc::new(Unconfigured),
      http: Arc::new(ReqwestHttpClient::new()),
    }
  }

  pub fn with_llm(mut self, llm: Arc<dyn LanguageModel>) -> Self {
    self.llm = llm;
    self
  }

  pub fn with_retrieval(mut self, retrieval: Arc<dyn Retrieval>) -> Self {
    self.retrieval = retrieval;
    self
  }

  pub fn with_agents(mut self, agents: Arc<dyn AgentEngine>) -> Self {
    self.agents = agents;
    self
  }

  pub fn with_tools(mut self, tools: Arc<dyn ToolRegistry>) -> Self {
    self.tools = tools;
    self
  }

  pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
    self.http = http;
    self
  }
}

impl Default for Collaborators {
  fn default() -> Self {
    Self::new()
  }
}
