use async_trait::async_trait;

use crate::agent::{AgentEngine, AgentReply};
use crate::error::HostError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::llm::{Completion, CompletionParams, LanguageModel, Prompt};
use crate::retrieval::{Passage, Retrieval};
use crate::tool::ToolRegistry;

/// Placeholder for a collaborator the host did not wire up.
///
/// Every call fails with [`HostError::NotConfigured`], which is not retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl LanguageModel for Unconfigured {
  async fn complete(&self, _: &Prompt, _: &CompletionParams) -> Result<Completion, HostError> {
    Err(HostError::NotConfigured("language model"))
  }
}

#[async_trait]
impl Retrieval for Unconfigured {
  async fn search(&self, _: &str, _: &[String], _: usize) -> Result<Vec<Passage>, HostError> {
    Err(HostError::NotConfigured("retrieval"))
  }
}

#[async_trait]
impl AgentEngine for Unconfigured {
  async fn run(&self, _: &str, _: &str, _: Option<&str>) -> Result<AgentReply, HostError> {
    Err(HostError::NotConfigured("agent engine"))
  }
}

#[async_trait]
impl ToolRegistry for Unconfigured {
  async fn invoke(&self, _: &str, _: serde_json::Value) -> Result<serde_json::Value, HostError> {
    Err(HostError::NotConfigured("tool registry"))
  }
}

#[async_trait]
impl HttpClient for Unconfigured {
  async fn request(&self, _: HttpRequest) -> Result<HttpResponse, HostError> {
    Err(HostError::NotConfigured("http client"))
  }
}
