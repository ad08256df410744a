use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Rendered prompt text for one completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
  pub system: Option<String>,
  pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
  /// Falls back to the provider's default model.
  pub model: Option<String>,
  pub temperature: Option<f32>,
  pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
  pub text: String,
  pub tokens_used: u64,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
  async fn complete(
    &self,
    prompt: &Prompt,
    params: &CompletionParams,
  ) -> Result<Completion, HostError>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint (OpenAI,
/// LiteLLM, Ollama, vLLM and friends).
#[derive(Clone)]
pub struct OpenAiCompatibleModel {
  client: Client,
  base_url: String,
  api_key: Option<String>,
  default_model: String,
  timeout: Duration,
}

impl OpenAiCompatibleModel {
  pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
      api_key: None,
      default_model: default_model.into(),
      timeout: Duration::from_secs(120),
    }
  }

  pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
    self.api_key = Some(api_key.into());
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<Choice>,
  #[serde(default)]
  usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
  message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  total_tokens: u64,
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
  async fn complete(
    &self,
    prompt: &Prompt,
    params: &CompletionParams,
  ) -> Result<Completion, HostError> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = prompt.system.as_deref() {
      messages.push(ChatMessage {
        role: "system",
        content: system,
      });
    }
    messages.push(ChatMessage {
      role: "user",
      content: &prompt.user,
    });

    let body = ChatRequest {
      model: params.model.as_deref().unwrap_or(&self.default_model),
      messages,
      temperature: params.temperature,
      max_tokens: params.max_tokens,
    };

    let mut request = self
      .client
      .post(format!("{}/chat/completions", self.base_url))
      .timeout(self.timeout)
      .json(&body);
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = request
      .send()
      .await
      .map_err(|e| HostError::from_reqwest(e, self.timeout))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(HostError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let parsed: ChatResponse = response
      .json()
      .await
      .map_err(|e| HostError::from_reqwest(e, self.timeout))?;

    let text = parsed
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| HostError::Rejected("completion returned no choices".to_string()))?;
    let tokens_used = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);

    tracing::debug!(tokens_used, "llm_completion");

    Ok(Completion { text, tokens_used })
  }
}
