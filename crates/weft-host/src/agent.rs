use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
  pub text: String,
  #[serde(default)]
  pub tools_used: Vec<String>,
  #[serde(default)]
  pub sources: Vec<String>,
  #[serde(default)]
  pub tokens_used: u64,
}

/// Runs user-defined agents by id.
#[async_trait]
pub trait AgentEngine: Send + Sync {
  async fn run(
    &self,
    agent_id: &str,
    input: &str,
    context: Option<&str>,
  ) -> Result<AgentReply, HostError>;
}
