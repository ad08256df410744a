use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// One chunk of retrieved knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
  pub content: String,
  pub score: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

#[async_trait]
pub trait Retrieval: Send + Sync {
  /// Search the knowledge base. An empty `scope` searches everything.
  async fn search(
    &self,
    query: &str,
    scope: &[String],
    top_k: usize,
  ) -> Result<Vec<Passage>, HostError>;
}
