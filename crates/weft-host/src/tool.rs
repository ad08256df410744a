use async_trait::async_trait;

use crate::error::HostError;

/// Named tools invoked with JSON arguments.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
  async fn invoke(
    &self,
    tool_name: &str,
    args: serde_json::Value,
  ) -> Result<serde_json::Value, HostError>;
}
