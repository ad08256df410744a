use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Configuration for the runtime.
///
/// Every field has a default so a partial JSON config file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  /// Engine-wide cap on iterations of any single loop node.
  pub max_iterations: u32,
  /// Cap on node dispatches per execution, for cycles that bypass loop nodes.
  pub max_steps: u64,
  pub retry: RetryPolicy,
  /// Default per-request timeout for http nodes.
  pub http_timeout_ms: u64,
  /// Default per-call timeout for language model, agent, retrieval and tool
  /// calls.
  pub collaborator_timeout_ms: u64,
  /// Instruction budget for a custom function or condition expression.
  pub function_fuel: u64,
  pub function_timeout_ms: u64,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      max_iterations: 1000,
      max_steps: 10_000,
      retry: RetryPolicy::default(),
      http_timeout_ms: 30_000,
      collaborator_timeout_ms: 120_000,
      function_fuel: 50_000,
      function_timeout_ms: 1_000,
    }
  }
}

impl RuntimeConfig {
  pub fn http_timeout(&self) -> Duration {
    Duration::from_millis(self.http_timeout_ms)
  }

  pub fn collaborator_timeout(&self) -> Duration {
    Duration::from_millis(self.collaborator_timeout_ms)
  }

  pub fn function_timeout(&self) -> Duration {
    Duration::from_millis(self.function_timeout_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_config_keeps_defaults() {
    let config: RuntimeConfig =
      serde_json::from_value(serde_json::json!({ "max_iterations": 50 })).unwrap();

    assert_eq!(config.max_iterations, 50);
    assert_eq!(config.max_steps, 10_000);
    assert_eq!(config.http_timeout(), Duration::from_secs(30));
    assert_eq!(config.retry.max_attempts, 3);
  }
}
