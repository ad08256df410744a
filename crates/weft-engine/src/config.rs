use serde::{Deserialize, Serialize};
use weft_runtime::RuntimeConfig;

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub runtime: RuntimeConfig,
  /// Events buffered per execution before slow subscribers start losing the
  /// oldest ones.
  pub progress_capacity: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      runtime: RuntimeConfig::default(),
      progress_capacity: 256,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_nested_runtime_overrides() {
    let config: EngineConfig = serde_json::from_value(serde_json::json!({
      "runtime": { "max_steps": 50, "retry": { "max_attempts": 5 } }
    }))
    .unwrap();

    assert_eq!(config.progress_capacity, 256);
    assert_eq!(config.runtime.max_steps, 50);
    assert_eq!(config.runtime.max_iterations, 1000);
    assert_eq!(config.runtime.retry.max_attempts, 5);
    assert_eq!(config.runtime.retry.initial_delay_ms, 200);
  }
}
