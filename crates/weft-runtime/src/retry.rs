//! Retry with exponential backoff for collaborator calls.
//!
//! Only transient [`HostError`]s are retried (transport failures, timeouts,
//! 5xx and 429 responses). Every call runs under a timeout; an elapsed timeout
//! counts as a transient failure of that attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_host::HostError;

use crate::error::NodeError;

/// How many times and how fast a collaborator call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Maximum number of attempts, including the first try.
  pub max_attempts: u32,
  /// Delay before the first retry.
  pub initial_delay_ms: u64,
  /// Cap on the delay between retries.
  pub max_delay_ms: u64,
  /// Each retry delay is `initial_delay * backoff_multiplier^(attempt-1)`.
  pub backoff_multiplier: f64,
}

impl RetryPolicy {
  /// No retries - fail on the first error.
  pub const NONE: Self = Self {
    max_attempts: 1,
    initial_delay_ms: 0,
    max_delay_ms: 0,
    backoff_multiplier: 1.0,
  };

  /// The same backoff with a different attempt budget.
  pub fn with_max_attempts(self, max_attempts: u32) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      ..self
    }
  }

  /// Delay before retrying after failed attempt `attempt` (1-indexed), or
  /// `None` once the budget is spent.
  pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
    if attempt >= self.max_attempts {
      return None;
    }
    let factor = self
      .backoff_multiplier
      .powi(attempt.saturating_sub(1) as i32);
    let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
    Some(Duration::from_millis(delay_ms.max(0.0) as u64))
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay_ms: 200,
      max_delay_ms: 5_000,
      backoff_multiplier: 2.0,
    }
  }
}

/// A failed attempt that is about to be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
  pub attempt: u32,
  pub error: HostError,
  pub delay: Duration,
}

/// Run `op` under `timeout`, retrying transient failures per `policy`.
///
/// Returns the value with the number of attempts it took. `on_retry` is told
/// about every failed attempt that will be retried.
pub async fn call_with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  timeout: Duration,
  on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
  mut op: F,
) -> Result<(T, u32), NodeError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, HostError>>,
{
  let mut attempt = 1;
  loop {
    let result = match tokio::time::timeout(timeout, op()).await {
      Ok(result) => result,
      Err(_) => Err(HostError::Timeout(timeout)),
    };

    let error = match result {
      Ok(value) => return Ok((value, attempt)),
      Err(error) => error,
    };

    let delay = match policy.delay_for_attempt(attempt) {
      Some(delay) if error.is_transient() => delay,
      _ => {
        return Err(NodeError::Collaborator {
          attempts: attempt,
          source: error,
        });
      }
    };

    tracing::warn!(
      attempt,
      max_attempts = policy.max_attempts,
      backoff_ms = delay.as_millis() as u64,
      error = %error,
      "node_retry"
    );
    on_retry(RetryNotice {
      attempt,
      error,
      delay,
    });
    tokio::time::sleep(delay).await;
    attempt += 1;
  }
}
