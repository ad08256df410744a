use std::time::Duration;

use thiserror::Error;

/// Failure of a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
  /// The request never got a response (connection refused, reset, DNS).
  #[error("transport error: {0}")]
  Transport(String),

  #[error("timed out after {}ms", .0.as_millis())]
  Timeout(Duration),

  /// The remote side answered with a non-success HTTP status.
  #[error("HTTP {status}: {body}")]
  Status { status: u16, body: String },

  /// The collaborator understood the request and refused it.
  #[error("rejected: {0}")]
  Rejected(String),

  #[error("{0} is not configured")]
  NotConfigured(&'static str),
}

impl HostError {
  /// Whether retrying the same call may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      HostError::Transport(_) | HostError::Timeout(_) => true,
      HostError::Status { status, .. } => *status >= 500 || *status == 429,
      HostError::Rejected(_) | HostError::NotConfigured(_) => false,
    }
  }
}

impl HostError {
  /// Classify a reqwest failure for a call made with `timeout`.
  pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
    if err.is_timeout() {
      HostError::Timeout(timeout)
    } else if let Some(status) = err.status() {
      HostError::Status {
        status: status.as_u16(),
        body: err.to_string(),
      }
    } else if err.is_decode() {
      HostError::Rejected(err.to_string())
    } else {
      HostError::Transport(err.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transient_classification() {
    assert!(HostError::Transport("reset".into()).is_transient());
    assert!(HostError::Timeout(Duration::from_secs(1)).is_transient());
    assert!(HostError::Status { status: 503, body: String::new() }.is_transient());
    assert!(HostError::Status { status: 429, body: String::new() }.is_transient());

    assert!(!HostError::Status { status: 404, body: String::new() }.is_transient());
    assert!(!HostError::Rejected("bad args".into()).is_transient());
    assert!(!HostError::NotConfigured("retrieval").is_transient());
  }

  #[test]
  fn test_display() {
    assert_eq!(
      HostError::Timeout(Duration::from_millis(1500)).to_string(),
      "timed out after 1500ms"
    );
    assert_eq!(
      HostError::NotConfigured("language model").to_string(),
      "language model is not configured"
    );
  }
}
