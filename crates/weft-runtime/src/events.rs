//! Execution events and notifiers for observability.
//!
//! The scheduler emits an event at every state change of a run. Consumers
//! decide what to do with them (stream to a UI, log, ignore).

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
  ExecutionStarted {
    execution_id: String,
    workflow_id: String,
    timestamp: DateTime<Utc>,
  },

  NodeStarted {
    execution_id: String,
    node_id: String,
    node_type: String,
    timestamp: DateTime<Utc>,
  },

  NodeCompleted {
    execution_id: String,
    node_id: String,
    node_type: String,
    output: serde_json::Value,
    timestamp: DateTime<Utc>,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    node_type: String,
    error: String,
    attempts: u32,
    timestamp: DateTime<Utc>,
  },

  /// A collaborator call failed and will be tried again after `delay_ms`.
  NodeRetrying {
    execution_id: String,
    node_id: String,
    node_type: String,
    attempt: u32,
    error: String,
    delay_ms: u64,
    timestamp: DateTime<Utc>,
  },

  ExecutionCompleted {
    execution_id: String,
    outputs: serde_json::Map<String, serde_json::Value>,
    timestamp: DateTime<Utc>,
  },

  ExecutionFailed {
    execution_id: String,
    error: String,
    timestamp: DateTime<Utc>,
  },

  ExecutionCancelled {
    execution_id: String,
    timestamp: DateTime<Utc>,
  },
}

impl ExecutionEvent {
  pub fn execution_id(&self) -> &str {
    match self {
      ExecutionEvent::ExecutionStarted { execution_id, .. }
      | ExecutionEvent::NodeStarted { execution_id, .. }
      | ExecutionEvent::NodeCompleted { execution_id, .. }
      | ExecutionEvent::NodeFailed { execution_id, .. }
      | ExecutionEvent::NodeRetrying { execution_id, .. }
      | ExecutionEvent::ExecutionCompleted { execution_id, .. }
      | ExecutionEvent::ExecutionFailed { execution_id, .. }
      | ExecutionEvent::ExecutionCancelled { execution_id, .. } => execution_id,
    }
  }

  /// Whether this is the last event of a run.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ExecutionEvent::ExecutionCompleted { .. }
        | ExecutionEvent::ExecutionFailed { .. }
        | ExecutionEvent::ExecutionCancelled { .. }
    )
  }
}

/// Trait for receiving execution events.
///
/// The scheduler calls `notify` inline, so implementations must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Stream of one execution's events, ending after the terminal event.
pub type ProgressStream = BoxStream<'static, ExecutionEvent>;

/// Fans one execution's events out to any number of subscribers.
///
/// Backed by a bounded broadcast channel: publishing never waits, and a
/// subscriber that falls behind loses the oldest events. The terminal event is
/// latched, so a subscriber that arrives after the run finished still gets it.
#[derive(Debug)]
pub struct ProgressPublisher {
  sender: broadcast::Sender<ExecutionEvent>,
  terminal: Arc<Mutex<Option<ExecutionEvent>>>,
}

impl ProgressPublisher {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self {
      sender,
      terminal: Arc::new(Mutex::new(None)),
    }
  }

  pub fn publish(&self, event: ExecutionEvent) {
    if event.is_terminal() {
      // Latch and send under one lock so `subscribe` sees exactly one of them.
      let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
      let _ = self.sender.send(event.clone());
      *terminal = Some(event);
    } else {
      // No subscribers is not an error.
      let _ = self.sender.send(event);
    }
  }

  /// The terminal event, once published.
  pub fn terminal(&self) -> Option<ExecutionEvent> {
    self
      .terminal
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Events published from now on, through the terminal event.
  pub fn subscribe(&self) -> ProgressStream {
    let latched = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(event) = latched.clone() {
      return stream::iter([event]).boxed();
    }
    let receiver = self.sender.subscribe();
    drop(latched);

    let terminal = Arc::clone(&self.terminal);
    stream::unfold(Some(receiver), move |state| {
      let terminal = Arc::clone(&terminal);
      async move {
        let mut receiver = state?;
        loop {
          match receiver.recv().await {
            Ok(event) => {
              let next = if event.is_terminal() {
                None
              } else {
                Some(receiver)
              };
              return Some((event, next));
            }
            Err(RecvError::Lagged(skipped)) => {
              tracing::debug!(skipped, "progress_subscriber_lagged");
            }
            Err(RecvError::Closed) => {
              let event = terminal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()?;
              return Some((event, None));
            }
          }
        }
      }
    })
    .boxed()
  }
}

impl ExecutionNotifier for ProgressPublisher {
  fn notify(&self, event: ExecutionEvent) {
    self.publish(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node_started(node_id: &str) -> ExecutionEvent {
    ExecutionEvent::NodeStarted {
      execution_id: "exec-1".to_string(),
      node_id: node_id.to_string(),
      node_type: "llm".to_string(),
      timestamp: Utc::now(),
    }
  }

  fn completed() -> ExecutionEvent {
    ExecutionEvent::ExecutionCompleted {
      execution_id: "exec-1".to_string(),
      outputs: serde_json::Map::new(),
      timestamp: Utc::now(),
    }
  }

  #[tokio::test]
  async fn test_subscriber_sees_events_through_terminal() {
    let publisher = ProgressPublisher::new(16);
    let stream = publisher.subscribe();

    publisher.publish(node_started("a"));
    publisher.publish(node_started("b"));
    publisher.publish(completed());
    publisher.publish(node_started("after"));

    let events: Vec<_> = stream.collect().await;
    assert_eq!(events.len(), 3);
    assert!(events[2].is_terminal());
  }

  #[tokio::test]
  async fn test_late_subscriber_gets_latched_terminal() {
    let publisher = ProgressPublisher::new(16);
    publisher.publish(node_started("a"));
    publisher.publish(completed());

    let events: Vec<_> = publisher.subscribe().collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ExecutionEvent::ExecutionCompleted { .. }));
  }

  #[tokio::test]
  async fn test_lagging_subscriber_drops_oldest() {
    let publisher = ProgressPublisher::new(2);
    let stream = publisher.subscribe();

    for i in 0..10 {
      publisher.publish(node_started(&format!("n{i}")));
    }
    publisher.publish(completed());

    let events: Vec<_> = stream.collect().await;
    assert!(events.len() <= 2);
    assert!(events.last().unwrap().is_terminal());
  }

  #[tokio::test]
  async fn test_dropped_publisher_ends_stream() {
    let publisher = ProgressPublisher::new(4);
    let stream = publisher.subscribe();
    drop(publisher);

    let events: Vec<_> = stream.collect().await;
    assert!(events.is_empty());
  }

  #[test]
  fn test_event_serialization_is_tagged() {
    let value = serde_json::to_value(node_started("fetch")).unwrap();
    assert_eq!(value["type"], "node_started");
    assert_eq!(value["node_id"], "fetch");
    assert_eq!(node_started("fetch").execution_id(), "exec-1");
  }
}
