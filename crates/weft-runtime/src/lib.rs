//! Workflow runtime for Weft.
//!
//! This crate interprets a validated [`weft_workflow::Workflow`] snapshot one
//! node at a time.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//! └── run(execution) - walks from the start node until end, failure or cancel
//!     ├── executor::execute(node, env, ctx) - one executor per node kind
//!     │   └── call_with_retry(policy, timeout, op) - collaborator calls
//!     ├── ExecutionStore::put_node_state - after every node
//!     └── ExecutionNotifier::notify - progress events
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let workflow = Arc::new(Workflow::snapshot(&def)?);
//! let execution = Execution::new(id, &workflow.workflow_id, &workflow.snapshot_id, inputs);
//! store.create_execution(&execution).await?;
//!
//! let finished = Scheduler::new(workflow, collaborators, RuntimeConfig::default(), store)
//!   .with_cancel(cancel)
//!   .run(execution)
//!   .await;
//! ```

mod config;
mod context;
mod error;
pub mod events;
pub mod executor;
mod expression;
mod retry;
mod scheduler;
mod template;

pub use config::RuntimeConfig;
pub use context::ExecutionContext;
pub use error::{NodeError, SafetyLimit};
pub use events::{
  ExecutionEvent, ExecutionNotifier, NoopNotifier, ProgressPublisher, ProgressStream,
};
pub use executor::{NextEdge, NodeOutcome};
pub use retry::{RetryNotice, RetryPolicy, call_with_retry};
pub use scheduler::Scheduler;
