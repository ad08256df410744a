//! Weft Store
//!
//! This crate provides the execution record types and the storage trait the
//! engine persists them through.
//!
//! The [`ExecutionStore`] trait defines operations for:
//! - Creating and overwriting execution summaries
//! - Upserting per-node state, keyed by (execution id, node id)
//! - Querying execution history
//!
//! Two backends are provided: [`MemoryStore`] for tests and embedding, and
//! [`SqliteStore`] for durable storage.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
  ErrorCode, Execution, ExecutionError, ExecutionStatus, LogEntry, LogLevel, NodeState, NodeStatus,
};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with the same key already exists.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// An execution status change that would move backwards.
  #[error("invalid status transition: {from} -> {to}")]
  InvalidTransition {
    from: ExecutionStatus,
    to: ExecutionStatus,
  },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// A JSON column could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Storage trait for executions and their node states.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
  /// Create a new execution, including any node states it already carries.
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error>;

  /// Get an execution by ID, with its node states.
  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error>;

  /// Overwrite the execution summary: status, current node, outputs, error,
  /// tokens, log and timestamps. Node states are written separately.
  async fn update_execution(&self, execution: &Execution) -> Result<(), Error>;

  /// Insert or replace one node state. Writing the same state twice leaves a
  /// single entry.
  async fn put_node_state(&self, execution_id: &str, state: &NodeState) -> Result<(), Error>;

  /// List executions for a workflow, newest first.
  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error>;
}
