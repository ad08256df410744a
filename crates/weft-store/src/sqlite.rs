use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{
  Error, Execution, ExecutionError, ExecutionStatus, ExecutionStore, LogEntry, NodeState,
  NodeStatus,
};

/// SQLite-based store implementation.
#[derive(Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct ExecutionRow {
  id: String,
  workflow_id: String,
  snapshot_id: String,
  status: ExecutionStatus,
  current_node_id: Option<String>,
  inputs: Json<serde_json::Value>,
  outputs: Json<serde_json::Map<String, serde_json::Value>>,
  log: Json<Vec<LogEntry>>,
  total_tokens: i64,
  error: Option<Json<ExecutionError>>,
  created_at: DateTime<Utc>,
  started_at: Option<DateTime<Utc>>,
  completed_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct NodeStateRow {
  node_id: String,
  node_type: String,
  status: NodeStatus,
  visits: i64,
  attempts: i64,
  started_at: DateTime<Utc>,
  completed_at: Option<DateTime<Utc>>,
  output: Option<Json<serde_json::Value>>,
  error: Option<String>,
}

impl From<NodeStateRow> for NodeState {
  fn from(row: NodeStateRow) -> Self {
    Self {
      node_id: row.node_id,
      node_type: row.node_type,
      status: row.status,
      visits: row.visits.max(0) as u32,
      attempts: row.attempts.max(0) as u32,
      started_at: row.started_at,
      completed_at: row.completed_at,
      output: row.output.map(|j| j.0),
      error: row.error,
    }
  }
}

impl ExecutionRow {
  fn into_execution(self, node_states: Vec<NodeState>) -> Execution {
    Execution {
      id: self.id,
      workflow_id: self.workflow_id,
      snapshot_id: self.snapshot_id,
      status: self.status,
      current_node_id: self.current_node_id,
      node_states: node_states
        .into_iter()
        .map(|s| (s.node_id.clone(), s))
        .collect(),
      inputs: self.inputs.0,
      outputs: self.outputs.0,
      log: self.log.0,
      total_tokens: self.total_tokens.max(0) as u64,
      created_at: self.created_at,
      started_at: self.started_at,
      completed_at: self.completed_at,
      error: self.error.map(|j| j.0),
    }
  }
}

const SELECT_EXECUTION: &str = r#"
  SELECT id, workflow_id, snapshot_id, status, current_node_id, inputs, outputs, log,
         total_tokens, error, created_at, started_at, completed_at
  FROM executions
"#;

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and run migrations.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database, migrated and ready.
  pub async fn in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    // Every connection to :memory: is a separate database, so keep exactly one
    // alive for the lifetime of the pool.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  async fn load_node_states(&self, execution_id: &str) -> Result<Vec<NodeState>, Error> {
    let rows: Vec<NodeStateRow> = sqlx::query_as(
      r#"
      SELECT node_id, node_type, status, visits, attempts, started_at, completed_at, output, error
      FROM node_states
      WHERE execution_id = ?
      ORDER BY started_at ASC
      "#,
    )
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(NodeState::from).collect())
  }
}

fn upsert_node_state<'q>(
  execution_id: &'q str,
  state: &'q NodeState,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
  sqlx::query(
    r#"
    INSERT INTO node_states
      (execution_id, node_id, node_type, status, visits, attempts, started_at, completed_at, output, error)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (execution_id, node_id) DO UPDATE SET
      node_type = excluded.node_type,
      status = excluded.status,
      visits = excluded.visits,
      attempts = excluded.attempts,
      started_at = excluded.started_at,
      completed_at = excluded.completed_at,
      output = excluded.output,
      error = excluded.error
    "#,
  )
  .bind(execution_id)
  .bind(&state.node_id)
  .bind(&state.node_type)
  .bind(state.status)
  .bind(i64::from(state.visits))
  .bind(i64::from(state.attempts))
  .bind(state.started_at)
  .bind(state.completed_at)
  .bind(state.output.as_ref().map(Json))
  .bind(&state.error)
}

fn map_write_error(err: sqlx::Error, key: &str) -> Error {
  match err.as_database_error() {
    Some(db) if db.is_unique_violation() => Error::AlreadyExists(key.to_string()),
    Some(db) if db.is_foreign_key_violation() => Error::NotFound(key.to_string()),
    _ => Error::Database(err),
  }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      r#"
      INSERT INTO executions
        (id, workflow_id, snapshot_id, status, current_node_id, inputs, outputs, log,
         total_tokens, error, created_at, started_at, completed_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&execution.id)
    .bind(&execution.workflow_id)
    .bind(&execution.snapshot_id)
    .bind(execution.status)
    .bind(&execution.current_node_id)
    .bind(Json(&execution.inputs))
    .bind(Json(&execution.outputs))
    .bind(Json(&execution.log))
    .bind(execution.total_tokens as i64)
    .bind(execution.error.as_ref().map(Json))
    .bind(execution.created_at)
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_write_error(e, &execution.id))?;

    for state in execution.node_states.values() {
      upsert_node_state(&execution.id, state)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error> {
    let row: Option<ExecutionRow> = sqlx::query_as(&format!("{SELECT_EXECUTION} WHERE id = ?"))
      .bind(execution_id)
      .fetch_optional(&self.pool)
      .await?;
    let row = row.ok_or_else(|| Error::NotFound(execution_id.to_string()))?;

    let node_states = self.load_node_states(execution_id).await?;
    Ok(row.into_execution(node_states))
  }

  async fn update_execution(&self, execution: &Execution) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
      UPDATE executions
      SET status = ?, current_node_id = ?, outputs = ?, log = ?, total_tokens = ?, error = ?,
          started_at = ?, completed_at = ?
      WHERE id = ?
      "#,
    )
    .bind(execution.status)
    .bind(&execution.current_node_id)
    .bind(Json(&execution.outputs))
    .bind(Json(&execution.log))
    .bind(execution.total_tokens as i64)
    .bind(execution.error.as_ref().map(Json))
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .bind(&execution.id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(execution.id.clone()));
    }
    Ok(())
  }

  async fn put_node_state(&self, execution_id: &str, state: &NodeState) -> Result<(), Error> {
    upsert_node_state(execution_id, state)
      .execute(&self.pool)
      .await
      .map_err(|e| map_write_error(e, execution_id))?;
    Ok(())
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(&format!(
      "{SELECT_EXECUTION} WHERE workflow_id = ? ORDER BY created_at DESC"
    ))
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    let mut executions = Vec::with_capacity(rows.len());
    for row in rows {
      let node_states = self.load_node_states(&row.id).await?;
      executions.push(row.into_execution(node_states));
    }
    Ok(executions)
  }
}
