use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Error, Execution, ExecutionStore, NodeState};

/// In-process store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
  executions: RwLock<HashMap<String, Execution>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    let mut executions = self.executions.write().await;
    if executions.contains_key(&execution.id) {
      return Err(Error::AlreadyExists(execution.id.clone()));
    }
    executions.insert(execution.id.clone(), execution.clone());
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error> {
    self
      .executions
      .read()
      .await
      .get(execution_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(execution_id.to_string()))
  }

  async fn update_execution(&self, execution: &Execution) -> Result<(), Error> {
    let mut executions = self.executions.write().await;
    let stored = executions
      .get_mut(&execution.id)
      .ok_or_else(|| Error::NotFound(execution.id.clone()))?;

    let node_states = std::mem::take(&mut stored.node_states);
    *stored = execution.clone();
    stored.node_states = node_states;
    Ok(())
  }

  async fn put_node_state(&self, execution_id: &str, state: &NodeState) -> Result<(), Error> {
    let mut executions = self.executions.write().await;
    let stored = executions
      .get_mut(execution_id)
      .ok_or_else(|| Error::NotFound(execution_id.to_string()))?;
    stored
      .node_states
      .insert(state.node_id.clone(), state.clone());
    Ok(())
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error> {
    let mut executions: Vec<Execution> = self
      .executions
      .read()
      .await
      .values()
      .filter(|e| e.workflow_id == workflow_id)
      .cloned()
      .collect();
    executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(executions)
  }
}
