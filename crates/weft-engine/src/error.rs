use weft_workflow::ValidationReport;

/// Errors returned by [`Engine`](crate::Engine) operations.
///
/// Node failures are not engine errors: they end the run with status failed
/// and are read from the execution record.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The workflow failed validation; the run never started.
  #[error(transparent)]
  Validation(#[from] ValidationReport),

  #[error("execution not found: {0}")]
  NotFound(String),

  #[error("store error: {0}")]
  Store(#[source] weft_store::Error),

  /// The engine is shutting down and accepts no new runs.
  #[error("engine is shutting down")]
  ShuttingDown,

  /// The task driving an execution panicked or was aborted.
  #[error("execution {execution_id} aborted: {message}")]
  Aborted {
    execution_id: String,
    message: String,
  },
}

impl From<weft_store::Error> for EngineError {
  fn from(err: weft_store::Error) -> Self {
    match err {
      weft_store::Error::NotFound(id) => EngineError::NotFound(id),
      other => EngineError::Store(other),
    }
  }
}
