//! Weft Engine
//!
//! The entry point for running workflows. The engine validates and snapshots
//! a definition, stores a pending execution record, and drives the run on its
//! own tokio task.
//!
//! # Architecture
//!
//! ```text
//! Engine
//! ├── start_execution(def, inputs) -> execution id   (validate, snapshot, spawn)
//! ├── execute(def, inputs) -> Execution              (start and wait)
//! ├── subscribe_progress(id) -> Stream<ExecutionEvent>
//! ├── get_execution(id) / list_executions(workflow_id)
//! ├── cancel_execution(id) -> CancelAck
//! └── shutdown()
//!        │
//!        ▼ one task per run
//! Scheduler::run ── ProgressPublisher (bounded broadcast)
//!        │
//!        ▼
//! ExecutionStore (memory or SQLite)
//! ```

mod config;
mod engine;
mod error;

pub use config::EngineConfig;
pub use engine::{CancelAck, Engine};
pub use error::EngineError;
