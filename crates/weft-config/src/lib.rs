//! Weft Config
//!
//! This crate contains the serializable workflow definition types for Weft.
//! These types describe a workflow graph as authored in the editor, before it is
//! validated and snapshotted by the engine.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `weft run workflow.json`)
//! - Database storage (as JSON blobs)
//!
//! Editor-only data (node positions, sizes, viewport) is ignored on load.

mod edge;
mod enums;
mod node;
mod workflow;

pub use edge::{BRANCH_CONTINUE, BRANCH_EXIT, BRANCH_FALSE, BRANCH_TRUE, EdgeDef};
pub use enums::{CompareOperator, WorkflowStatus};
pub use node::{
  AgentConfig, ConditionConfig, EndConfig, FunctionConfig, HttpConfig, LlmConfig, LoopConfig,
  NodeDef, NodeKind, RagConfig, ToolConfig,
};
pub use workflow::WorkflowDef;
