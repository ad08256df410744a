//! Weft Workflow
//!
//! This crate turns an authored [`weft_config::WorkflowDef`] into the form the
//! runtime walks. A snapshot is a validated, immutable copy of the definition
//! that an execution is bound to for its whole lifetime.
//!
//! Key differences from `weft-config`:
//! - Graph structure is validated (one start, reachable end, no dangling edges)
//! - Branch edges are indexed by tag for O(1) next-node lookup
//! - The definition is content-addressed by a `sha256:` snapshot id

mod error;
mod graph;
mod validate;
mod workflow;

pub use error::{ValidationError, ValidationReport};
pub use graph::Graph;
pub use validate::validate;
pub use workflow::Workflow;
