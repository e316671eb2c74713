//! Extraction-normalization layer and multi-stage pipeline.
//!
//! model → stage (deadline, retry, extraction) → orchestrator (dependency
//! graph) → workflows (catalogue + project store merge).

pub mod checklist;
pub mod damage;
pub mod extractor;
pub mod media;
pub mod model;
pub mod orchestrator;
pub mod pricing;
pub mod prompts;
pub mod stage;
pub mod workflows;

pub use extractor::ParseOutcome;
pub use orchestrator::{RunStatus, Workflow, WorkflowRun};
pub use stage::{RetryPolicy, StageExecutor, StageResult, StageStatus};
pub use workflows::Workflows;

use thiserror::Error;

use crate::store::StoreError;

/// Plumbing faults. Domain uncertainty (malformed replies, missing floor
/// plans, wrong rooms) is reported in the records, never here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Stage '{0}' declared twice")]
    DuplicateStage(String),

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    #[error("Dependency cycle among stages: {0}")]
    Cycle(String),

    #[error("Stage '{stage}' aborted: {reason}")]
    Join { stage: String, reason: String },

    #[error("Project store error: {0}")]
    Store(#[from] StoreError),
}
