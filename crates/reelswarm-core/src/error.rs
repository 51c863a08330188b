//! Error taxonomy for the orchestration core.
//!
//! Agent and auditor failures never show up here: they are recovered at
//! the agent boundary. Everything in [`SwarmError`] is fatal to the run
//! that raised it.

use crate::context::ContextField;
use crate::graph::Node;
use crate::provider::ProviderError;

/// Invalid phase topology or an agent breaking its write contract.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("phase {phase} has no steps")]
    Empty { phase: String },

    #[error("phase {phase}: parallel branches both write {field}")]
    OverlappingWrites { phase: String, field: &'static str },

    #[error("phase {phase}: parallel branch may only nest a flat sequence of agents")]
    UnsupportedNesting { phase: String },

    #[error("agent {agent} wrote undeclared field {field}")]
    UndeclaredWrite { agent: String, field: &'static str },
}

/// Errors that abort a pipeline run or a project operation.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("stop requested before node {node}")]
    StopRequested { node: Node },

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project {project} has no block {index}")]
    BlockNotFound { project: String, index: usize },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("storage error: {0}")]
    Storage(#[from] reel_store::StorageError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    /// True when the run ended because `stop()` was called.
    pub fn is_stop(&self) -> bool {
        matches!(self, SwarmError::StopRequested { .. })
    }
}

impl PhaseError {
    pub(crate) fn overlapping(phase: &str, field: ContextField) -> Self {
        PhaseError::OverlappingWrites {
            phase: phase.to_string(),
            field: field.name(),
        }
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, SwarmError>;
