//! Reel-Store: project persistence for ReelSwarm
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: whole-record writes keyed by project id.
//!
//! ## Key Components
//!
//! - `ProjectStore`: async document-store trait (`upsert`, `get`, `delete`, `list_all`)
//! - `JsonFileStore`: single JSON document on disk
//! - `ProjectRecord`: schema of a compiled project, including its `AuditReport`

mod error;
pub mod fakes;
mod json_file;
mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use json_file::JsonFileStore;
pub use schema::{
    AuditReport, AuditorReport, CompiledBlock, ProjectMetadata, ProjectRecord, ProjectStatus,
    TaggedIssue, Verdict, APPROVAL_SCORE,
};
pub use storage_traits::{ProjectStore, StorageResult};
