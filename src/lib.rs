//! Consolidation of overlapping HR record collections into canonical
//! `users`, `leaveRequests` and `settings` documents.

pub mod batch;
pub mod canonical;
pub mod config;
pub mod error;
pub mod identity;
pub mod load;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod reader;
pub mod report;
pub mod source;
pub mod specs;
pub mod steps;
pub mod store;

pub use batch::{BatchCommitError, BatchWriter, CommitReport};
pub use canonical::CanonicalDocument;
pub use config::{MigrationOptions, StoreConfig};
pub use error::{AppError, AppResult};
pub use orchestrator::{MigrationError, MigrationSummary, Orchestrator, RunState};
pub use reader::{CollectionReader, ReadOutcome};
pub use source::{SourceKind, SourceRecord};
pub use steps::{StepError, StepKind, StepSummary};
pub use store::{DocumentStore, SqliteStore};
