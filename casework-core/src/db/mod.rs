//! Database abstraction layer for Casework
//!
//! This module provides one repository trait per entity plus the
//! [`CaseStore`] trait that bundles them with a transaction boundary,
//! allowing the services to run over different storage backends.

mod memory_backend;
mod migration;
mod sqlite_backend;
mod traits;

pub use memory_backend::MemoryBackend;
pub use migration::{
    export_snapshot, export_to_file, import_from_file, import_snapshot, migrate, Snapshot,
};
pub use sqlite_backend::SqliteBackend;
pub use traits::{
    BackendType, CaseStore, DatabaseConfig, IssueRepository, StoreStats, TeamRepository,
    UserRepository, UserSearch, WorkItemRepository,
};
