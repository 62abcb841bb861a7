pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{default_database_path, get_config_dir, get_config_path, CaseworkConfig, Limits};
pub use db::{
    BackendType, CaseStore, DatabaseConfig, MemoryBackend, Snapshot, SqliteBackend, StoreStats,
    UserSearch,
};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use models::{AuditContext, EntityMeta, Issue, Team, User, WorkItem, WorkItemStatus};
pub use services::{IssueService, Services, TeamService, UserService, WorkItemService};
