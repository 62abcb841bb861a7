//! Repository abstraction traits
//!
//! Each entity gets its own repository trait. Only the primitive operations
//! (find by id, save, delete, list) are required; the derived finders have
//! default implementations built on `list_*` that backends may override with
//! something more efficient.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{Issue, Team, User, WorkItem, WorkItemStatus};

/// Types of database backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// SQLite database storage
    Sqlite,
    /// In-process tables, lost on exit
    Memory,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Sqlite => write!(f, "SQLite"),
            BackendType::Memory => write!(f, "Memory"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" | "db" => Ok(BackendType::Sqlite),
            "memory" | "mem" => Ok(BackendType::Memory),
            other => anyhow::bail!("Unknown backend type '{}'", other),
        }
    }
}

/// Configuration for database backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Backend type
    #[serde(rename = "backend")]
    pub backend_type: BackendType,
    /// Whether to enable write-ahead logging (SQLite only)
    pub wal_mode: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: crate::config::default_database_path(),
            backend_type: BackendType::Sqlite,
            wal_mode: true,
        }
    }
}

/// Filter for user searches. Every supplied field must be a substring of
/// the corresponding user field; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSearch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl UserSearch {
    pub fn matches(&self, user: &User) -> bool {
        fn contains(field: &str, needle: &Option<String>) -> bool {
            needle.as_deref().map_or(true, |n| field.contains(n))
        }
        contains(&user.first_name, &self.first_name)
            && contains(&user.last_name, &self.last_name)
            && contains(&user.username, &self.username)
    }
}

pub trait TeamRepository {
    /// Gets a team by UUID
    fn find_team(&self, id: &Uuid) -> Result<Option<Team>>;

    /// Inserts or updates a team, returning the stored record
    fn save_team(&self, team: &Team) -> Result<Team>;

    /// Deletes a team by UUID
    fn delete_team(&self, id: &Uuid) -> Result<()>;

    /// Lists all teams in creation order
    fn list_teams(&self) -> Result<Vec<Team>>;

    /// Gets a team by its unique name
    fn find_team_by_name(&self, name: &str) -> Result<Option<Team>> {
        Ok(self.list_teams()?.into_iter().find(|t| t.name == name))
    }

    fn find_teams_where(&self, predicate: &dyn Fn(&Team) -> bool) -> Result<Vec<Team>> {
        Ok(self
            .list_teams()?
            .into_iter()
            .filter(|t| predicate(t))
            .collect())
    }
}

pub trait UserRepository {
    /// Gets a user by UUID
    fn find_user(&self, id: &Uuid) -> Result<Option<User>>;

    /// Inserts or updates a user, returning the stored record
    fn save_user(&self, user: &User) -> Result<User>;

    /// Deletes a user by UUID
    fn delete_user(&self, id: &Uuid) -> Result<()>;

    /// Lists all users in creation order
    fn list_users(&self) -> Result<Vec<User>>;

    /// Gets a user by its external user number
    fn find_user_by_number(&self, user_number: i64) -> Result<Option<User>> {
        Ok(self
            .list_users()?
            .into_iter()
            .find(|u| u.user_number == user_number))
    }

    fn find_users_where(&self, predicate: &dyn Fn(&User) -> bool) -> Result<Vec<User>> {
        Ok(self
            .list_users()?
            .into_iter()
            .filter(|u| predicate(u))
            .collect())
    }

    /// Lists the members of a team
    fn users_in_team(&self, team_id: &Uuid) -> Result<Vec<User>> {
        self.find_users_where(&|u: &User| u.team_id.as_ref() == Some(team_id))
    }

    fn count_users_in_team(&self, team_id: &Uuid) -> Result<usize> {
        Ok(self.users_in_team(team_id)?.len())
    }

    fn search_users(&self, search: &UserSearch) -> Result<Vec<User>> {
        self.find_users_where(&|u: &User| search.matches(u))
    }
}

pub trait WorkItemRepository {
    /// Gets a work item by UUID
    fn find_work_item(&self, id: &Uuid) -> Result<Option<WorkItem>>;

    /// Inserts or updates a work item, returning the stored record
    fn save_work_item(&self, item: &WorkItem) -> Result<WorkItem>;

    /// Deletes a work item by UUID
    fn delete_work_item(&self, id: &Uuid) -> Result<()>;

    /// Lists all work items in creation order
    fn list_work_items(&self) -> Result<Vec<WorkItem>>;

    /// Gets a work item by its unique description
    fn find_work_item_by_description(&self, description: &str) -> Result<Option<WorkItem>> {
        Ok(self
            .list_work_items()?
            .into_iter()
            .find(|w| w.description == description))
    }

    fn find_work_items_where(
        &self,
        predicate: &dyn Fn(&WorkItem) -> bool,
    ) -> Result<Vec<WorkItem>> {
        Ok(self
            .list_work_items()?
            .into_iter()
            .filter(|w| predicate(w))
            .collect())
    }

    fn work_items_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>> {
        self.find_work_items_where(&|w: &WorkItem| w.status == status)
    }

    fn work_items_by_user(&self, user_id: &Uuid) -> Result<Vec<WorkItem>> {
        self.find_work_items_where(&|w: &WorkItem| w.user_id.as_ref() == Some(user_id))
    }

    fn count_work_items_for_user(&self, user_id: &Uuid) -> Result<usize> {
        Ok(self.work_items_by_user(user_id)?.len())
    }

    fn work_items_description_contains(&self, text: &str) -> Result<Vec<WorkItem>> {
        self.find_work_items_where(&|w: &WorkItem| w.description.contains(text))
    }

    /// Work items created within `[from, to]`, both ends inclusive
    fn work_items_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        self.find_work_items_where(&|w: &WorkItem| w.meta.created_at >= from && w.meta.created_at <= to)
    }
}

pub trait IssueRepository {
    /// Gets an issue by UUID
    fn find_issue(&self, id: &Uuid) -> Result<Option<Issue>>;

    /// Inserts or updates an issue, returning the stored record
    fn save_issue(&self, issue: &Issue) -> Result<Issue>;

    /// Deletes an issue by UUID
    fn delete_issue(&self, id: &Uuid) -> Result<()>;

    /// Lists all issues in creation order
    fn list_issues(&self) -> Result<Vec<Issue>>;

    fn find_issues_where(&self, predicate: &dyn Fn(&Issue) -> bool) -> Result<Vec<Issue>> {
        Ok(self
            .list_issues()?
            .into_iter()
            .filter(|i| predicate(i))
            .collect())
    }

    /// Issues whose description equals `description`
    fn issues_by_description(&self, description: &str) -> Result<Vec<Issue>> {
        self.find_issues_where(&|i: &Issue| i.description == description)
    }

    /// One page of issues in creation order
    fn issue_page(&self, offset: usize, limit: usize) -> Result<Vec<Issue>> {
        Ok(self
            .list_issues()?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}

/// A complete case store: every repository plus a transaction boundary
pub trait CaseStore:
    TeamRepository + UserRepository + WorkItemRepository + IssueRepository + Send + Sync
{
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Runs `f` as one transaction.
    ///
    /// Calls are serialised against each other; if `f` returns an error every
    /// write it made is undone. Must not be nested.
    ///
    /// Only other `atomically` calls are excluded. Reads made outside a
    /// transaction share the store with it and may observe its writes before
    /// they are committed or rolled back, on both backends.
    fn atomically<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
        Self: Sized;

    /// Work items owned by members of a team
    fn work_items_by_team(&self, team_id: &Uuid) -> Result<Vec<WorkItem>> {
        let members: Vec<Uuid> = self.users_in_team(team_id)?.iter().map(User::id).collect();
        self.find_work_items_where(&|w: &WorkItem| w.user_id.map_or(false, |u| members.contains(&u)))
    }

    /// Returns statistics about the store
    fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            team_count: self.list_teams()?.len(),
            user_count: self.list_users()?.len(),
            work_item_count: self.list_work_items()?.len(),
            issue_count: self.list_issues()?.len(),
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub team_count: usize,
    pub user_count: usize,
    pub work_item_count: usize,
    pub issue_count: usize,
    pub backend_type: BackendType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditContext;

    #[test]
    fn test_user_search_matches_substrings() {
        let user = User::new(1, "longenough1", "Grace", "Hopper", &AuditContext::system());

        assert!(UserSearch::default().matches(&user));
        let search = UserSearch {
            first_name: Some("rac".to_string()),
            last_name: Some("Hop".to_string()),
            username: None,
        };
        assert!(search.matches(&user));
        let search = UserSearch {
            username: Some("short".to_string()),
            ..UserSearch::default()
        };
        assert!(!search.matches(&user));
    }

    #[test]
    fn test_backend_type_parse() {
        assert_eq!("SQLite".parse::<BackendType>().unwrap(), BackendType::Sqlite);
        assert_eq!("memory".parse::<BackendType>().unwrap(), BackendType::Memory);
        assert!("yaml".parse::<BackendType>().is_err());
    }
}
