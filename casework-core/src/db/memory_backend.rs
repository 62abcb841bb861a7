//! In-process storage backend
//!
//! Keeps every table in a `Vec` behind a mutex. Uniqueness constraints are
//! checked on save the same way the SQLite schema enforces them, and
//! `atomically` restores a snapshot of the tables when the closure fails.

use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Issue, Team, User, WorkItem};

use super::traits::{
    BackendType, CaseStore, IssueRepository, TeamRepository, UserRepository, WorkItemRepository,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    teams: Vec<Team>,
    users: Vec<User>,
    work_items: Vec<WorkItem>,
    issues: Vec<Issue>,
}

/// Inserts `value` or replaces the row with the same id, keeping creation order
fn upsert<T: Clone>(rows: &mut Vec<T>, value: &T, id: impl Fn(&T) -> Uuid) {
    let key = id(value);
    match rows.iter().position(|r| id(r) == key) {
        Some(pos) => rows[pos] = value.clone(),
        None => rows.push(value.clone()),
    }
}

fn remove<T>(rows: &mut Vec<T>, key: &Uuid, id: impl Fn(&T) -> Uuid, what: &str) -> Result<()> {
    let original_len = rows.len();
    rows.retain(|r| &id(r) != key);
    if rows.len() == original_len {
        anyhow::bail!("{} not found: {}", what, key)
    }
    Ok(())
}

/// Memory backend implementation
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    tx_lock: Mutex<()>,
}

impl MemoryBackend {
    /// Creates an empty memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))
    }
}

impl TeamRepository for MemoryBackend {
    fn find_team(&self, id: &Uuid) -> Result<Option<Team>> {
        Ok(self.tables()?.teams.iter().find(|t| &t.meta.id == id).cloned())
    }

    fn save_team(&self, team: &Team) -> Result<Team> {
        let mut tables = self.tables()?;
        if tables
            .teams
            .iter()
            .any(|t| t.name == team.name && t.meta.id != team.meta.id)
        {
            anyhow::bail!("UNIQUE constraint failed: teams.name ({})", team.name);
        }
        upsert(&mut tables.teams, team, Team::id);
        Ok(team.clone())
    }

    fn delete_team(&self, id: &Uuid) -> Result<()> {
        remove(&mut self.tables()?.teams, id, Team::id, "Team")
    }

    fn list_teams(&self) -> Result<Vec<Team>> {
        Ok(self.tables()?.teams.clone())
    }
}

impl UserRepository for MemoryBackend {
    fn find_user(&self, id: &Uuid) -> Result<Option<User>> {
        Ok(self.tables()?.users.iter().find(|u| &u.meta.id == id).cloned())
    }

    fn save_user(&self, user: &User) -> Result<User> {
        let mut tables = self.tables()?;
        if tables
            .users
            .iter()
            .any(|u| u.user_number == user.user_number && u.meta.id != user.meta.id)
        {
            anyhow::bail!(
                "UNIQUE constraint failed: users.user_number ({})",
                user.user_number
            );
        }
        upsert(&mut tables.users, user, User::id);
        Ok(user.clone())
    }

    fn delete_user(&self, id: &Uuid) -> Result<()> {
        remove(&mut self.tables()?.users, id, User::id, "User")
    }

    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables()?.users.clone())
    }
}

impl WorkItemRepository for MemoryBackend {
    fn find_work_item(&self, id: &Uuid) -> Result<Option<WorkItem>> {
        Ok(self
            .tables()?
            .work_items
            .iter()
            .find(|w| &w.meta.id == id)
            .cloned())
    }

    fn save_work_item(&self, item: &WorkItem) -> Result<WorkItem> {
        let mut tables = self.tables()?;
        for other in tables.work_items.iter().filter(|w| w.meta.id != item.meta.id) {
            if other.description == item.description {
                anyhow::bail!(
                    "UNIQUE constraint failed: work_items.description ({})",
                    item.description
                );
            }
            if item.issue_id.is_some() && other.issue_id == item.issue_id {
                anyhow::bail!("UNIQUE constraint failed: work_items.issue_id");
            }
        }
        upsert(&mut tables.work_items, item, WorkItem::id);
        Ok(item.clone())
    }

    fn delete_work_item(&self, id: &Uuid) -> Result<()> {
        remove(&mut self.tables()?.work_items, id, WorkItem::id, "Work item")
    }

    fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        Ok(self.tables()?.work_items.clone())
    }
}

impl IssueRepository for MemoryBackend {
    fn find_issue(&self, id: &Uuid) -> Result<Option<Issue>> {
        Ok(self.tables()?.issues.iter().find(|i| &i.meta.id == id).cloned())
    }

    fn save_issue(&self, issue: &Issue) -> Result<Issue> {
        let mut tables = self.tables()?;
        if issue.work_item_id.is_some()
            && tables
                .issues
                .iter()
                .any(|i| i.work_item_id == issue.work_item_id && i.meta.id != issue.meta.id)
        {
            anyhow::bail!("UNIQUE constraint failed: issues.work_item_id");
        }
        upsert(&mut tables.issues, issue, Issue::id);
        Ok(issue.clone())
    }

    fn delete_issue(&self, id: &Uuid) -> Result<()> {
        remove(&mut self.tables()?.issues, id, Issue::id, "Issue")
    }

    fn list_issues(&self) -> Result<Vec<Issue>> {
        Ok(self.tables()?.issues.clone())
    }
}

impl CaseStore for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn atomically<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        // Guards no data, so poisoning is harmless
        let _tx = self.tx_lock.lock().unwrap_or_else(|e| e.into_inner());
        let before = self.tables()?.clone();

        let result = f(self);
        if result.is_err() {
            *self.tables()? = before;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditContext;

    #[test]
    fn test_memory_backend_team_crud() {
        let backend = MemoryBackend::new();
        let audit = AuditContext::system();

        let team = backend.save_team(&Team::new("Alpha", &audit)).unwrap();
        assert_eq!(backend.find_team(&team.id()).unwrap().unwrap().name, "Alpha");
        assert_eq!(
            backend.find_team_by_name("Alpha").unwrap().unwrap().id(),
            team.id()
        );

        backend.delete_team(&team.id()).unwrap();
        assert!(backend.find_team(&team.id()).unwrap().is_none());
        assert!(backend.delete_team(&team.id()).is_err());
    }

    #[test]
    fn test_memory_backend_enforces_unique_name() {
        let backend = MemoryBackend::new();
        let audit = AuditContext::system();

        let mut first = backend.save_team(&Team::new("Alpha", &audit)).unwrap();
        assert!(backend.save_team(&Team::new("Alpha", &audit)).is_err());

        // Re-saving the same row is an update, not a conflict
        first.active = false;
        backend.save_team(&first).unwrap();
        assert_eq!(backend.list_teams().unwrap().len(), 1);
        assert!(!backend.list_teams().unwrap()[0].active);
    }

    #[test]
    fn test_memory_backend_upsert_keeps_creation_order() {
        let backend = MemoryBackend::new();
        let audit = AuditContext::system();

        let mut first = backend.save_issue(&Issue::new("one", &audit)).unwrap();
        backend.save_issue(&Issue::new("two", &audit)).unwrap();
        first.description = "one, edited".to_string();
        backend.save_issue(&first).unwrap();

        let page = backend.issue_page(0, 10).unwrap();
        assert_eq!(page[0].description, "one, edited");
        assert_eq!(page[1].description, "two");
    }

    #[test]
    fn test_memory_backend_rolls_back_failed_transaction() {
        let backend = MemoryBackend::new();
        let audit = AuditContext::system();

        let result: Result<()> = backend.atomically(|store| {
            store.save_team(&Team::new("Alpha", &audit))?;
            anyhow::bail!("abort")
        });
        assert!(result.is_err());
        assert!(backend.list_teams().unwrap().is_empty());

        let saved: Result<Team> =
            backend.atomically(|store| store.save_team(&Team::new("Beta", &audit)));
        assert!(saved.is_ok());
        assert_eq!(backend.list_teams().unwrap().len(), 1);
    }
}
