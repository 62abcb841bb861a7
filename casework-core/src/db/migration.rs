//! Migration utilities for moving data between stores
//!
//! A [`Snapshot`] holds every row of every table. It can be taken from any
//! [`CaseStore`], written to JSON or YAML, and loaded into another store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::{Issue, Team, User, WorkItem};

use super::traits::CaseStore;

/// Full copy of a store's contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub teams: Vec<Team>,
    pub users: Vec<User>,
    pub work_items: Vec<WorkItem>,
    pub issues: Vec<Issue>,
}

impl Snapshot {
    /// Total number of rows across all tables
    pub fn entity_count(&self) -> usize {
        self.teams.len() + self.users.len() + self.work_items.len() + self.issues.len()
    }
}

/// Reads every table of `store`
pub fn export_snapshot<S: CaseStore>(store: &S) -> Result<Snapshot> {
    Ok(Snapshot {
        teams: store.list_teams()?,
        users: store.list_users()?,
        work_items: store.list_work_items()?,
        issues: store.list_issues()?,
    })
}

/// Writes every row of `snapshot` into `store` in one transaction
///
/// Rows with an id already present are overwritten. Returns the number of
/// rows written.
pub fn import_snapshot<S: CaseStore>(store: &S, snapshot: &Snapshot) -> Result<usize> {
    store.atomically(|tx| {
        for team in &snapshot.teams {
            tx.save_team(team)?;
        }
        for user in &snapshot.users {
            tx.save_user(user)?;
        }
        for issue in &snapshot.issues {
            tx.save_issue(issue)?;
        }
        for item in &snapshot.work_items {
            tx.save_work_item(item)?;
        }
        Ok(snapshot.entity_count())
    })
}

/// Copies the contents of one store into another
///
/// # Returns
/// The number of rows migrated
pub fn migrate<A: CaseStore, B: CaseStore>(from: &A, to: &B) -> Result<usize> {
    let snapshot = export_snapshot(from).context("Failed to read source store")?;
    import_snapshot(to, &snapshot).context("Failed to write destination store")
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Writes a snapshot to disk, as YAML for `.yaml`/`.yml` files and JSON otherwise
pub fn export_to_file<P: AsRef<Path>>(snapshot: &Snapshot, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = if is_yaml(path) {
        serde_yaml::to_string(snapshot).context("Failed to serialize snapshot to YAML")?
    } else {
        serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot to JSON")?
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write snapshot to {:?}", path))
}

/// Reads a snapshot written by [`export_to_file`]
pub fn import_from_file<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read snapshot {:?}", path))?;

    if is_yaml(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML snapshot {:?}", path))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON snapshot {:?}", path))
    }
}
