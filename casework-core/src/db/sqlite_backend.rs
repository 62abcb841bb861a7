//! SQLite database storage backend
//!
//! Stores every entity in its own table (see `schema.sql`). The derived
//! finders of the repository traits are overridden with SQL so that counts
//! and filters do not load whole tables.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{EntityMeta, Issue, Team, User, WorkItem, WorkItemStatus};

use super::traits::{
    BackendType, CaseStore, DatabaseConfig, IssueRepository, TeamRepository, UserRepository,
    UserSearch, WorkItemRepository,
};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const META_COLUMNS: &str = "id, created_at, created_by, modified_at, modified_by";
const TEAM_COLUMNS: &str = "name, active";
const USER_COLUMNS: &str = "user_number, username, first_name, last_name, active, team_id";
const WORK_ITEM_COLUMNS: &str = "description, status, issue_id, user_id";
const ISSUE_COLUMNS: &str = "description, active, work_item_id";

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
    tx_lock: Mutex<()>,
}

impl SqliteBackend {
    /// Creates a new SQLite backend with write-ahead logging enabled
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(&DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            backend_type: BackendType::Sqlite,
            wal_mode: true,
        })
    }

    /// Opens (creating if needed) the database described by `config`
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path.clone();

        // Create parent directories if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database {:?}", path))?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
            tx_lock: Mutex::new(()),
        };

        backend.init_schema()?;
        log::debug!("Opened SQLite store at {:?}", backend.path);
        Ok(backend)
    }

    /// Returns the path to the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        let has_version_table: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )?;

        let current_version: i32 = if has_version_table {
            conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0)
        } else {
            0
        };

        if current_version == 0 {
            conn.execute_batch(include_str!("schema.sql"))
                .context("Failed to create database schema")?;
        } else if current_version < SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    fn query_rows<T, P>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>>
    where
        P: Params,
    {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    fn query_one<T, P>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>>
    where
        P: Params,
    {
        let conn = self.conn()?;
        let row = conn.query_row(sql, params, map).optional()?;
        Ok(row)
    }

    fn count<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        Ok(n as usize)
    }

    fn delete_row(&self, table: &str, what: &str, id: &Uuid) -> Result<()> {
        let conn = self.conn()?;
        let rows_affected = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", table),
            [id.to_string()],
        )?;
        if rows_affected == 0 {
            anyhow::bail!("{} not found: {}", what, id)
        }
        Ok(())
    }
}

/// Formats a timestamp so that string order equals time order
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<WorkItemStatus> {
    let s: String = row.get(idx)?;
    s.parse::<WorkItemStatus>()
        .map_err(|e| conversion_error(idx, e))
}

/// Reads the five metadata columns that start every entity row
fn meta_from_row(row: &Row<'_>) -> rusqlite::Result<EntityMeta> {
    Ok(EntityMeta {
        id: get_uuid(row, 0)?,
        created_at: get_ts(row, 1)?,
        created_by: row.get(2)?,
        modified_at: get_ts(row, 3)?,
        modified_by: row.get(4)?,
    })
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        meta: meta_from_row(row)?,
        name: row.get(5)?,
        active: row.get(6)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        meta: meta_from_row(row)?,
        user_number: row.get(5)?,
        username: row.get(6)?,
        first_name: row.get(7)?,
        last_name: row.get(8)?,
        active: row.get(9)?,
        team_id: get_opt_uuid(row, 10)?,
    })
}

fn work_item_from_row(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        meta: meta_from_row(row)?,
        description: row.get(5)?,
        status: get_status(row, 6)?,
        issue_id: get_opt_uuid(row, 7)?,
        user_id: get_opt_uuid(row, 8)?,
    })
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        meta: meta_from_row(row)?,
        description: row.get(5)?,
        active: row.get(6)?,
        work_item_id: get_opt_uuid(row, 7)?,
    })
}

fn select(columns: &str, table: &str, tail: &str) -> String {
    format!("SELECT {}, {} FROM {} {}", META_COLUMNS, columns, table, tail)
}

impl TeamRepository for SqliteBackend {
    fn find_team(&self, id: &Uuid) -> Result<Option<Team>> {
        self.query_one(
            &select(TEAM_COLUMNS, "teams", "WHERE id = ?1"),
            [id.to_string()],
            team_from_row,
        )
    }

    fn save_team(&self, team: &Team) -> Result<Team> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO teams (id, created_at, created_by, modified_at, modified_by, name, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                modified_at = excluded.modified_at,
                modified_by = excluded.modified_by,
                name = excluded.name,
                active = excluded.active",
            params![
                team.meta.id.to_string(),
                format_ts(&team.meta.created_at),
                team.meta.created_by,
                format_ts(&team.meta.modified_at),
                team.meta.modified_by,
                team.name,
                team.active,
            ],
        )
        .with_context(|| format!("Failed to save team {}", team.meta.id))?;
        Ok(team.clone())
    }

    fn delete_team(&self, id: &Uuid) -> Result<()> {
        self.delete_row("teams", "Team", id)
    }

    fn list_teams(&self) -> Result<Vec<Team>> {
        self.query_rows(
            &select(TEAM_COLUMNS, "teams", "ORDER BY created_at, rowid"),
            [],
            team_from_row,
        )
    }

    fn find_team_by_name(&self, name: &str) -> Result<Option<Team>> {
        self.query_one(
            &select(TEAM_COLUMNS, "teams", "WHERE name = ?1"),
            [name],
            team_from_row,
        )
    }
}

impl UserRepository for SqliteBackend {
    fn find_user(&self, id: &Uuid) -> Result<Option<User>> {
        self.query_one(
            &select(USER_COLUMNS, "users", "WHERE id = ?1"),
            [id.to_string()],
            user_from_row,
        )
    }

    fn save_user(&self, user: &User) -> Result<User> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, created_at, created_by, modified_at, modified_by,
                                user_number, username, first_name, last_name, active, team_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                modified_at = excluded.modified_at,
                modified_by = excluded.modified_by,
                user_number = excluded.user_number,
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                active = excluded.active,
                team_id = excluded.team_id",
            params![
                user.meta.id.to_string(),
                format_ts(&user.meta.created_at),
                user.meta.created_by,
                format_ts(&user.meta.modified_at),
                user.meta.modified_by,
                user.user_number,
                user.username,
                user.first_name,
                user.last_name,
                user.active,
                user.team_id.map(|id| id.to_string()),
            ],
        )
        .with_context(|| format!("Failed to save user {}", user.user_number))?;
        Ok(user.clone())
    }

    fn delete_user(&self, id: &Uuid) -> Result<()> {
        self.delete_row("users", "User", id)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.query_rows(
            &select(USER_COLUMNS, "users", "ORDER BY created_at, rowid"),
            [],
            user_from_row,
        )
    }

    fn find_user_by_number(&self, user_number: i64) -> Result<Option<User>> {
        self.query_one(
            &select(USER_COLUMNS, "users", "WHERE user_number = ?1"),
            [user_number],
            user_from_row,
        )
    }

    fn users_in_team(&self, team_id: &Uuid) -> Result<Vec<User>> {
        self.query_rows(
            &select(
                USER_COLUMNS,
                "users",
                "WHERE team_id = ?1 ORDER BY created_at, rowid",
            ),
            [team_id.to_string()],
            user_from_row,
        )
    }

    fn count_users_in_team(&self, team_id: &Uuid) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM users WHERE team_id = ?1",
            [team_id.to_string()],
        )
    }

    fn search_users(&self, search: &UserSearch) -> Result<Vec<User>> {
        // instr() keeps the match case-sensitive, unlike LIKE
        self.query_rows(
            &select(
                USER_COLUMNS,
                "users",
                "WHERE (?1 IS NULL OR instr(first_name, ?1) > 0)
                   AND (?2 IS NULL OR instr(last_name, ?2) > 0)
                   AND (?3 IS NULL OR instr(username, ?3) > 0)
                 ORDER BY created_at, rowid",
            ),
            params![search.first_name, search.last_name, search.username],
            user_from_row,
        )
    }
}

impl WorkItemRepository for SqliteBackend {
    fn find_work_item(&self, id: &Uuid) -> Result<Option<WorkItem>> {
        self.query_one(
            &select(WORK_ITEM_COLUMNS, "work_items", "WHERE id = ?1"),
            [id.to_string()],
            work_item_from_row,
        )
    }

    fn save_work_item(&self, item: &WorkItem) -> Result<WorkItem> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO work_items (id, created_at, created_by, modified_at, modified_by,
                                     description, status, issue_id, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                modified_at = excluded.modified_at,
                modified_by = excluded.modified_by,
                description = excluded.description,
                status = excluded.status,
                issue_id = excluded.issue_id,
                user_id = excluded.user_id",
            params![
                item.meta.id.to_string(),
                format_ts(&item.meta.created_at),
                item.meta.created_by,
                format_ts(&item.meta.modified_at),
                item.meta.modified_by,
                item.description,
                item.status.as_str(),
                item.issue_id.map(|id| id.to_string()),
                item.user_id.map(|id| id.to_string()),
            ],
        )
        .with_context(|| format!("Failed to save work item '{}'", item.description))?;
        Ok(item.clone())
    }

    fn delete_work_item(&self, id: &Uuid) -> Result<()> {
        self.delete_row("work_items", "Work item", id)
    }

    fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        self.query_rows(
            &select(WORK_ITEM_COLUMNS, "work_items", "ORDER BY created_at, rowid"),
            [],
            work_item_from_row,
        )
    }

    fn find_work_item_by_description(&self, description: &str) -> Result<Option<WorkItem>> {
        self.query_one(
            &select(WORK_ITEM_COLUMNS, "work_items", "WHERE description = ?1"),
            [description],
            work_item_from_row,
        )
    }

    fn work_items_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>> {
        self.query_rows(
            &select(
                WORK_ITEM_COLUMNS,
                "work_items",
                "WHERE status = ?1 ORDER BY created_at, rowid",
            ),
            [status.as_str()],
            work_item_from_row,
        )
    }

    fn work_items_by_user(&self, user_id: &Uuid) -> Result<Vec<WorkItem>> {
        self.query_rows(
            &select(
                WORK_ITEM_COLUMNS,
                "work_items",
                "WHERE user_id = ?1 ORDER BY created_at, rowid",
            ),
            [user_id.to_string()],
            work_item_from_row,
        )
    }

    fn count_work_items_for_user(&self, user_id: &Uuid) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM work_items WHERE user_id = ?1",
            [user_id.to_string()],
        )
    }

    fn work_items_description_contains(&self, text: &str) -> Result<Vec<WorkItem>> {
        self.query_rows(
            &select(
                WORK_ITEM_COLUMNS,
                "work_items",
                "WHERE instr(description, ?1) > 0 ORDER BY created_at, rowid",
            ),
            [text],
            work_item_from_row,
        )
    }

    fn work_items_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        self.query_rows(
            &select(
                WORK_ITEM_COLUMNS,
                "work_items",
                "WHERE created_at >= ?1 AND created_at <= ?2 ORDER BY created_at, rowid",
            ),
            [format_ts(&from), format_ts(&to)],
            work_item_from_row,
        )
    }
}

impl IssueRepository for SqliteBackend {
    fn find_issue(&self, id: &Uuid) -> Result<Option<Issue>> {
        self.query_one(
            &select(ISSUE_COLUMNS, "issues", "WHERE id = ?1"),
            [id.to_string()],
            issue_from_row,
        )
    }

    fn save_issue(&self, issue: &Issue) -> Result<Issue> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO issues (id, created_at, created_by, modified_at, modified_by,
                                 description, active, work_item_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                modified_at = excluded.modified_at,
                modified_by = excluded.modified_by,
                description = excluded.description,
                active = excluded.active,
                work_item_id = excluded.work_item_id",
            params![
                issue.meta.id.to_string(),
                format_ts(&issue.meta.created_at),
                issue.meta.created_by,
                format_ts(&issue.meta.modified_at),
                issue.meta.modified_by,
                issue.description,
                issue.active,
                issue.work_item_id.map(|id| id.to_string()),
            ],
        )
        .with_context(|| format!("Failed to save issue {}", issue.meta.id))?;
        Ok(issue.clone())
    }

    fn delete_issue(&self, id: &Uuid) -> Result<()> {
        self.delete_row("issues", "Issue", id)
    }

    fn list_issues(&self) -> Result<Vec<Issue>> {
        self.query_rows(
            &select(ISSUE_COLUMNS, "issues", "ORDER BY created_at, rowid"),
            [],
            issue_from_row,
        )
    }

    fn issues_by_description(&self, description: &str) -> Result<Vec<Issue>> {
        self.query_rows(
            &select(
                ISSUE_COLUMNS,
                "issues",
                "WHERE description = ?1 ORDER BY created_at, rowid",
            ),
            [description],
            issue_from_row,
        )
    }

    fn issue_page(&self, offset: usize, limit: usize) -> Result<Vec<Issue>> {
        // SQLite reads a negative OFFSET as 0 and a negative LIMIT as unbounded
        let Ok(offset) = i64::try_from(offset) else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.query_rows(
            &select(
                ISSUE_COLUMNS,
                "issues",
                "ORDER BY created_at, rowid LIMIT ?1 OFFSET ?2",
            ),
            [limit, offset],
            issue_from_row,
        )
    }
}

impl CaseStore for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn atomically<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let _tx = self.tx_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.conn()?
            .execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin transaction")?;

        let result = f(self);
        let finish = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };

        let conn = self.conn()?;
        if let Err(err) = conn.execute_batch(finish) {
            if result.is_err() {
                log::error!("Failed to roll back transaction: {}", err);
                return result;
            }
            // A failed COMMIT (e.g. a deferred foreign key) leaves the
            // transaction open
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                log::error!("Failed to roll back transaction: {}", rollback_err);
            }
            return Err(anyhow::Error::from(err)
                .context("Failed to commit transaction")
                .into());
        }
        result
    }

    fn work_items_by_team(&self, team_id: &Uuid) -> Result<Vec<WorkItem>> {
        self.query_rows(
            "SELECT w.id, w.created_at, w.created_by, w.modified_at, w.modified_by,
                    w.description, w.status, w.issue_id, w.user_id
             FROM work_items w JOIN users u ON w.user_id = u.id
             WHERE u.team_id = ?1
             ORDER BY w.created_at, w.rowid",
            [team_id.to_string()],
            work_item_from_row,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditContext;
    use tempfile::NamedTempFile;

    fn backend() -> (NamedTempFile, SqliteBackend) {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();
        (temp_file, backend)
    }

    #[test]
    fn test_sqlite_backend_create_and_reopen() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let team = {
            let backend = SqliteBackend::new(temp_file.path()).unwrap();
            backend
                .save_team(&Team::new("Alpha", &AuditContext::system()))
                .unwrap()
        };

        // Reopening must not re-run the schema script
        let backend = SqliteBackend::new(temp_file.path()).unwrap();
        assert_eq!(backend.find_team(&team.id()).unwrap(), Some(team));
    }

    #[test]
    fn test_sqlite_backend_user_roundtrip() {
        let (_file, backend) = backend();
        let audit = AuditContext::new("alice");

        let team = backend.save_team(&Team::new("Alpha", &audit)).unwrap();
        let mut user = User::new(42, "longenough1", "Ada", "Lovelace", &audit);
        user.team_id = Some(team.id());
        backend.save_user(&user).unwrap();

        assert_eq!(backend.find_user(&user.id()).unwrap(), Some(user.clone()));
        assert_eq!(backend.find_user_by_number(42).unwrap(), Some(user.clone()));
        assert_eq!(backend.count_users_in_team(&team.id()).unwrap(), 1);
        assert_eq!(backend.users_in_team(&team.id()).unwrap(), vec![user]);
    }

    #[test]
    fn test_sqlite_backend_unique_constraints() {
        let (_file, backend) = backend();
        let audit = AuditContext::system();

        backend.save_team(&Team::new("Alpha", &audit)).unwrap();
        assert!(backend.save_team(&Team::new("Alpha", &audit)).is_err());

        backend
            .save_work_item(&WorkItem::new("fix bug", &audit))
            .unwrap();
        assert!(backend
            .save_work_item(&WorkItem::new("fix bug", &audit))
            .is_err());
        assert_eq!(backend.list_work_items().unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_backend_work_item_queries() {
        let (_file, backend) = backend();
        let audit = AuditContext::system();

        let team = backend.save_team(&Team::new("Alpha", &audit)).unwrap();
        let mut user = User::new(1, "longenough1", "A", "B", &audit);
        user.team_id = Some(team.id());
        backend.save_user(&user).unwrap();

        let start = Utc::now();
        let mut owned = WorkItem::new("fix login bug", &audit);
        owned.user_id = Some(user.id());
        owned.status = WorkItemStatus::Done;
        backend.save_work_item(&owned).unwrap();
        backend
            .save_work_item(&WorkItem::new("write docs", &audit))
            .unwrap();
        let end = Utc::now();

        assert_eq!(backend.work_items_by_team(&team.id()).unwrap(), vec![owned.clone()]);
        assert_eq!(backend.work_items_by_user(&user.id()).unwrap().len(), 1);
        assert_eq!(backend.count_work_items_for_user(&user.id()).unwrap(), 1);
        assert_eq!(
            backend.work_items_by_status(WorkItemStatus::Done).unwrap(),
            vec![owned]
        );
        assert_eq!(backend.work_items_description_contains("bug").unwrap().len(), 1);
        assert!(backend.work_items_description_contains("BUG").unwrap().is_empty());
        assert_eq!(
            backend.work_items_created_between(start, end).unwrap().len(),
            2
        );
        assert!(backend
            .work_items_created_between(end + chrono::Duration::seconds(1), end + chrono::Duration::seconds(2))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sqlite_backend_search_and_pages() {
        let (_file, backend) = backend();
        let audit = AuditContext::system();

        backend
            .save_user(&User::new(1, "ghopper_1906", "Grace", "Hopper", &audit))
            .unwrap();
        backend
            .save_user(&User::new(2, "alovelace_1815", "Ada", "Lovelace", &audit))
            .unwrap();

        let search = UserSearch {
            last_name: Some("ove".to_string()),
            ..UserSearch::default()
        };
        let found = backend.search_users(&search).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_number, 2);
        assert_eq!(backend.search_users(&UserSearch::default()).unwrap().len(), 2);

        for n in 0..5 {
            backend
                .save_issue(&Issue::new(format!("issue {}", n), &audit))
                .unwrap();
        }
        let page = backend.issue_page(2, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].description, "issue 2");
        assert_eq!(backend.issue_page(4, 2).unwrap().len(), 1);
        assert_eq!(backend.issues_by_description("issue 3").unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_backend_page_bounds_beyond_i64() {
        let (_file, backend) = backend();
        let audit = AuditContext::system();
        for n in 0..3 {
            backend
                .save_issue(&Issue::new(format!("issue {}", n), &audit))
                .unwrap();
        }

        assert!(backend.issue_page(1 << 63, 2).unwrap().is_empty());
        assert!(backend.issue_page(usize::MAX, 2).unwrap().is_empty());
        assert!(backend.issue_page(usize::MAX, usize::MAX).unwrap().is_empty());
        assert!(backend.issue_page(3, usize::MAX).unwrap().is_empty());
        assert_eq!(backend.issue_page(1, usize::MAX).unwrap().len(), 2);
    }

    #[test]
    fn test_sqlite_backend_rolls_back_failed_transaction() {
        let (_file, backend) = backend();
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

    #[test]
    fn test_sqlite_backend_delete_missing_row() {
        let (_file, backend) = backend();
        let err = backend.delete_issue(&Uuid::new_v4()).unwrap_err();
        assert!(err.to_string().starts_with("Issue not found"));
    }
}
