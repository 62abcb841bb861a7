use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of whoever is responsible for a change.
///
/// Passed explicitly into every write operation and recorded in the
/// `created_by` / `modified_by` fields of the touched entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub auditor: String,
}

impl AuditContext {
    pub fn new(auditor: impl Into<String>) -> Self {
        Self {
            auditor: auditor.into(),
        }
    }

    /// Audit context used for changes made by the system itself
    pub fn system() -> Self {
        Self::new("system")
    }
}

impl fmt::Display for AuditContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.auditor)
    }
}

/// Identity and audit fields shared by every entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Unique identifier (UUID v4)
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: String,
}

impl EntityMeta {
    /// Creates fresh metadata with a new id, stamped by `audit`
    pub fn new(audit: &AuditContext) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            created_by: audit.auditor.clone(),
            modified_at: now,
            modified_by: audit.auditor.clone(),
        }
    }

    /// Records a modification by `audit`
    pub fn touch(&mut self, audit: &AuditContext) {
        self.modified_at = Utc::now();
        self.modified_by = audit.auditor.clone();
    }
}

impl fmt::Display for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={}, created_at={}, created_by={}, modified_at={}, modified_by={}",
            self.id,
            self.created_at.to_rfc3339(),
            self.created_by,
            self.modified_at.to_rfc3339(),
            self.modified_by
        )
    }
}

/// A named grouping of users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub meta: EntityMeta,
    /// Team name, unique across all teams
    pub name: String,
    pub active: bool,
}

impl Team {
    pub fn new(name: impl Into<String>, audit: &AuditContext) -> Self {
        Self {
            meta: EntityMeta::new(audit),
            name: name.into(),
            active: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Team {{ {}, name={}, active={} }}",
            self.meta, self.name, self.active
        )
    }
}

/// A person who can belong to a team and own work items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub meta: EntityMeta,
    /// External key, unique across all users
    pub user_number: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    /// Owning team, if any
    pub team_id: Option<Uuid>,
}

impl User {
    pub fn new(
        user_number: i64,
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        audit: &AuditContext,
    ) -> Self {
        Self {
            meta: EntityMeta::new(audit),
            user_number,
            username: username.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            active: true,
            team_id: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let team = self
            .team_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "User {{ {}, user_number={}, username={}, first_name={}, last_name={}, active={}, team_id={} }}",
            self.meta,
            self.user_number,
            self.username,
            self.first_name,
            self.last_name,
            self.active,
            team
        )
    }
}

/// Progress of a work item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemStatus {
    Unstarted,
    Started,
    Done,
}

impl WorkItemStatus {
    pub const ALL: [WorkItemStatus; 3] = [
        WorkItemStatus::Unstarted,
        WorkItemStatus::Started,
        WorkItemStatus::Done,
    ];

    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Unstarted => "unstarted",
            WorkItemStatus::Started => "started",
            WorkItemStatus::Done => "done",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unstarted" => Ok(WorkItemStatus::Unstarted),
            "started" => Ok(WorkItemStatus::Started),
            "done" => Ok(WorkItemStatus::Done),
            other => anyhow::bail!(
                "Unknown work item status '{}' (expected unstarted, started or done)",
                other
            ),
        }
    }
}

/// A task with a tri-state status, an optional owner and an optional issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub meta: EntityMeta,
    /// Description, unique across all work items
    pub description: String,
    pub status: WorkItemStatus,
    /// Attached issue (one-to-one)
    pub issue_id: Option<Uuid>,
    /// Owning user
    pub user_id: Option<Uuid>,
}

impl WorkItem {
    pub fn new(description: impl Into<String>, audit: &AuditContext) -> Self {
        Self {
            meta: EntityMeta::new(audit),
            description: description.into(),
            status: WorkItemStatus::Unstarted,
            issue_id: None,
            user_id: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issue = self
            .issue_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let user = self
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "WorkItem {{ {}, description={}, status={}, issue_id={}, user_id={} }}",
            self.meta, self.description, self.status, issue, user
        )
    }
}

/// A defect or ticket, attachable to exactly one work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub meta: EntityMeta,
    pub description: String,
    pub active: bool,
    /// Back-reference to the work item carrying this issue
    pub work_item_id: Option<Uuid>,
}

impl Issue {
    pub fn new(description: impl Into<String>, audit: &AuditContext) -> Self {
        Self {
            meta: EntityMeta::new(audit),
            description: description.into(),
            active: true,
            work_item_id: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let work_item = self
            .work_item_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "Issue {{ {}, description={}, active={}, work_item_id={} }}",
            self.meta, self.description, self.active, work_item
        )
    }
}
