//! Domain services
//!
//! Each service wraps repository calls with the precondition checks of its
//! entity. Every write runs inside [`CaseStore::atomically`], so a check and
//! the write it guards cannot interleave with another caller's write.

mod issue;
mod team;
mod user;
mod work_item;

pub use issue::IssueService;
pub use team::TeamService;
pub use user::UserService;
pub use work_item::WorkItemService;

use std::sync::Arc;
use uuid::Uuid;

use crate::config::Limits;
use crate::db::{CaseStore, IssueRepository, TeamRepository, UserRepository, WorkItemRepository};
use crate::error::{DbResultExt, ServiceError, ServiceResult};
use crate::models::{Issue, Team, User, WorkItem};

/// All four services sharing one store
pub struct Services<S> {
    store: Arc<S>,
    pub teams: TeamService<S>,
    pub users: UserService<S>,
    pub work_items: WorkItemService<S>,
    pub issues: IssueService<S>,
}

impl<S: CaseStore> Services<S> {
    pub fn new(store: S, limits: Limits) -> Self {
        let store = Arc::new(store);
        Self {
            teams: TeamService::new(Arc::clone(&store), limits),
            users: UserService::new(Arc::clone(&store), limits),
            work_items: WorkItemService::new(Arc::clone(&store), limits),
            issues: IssueService::new(Arc::clone(&store)),
            store,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Rejects blank text fields
fn require_text(value: &str, field: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Collection queries report an empty result as NotFound
fn non_empty<T>(items: Vec<T>, what: impl FnOnce() -> String) -> ServiceResult<Vec<T>> {
    if items.is_empty() {
        return Err(ServiceError::NotFound(what()));
    }
    Ok(items)
}

fn load_team<R: TeamRepository + ?Sized>(store: &R, id: &Uuid) -> ServiceResult<Team> {
    store
        .find_team(id)
        .db(|| format!("loading team {}", id))?
        .ok_or_else(|| ServiceError::NotFound(format!("team {}", id)))
}

fn load_user<R: UserRepository + ?Sized>(store: &R, id: &Uuid) -> ServiceResult<User> {
    store
        .find_user(id)
        .db(|| format!("loading user {}", id))?
        .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))
}

fn load_user_by_number<R: UserRepository + ?Sized>(
    store: &R,
    user_number: i64,
) -> ServiceResult<User> {
    store
        .find_user_by_number(user_number)
        .db(|| format!("loading user number {}", user_number))?
        .ok_or_else(|| ServiceError::NotFound(format!("user number {}", user_number)))
}

fn load_work_item<R: WorkItemRepository + ?Sized>(store: &R, id: &Uuid) -> ServiceResult<WorkItem> {
    store
        .find_work_item(id)
        .db(|| format!("loading work item {}", id))?
        .ok_or_else(|| ServiceError::NotFound(format!("work item {}", id)))
}

fn load_issue<R: IssueRepository + ?Sized>(store: &R, id: &Uuid) -> ServiceResult<Issue> {
    store
        .find_issue(id)
        .db(|| format!("loading issue {}", id))?
        .ok_or_else(|| ServiceError::NotFound(format!("issue {}", id)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Services;
    use crate::config::Limits;
    use crate::db::MemoryBackend;
    use crate::models::AuditContext;

    pub fn services() -> Services<MemoryBackend> {
        Services::new(MemoryBackend::new(), Limits::default())
    }

    pub fn audit() -> AuditContext {
        AuditContext::new("tester")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::audit;
    use super::*;
    use crate::db::SqliteBackend;
    use crate::error::ErrorKind;
    use crate::models::WorkItemStatus;
    use tempfile::NamedTempFile;

    fn sqlite_services() -> (NamedTempFile, Services<SqliteBackend>) {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let store = SqliteBackend::new(temp_file.path()).unwrap();
        (temp_file, Services::new(store, Limits::default()))
    }

    #[test]
    fn test_case_scenario_on_sqlite() {
        let (_file, services) = sqlite_services();

        services.teams.create(&audit(), "Alpha").unwrap();
        let err = services.teams.create(&audit(), "Alpha").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        services
            .users
            .create(&audit(), 1, "longenough1", "A", "B")
            .unwrap();
        for n in 0..5 {
            let item = services
                .work_items
                .create(&audit(), &format!("task {}", n))
                .unwrap();
            services.work_items.set_user(&audit(), 1, &item.id()).unwrap();
        }
        let sixth = services.work_items.create(&audit(), "task 5").unwrap();
        assert_eq!(
            services
                .work_items
                .set_user(&audit(), 1, &sixth.id())
                .unwrap_err()
                .kind(),
            ErrorKind::MaximumQuantity
        );

        let item = services.work_items.create(&audit(), "fix bug").unwrap();
        services
            .work_items
            .set_status(&audit(), &item.id(), WorkItemStatus::Done)
            .unwrap();
        let issue = services.issues.create(&audit(), "crash on save").unwrap();
        let item = services
            .work_items
            .add_issue_to_work_item(&audit(), &issue.id(), &item.id())
            .unwrap();
        assert_eq!(item.status, WorkItemStatus::Unstarted);
        assert_eq!(item.issue_id, Some(issue.id()));

        let item = services
            .work_items
            .remove_issue_from_work_item(&audit(), &item.id())
            .unwrap();
        assert!(item.issue_id.is_none());
        assert!(services.store().find_issue(&issue.id()).unwrap().is_none());
    }

    fn assert_far_pages_are_empty<S: CaseStore>(services: &Services<S>) {
        for n in 0..3 {
            services
                .issues
                .create(&audit(), &format!("issue {}", n))
                .unwrap();
        }

        for (page, size) in [(1usize << 62, 2), (1, usize::MAX), (usize::MAX / 2, 2)] {
            let err = services.issues.get_all_by_page(page, size).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "page {} size {}", page, size);
        }
        assert_eq!(services.issues.get_all_by_page(0, usize::MAX).unwrap().len(), 3);
    }

    #[test]
    fn test_far_issue_pages_are_not_found_on_both_backends() {
        let (_file, sqlite) = sqlite_services();
        assert_far_pages_are_empty(&sqlite);
        assert_far_pages_are_empty(&super::test_support::services());
    }

    #[test]
    fn test_rejected_write_leaves_sqlite_store_unchanged() {
        let (_file, services) = sqlite_services();
        let limits = Limits {
            max_team_members: 1,
            ..Limits::default()
        };
        let teams = TeamService::new(Arc::clone(&services.store), limits);

        let team = teams.create(&audit(), "Alpha").unwrap();
        let first = services
            .users
            .create(&audit(), 1, "longenough1", "A", "B")
            .unwrap();
        let second = services
            .users
            .create(&audit(), 2, "longenough2", "C", "D")
            .unwrap();

        teams
            .add_user_to_team(&audit(), &team.id(), &first.id())
            .unwrap();
        let err = teams
            .add_user_to_team(&audit(), &team.id(), &second.id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaximumQuantity);
        assert_eq!(services.store().count_users_in_team(&team.id()).unwrap(), 1);
        assert_eq!(
            services.store().find_user(&second.id()).unwrap(),
            Some(second)
        );
    }
}
