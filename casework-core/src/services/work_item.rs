use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Limits;
use crate::db::CaseStore;
use crate::error::{DbResultExt, ServiceError, ServiceResult};
use crate::models::{AuditContext, WorkItem, WorkItemStatus};

use super::{load_issue, load_user_by_number, load_work_item, non_empty, require_text};

/// Work item lifecycle, ownership and issue pairing
pub struct WorkItemService<S> {
    store: Arc<S>,
    limits: Limits,
}

impl<S: CaseStore> WorkItemService<S> {
    pub fn new(store: Arc<S>, limits: Limits) -> Self {
        Self { store, limits }
    }

    /// Creates an unstarted work item with a unique description
    pub fn create(&self, audit: &AuditContext, description: &str) -> ServiceResult<WorkItem> {
        require_text(description, "work item description")?;

        self.store.atomically(|store| {
            let existing = store
                .find_work_item_by_description(description)
                .db(|| format!("looking up work item '{}'", description))?;
            if existing.is_some() {
                return Err(ServiceError::DuplicateValue(format!(
                    "work item '{}' already exists",
                    description
                )));
            }

            let item = store
                .save_work_item(&WorkItem::new(description, audit))
                .db(|| format!("saving work item '{}'", description))?;
            log::debug!("{} created work item '{}' ({})", audit, description, item.id());
            Ok(item)
        })
    }

    pub fn get_by_id(&self, id: &Uuid) -> ServiceResult<WorkItem> {
        load_work_item(&*self.store, id)
    }

    /// Overwrites the status; any transition is accepted
    pub fn set_status(
        &self,
        audit: &AuditContext,
        id: &Uuid,
        status: WorkItemStatus,
    ) -> ServiceResult<WorkItem> {
        self.store.atomically(|store| {
            let mut item = load_work_item(store, id)?;
            item.status = status;
            item.meta.touch(audit);
            store
                .save_work_item(&item)
                .db(|| format!("saving work item '{}'", item.description))
        })
    }

    /// Assigns the work item to an active user with spare capacity
    pub fn set_user(
        &self,
        audit: &AuditContext,
        user_number: i64,
        work_item_id: &Uuid,
    ) -> ServiceResult<WorkItem> {
        self.store.atomically(|store| {
            let user = load_user_by_number(store, user_number)?;
            let mut item = load_work_item(store, work_item_id)?;

            if !user.active {
                return Err(ServiceError::InvalidInput(format!(
                    "user {} is inactive and cannot be assigned work",
                    user_number
                )));
            }
            if item.user_id == Some(user.id()) {
                return Ok(item);
            }

            let owned = store
                .count_work_items_for_user(&user.id())
                .db(|| format!("counting work items of user {}", user_number))?;
            if owned >= self.limits.max_work_items_per_user {
                log::warn!(
                    "Rejected assigning '{}' to user {} ({} work items)",
                    item.description,
                    user_number,
                    owned
                );
                return Err(ServiceError::MaximumQuantity(format!(
                    "user {} already has {} work items (limit {})",
                    user_number, owned, self.limits.max_work_items_per_user
                )));
            }

            item.user_id = Some(user.id());
            item.meta.touch(audit);
            let item = store
                .save_work_item(&item)
                .db(|| format!("saving work item '{}'", item.description))?;
            log::debug!(
                "{} assigned work item '{}' to user {}",
                audit,
                item.description,
                user_number
            );
            Ok(item)
        })
    }

    /// Attaches an issue to a done work item, which resets it to unstarted
    pub fn add_issue_to_work_item(
        &self,
        audit: &AuditContext,
        issue_id: &Uuid,
        work_item_id: &Uuid,
    ) -> ServiceResult<WorkItem> {
        self.store.atomically(|store| {
            let mut issue = load_issue(store, issue_id)?;
            let mut item = load_work_item(store, work_item_id)?;

            if item.status != WorkItemStatus::Done {
                return Err(ServiceError::NotAllowed(format!(
                    "work item '{}' has status {}; issues can only be added to done work items",
                    item.description, item.status
                )));
            }
            if let Some(other) = issue.work_item_id.filter(|other| other != work_item_id) {
                return Err(ServiceError::NotAllowed(format!(
                    "issue {} is already attached to work item {}",
                    issue_id, other
                )));
            }

            // Release the issue this item carried before, if it is a different one
            if let Some(previous_id) = item.issue_id.filter(|prev| prev != issue_id) {
                let previous = store
                    .find_issue(&previous_id)
                    .db(|| format!("loading issue {}", previous_id))?;
                if let Some(mut previous) = previous {
                    previous.work_item_id = None;
                    previous.meta.touch(audit);
                    store
                        .save_issue(&previous)
                        .db(|| format!("detaching issue {}", previous_id))?;
                }
            }

            issue.work_item_id = Some(item.id());
            issue.meta.touch(audit);
            store
                .save_issue(&issue)
                .db(|| format!("saving issue {}", issue_id))?;

            item.issue_id = Some(issue.id());
            item.status = WorkItemStatus::Unstarted;
            item.meta.touch(audit);
            let item = store
                .save_work_item(&item)
                .db(|| format!("saving work item '{}'", item.description))?;
            log::debug!(
                "{} attached issue {} to work item '{}'",
                audit,
                issue_id,
                item.description
            );
            Ok(item)
        })
    }

    /// Detaches the work item's issue and deletes the issue
    pub fn remove_issue_from_work_item(
        &self,
        audit: &AuditContext,
        work_item_id: &Uuid,
    ) -> ServiceResult<WorkItem> {
        self.store.atomically(|store| {
            let mut item = load_work_item(store, work_item_id)?;
            let Some(issue_id) = item.issue_id.take() else {
                return Ok(item);
            };

            item.meta.touch(audit);
            let item = store
                .save_work_item(&item)
                .db(|| format!("saving work item '{}'", item.description))?;

            let issue = store
                .find_issue(&issue_id)
                .db(|| format!("loading issue {}", issue_id))?;
            if issue.is_some() {
                store
                    .delete_issue(&issue_id)
                    .db(|| format!("deleting issue {}", issue_id))?;
            }
            log::debug!(
                "{} removed issue {} from work item '{}'",
                audit,
                issue_id,
                item.description
            );
            Ok(item)
        })
    }

    pub fn get_by_status(&self, status: WorkItemStatus) -> ServiceResult<Vec<WorkItem>> {
        let items = self
            .store
            .work_items_by_status(status)
            .db(|| format!("listing {} work items", status))?;
        non_empty(items, || format!("no work items with status {}", status))
    }

    /// Work items owned by members of the team
    pub fn get_by_team_id(&self, team_id: &Uuid) -> ServiceResult<Vec<WorkItem>> {
        let items = self
            .store
            .work_items_by_team(team_id)
            .db(|| format!("listing work items of team {}", team_id))?;
        non_empty(items, || format!("no work items for team {}", team_id))
    }

    pub fn get_by_user_number(&self, user_number: i64) -> ServiceResult<Vec<WorkItem>> {
        let user = load_user_by_number(&*self.store, user_number)?;
        let items = self
            .store
            .work_items_by_user(&user.id())
            .db(|| format!("listing work items of user {}", user_number))?;
        non_empty(items, || format!("no work items for user {}", user_number))
    }

    pub fn get_by_description_contains(&self, text: &str) -> ServiceResult<Vec<WorkItem>> {
        let items = self
            .store
            .work_items_description_contains(text)
            .db(|| format!("searching work items for '{}'", text))?;
        non_empty(items, || format!("no work items containing '{}'", text))
    }

    /// Work items created within `[from, to]`
    pub fn get_by_created_between_dates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<WorkItem>> {
        if from > to {
            return Err(ServiceError::InvalidInput(format!(
                "start {} is after end {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        let items = self
            .store
            .work_items_created_between(from, to)
            .db(|| "listing work items by creation date")?;
        non_empty(items, || {
            format!(
                "no work items created between {} and {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )
        })
    }

    /// Deletes the work item together with its issue; returns the removed item
    pub fn remove_by_id(&self, audit: &AuditContext, id: &Uuid) -> ServiceResult<WorkItem> {
        self.store.atomically(|store| {
            let item = load_work_item(store, id)?;
            store
                .delete_work_item(id)
                .db(|| format!("deleting work item '{}'", item.description))?;

            if let Some(issue_id) = item.issue_id {
                if store
                    .find_issue(&issue_id)
                    .db(|| format!("loading issue {}", issue_id))?
                    .is_some()
                {
                    store
                        .delete_issue(&issue_id)
                        .db(|| format!("deleting issue {}", issue_id))?;
                }
            }
            log::info!("{} removed work item '{}' ({})", audit, item.description, id);
            Ok(item)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{IssueRepository, WorkItemRepository};
    use crate::error::ErrorKind;
    use crate::services::test_support::{audit, services};

    #[test]
    fn test_create_duplicate_description() {
        let services = services();
        let item = services.work_items.create(&audit(), "fix bug").unwrap();
        assert_eq!(item.status, WorkItemStatus::Unstarted);

        let err = services.work_items.create(&audit(), "fix bug").unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateValue(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            services.work_items.create(&audit(), "").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_status_is_freely_settable() {
        let services = services();
        let item = services.work_items.create(&audit(), "fix bug").unwrap();

        for status in [
            WorkItemStatus::Done,
            WorkItemStatus::Unstarted,
            WorkItemStatus::Started,
            WorkItemStatus::Done,
        ] {
            let item = services
                .work_items
                .set_status(&audit(), &item.id(), status)
                .unwrap();
            assert_eq!(item.status, status);
        }
        assert_eq!(
            services
                .work_items
                .set_status(&audit(), &Uuid::new_v4(), WorkItemStatus::Done)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_sixth_work_item_is_rejected() {
        let services = services();
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
        let err = services
            .work_items
            .set_user(&audit(), 1, &sixth.id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaximumQuantity);
        assert!(services.work_items.get_by_id(&sixth.id()).unwrap().user_id.is_none());
        assert_eq!(services.work_items.get_by_user_number(1).unwrap().len(), 5);
    }

    #[test]
    fn test_set_user_requires_active_user() {
        let services = services();
        services
            .users
            .create(&audit(), 1, "longenough1", "A", "B")
            .unwrap();
        services.users.inactivate(&audit(), 1).unwrap();
        let item = services.work_items.create(&audit(), "fix bug").unwrap();

        let err = services
            .work_items
            .set_user(&audit(), 1, &item.id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            services
                .work_items
                .set_user(&audit(), 2, &item.id())
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_issue_attaches_only_to_done_items() {
        let services = services();
        let item = services.work_items.create(&audit(), "fix bug").unwrap();
        let issue = services.issues.create(&audit(), "crash on save").unwrap();

        for status in [WorkItemStatus::Unstarted, WorkItemStatus::Started] {
            services
                .work_items
                .set_status(&audit(), &item.id(), status)
                .unwrap();
            let err = services
                .work_items
                .add_issue_to_work_item(&audit(), &issue.id(), &item.id())
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotAllowed);
            assert!(err.to_string().contains(status.as_str()));
        }
        assert!(services.work_items.get_by_id(&item.id()).unwrap().issue_id.is_none());
    }

    #[test]
    fn test_issue_lifecycle_on_work_item() {
        let services = services();
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
        assert_eq!(
            services.issues.get_by_id(&issue.id()).unwrap().work_item_id,
            Some(item.id())
        );

        let item = services
            .work_items
            .remove_issue_from_work_item(&audit(), &item.id())
            .unwrap();
        assert!(item.issue_id.is_none());
        assert!(services.store().find_issue(&issue.id()).unwrap().is_none());

        // Nothing attached: a no-op
        services
            .work_items
            .remove_issue_from_work_item(&audit(), &item.id())
            .unwrap();
        assert_eq!(
            services
                .work_items
                .remove_issue_from_work_item(&audit(), &Uuid::new_v4())
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_issue_cannot_be_shared_and_replacing_releases_previous() {
        let services = services();
        let first = services.work_items.create(&audit(), "first").unwrap();
        let second = services.work_items.create(&audit(), "second").unwrap();
        for item in [&first, &second] {
            services
                .work_items
                .set_status(&audit(), &item.id(), WorkItemStatus::Done)
                .unwrap();
        }
        let old_issue = services.issues.create(&audit(), "old").unwrap();
        let new_issue = services.issues.create(&audit(), "new").unwrap();

        services
            .work_items
            .add_issue_to_work_item(&audit(), &old_issue.id(), &first.id())
            .unwrap();
        let err = services
            .work_items
            .add_issue_to_work_item(&audit(), &old_issue.id(), &second.id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowed);

        services
            .work_items
            .set_status(&audit(), &first.id(), WorkItemStatus::Done)
            .unwrap();
        let first = services
            .work_items
            .add_issue_to_work_item(&audit(), &new_issue.id(), &first.id())
            .unwrap();
        assert_eq!(first.issue_id, Some(new_issue.id()));
        assert!(services
            .issues
            .get_by_id(&old_issue.id())
            .unwrap()
            .work_item_id
            .is_none());
    }

    #[test]
    fn test_read_queries() {
        let services = services();
        let team = services.teams.create(&audit(), "Alpha").unwrap();
        let user = services
            .users
            .create(&audit(), 1, "longenough1", "A", "B")
            .unwrap();
        services
            .teams
            .add_user_to_team(&audit(), &team.id(), &user.id())
            .unwrap();

        let start = Utc::now();
        let login = services.work_items.create(&audit(), "fix login bug").unwrap();
        services.work_items.create(&audit(), "write docs").unwrap();
        let end = Utc::now();
        services.work_items.set_user(&audit(), 1, &login.id()).unwrap();

        assert_eq!(services.work_items.get_by_team_id(&team.id()).unwrap().len(), 1);
        assert_eq!(services.work_items.get_by_user_number(1).unwrap().len(), 1);
        assert_eq!(
            services.work_items.get_by_description_contains("bug").unwrap()[0].id(),
            login.id()
        );
        assert_eq!(
            services
                .work_items
                .get_by_status(WorkItemStatus::Unstarted)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            services
                .work_items
                .get_by_created_between_dates(start, end)
                .unwrap()
                .len(),
            2
        );

        assert_eq!(
            services
                .work_items
                .get_by_status(WorkItemStatus::Done)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            services
                .work_items
                .get_by_description_contains("deploy")
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            services
                .work_items
                .get_by_created_between_dates(end, start - chrono::Duration::seconds(1))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            services
                .work_items
                .get_by_user_number(42)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_remove_by_id_deletes_issue() {
        let services = services();
        let item = services.work_items.create(&audit(), "fix bug").unwrap();
        services
            .work_items
            .set_status(&audit(), &item.id(), WorkItemStatus::Done)
            .unwrap();
        let issue = services.issues.create(&audit(), "crash").unwrap();
        services
            .work_items
            .add_issue_to_work_item(&audit(), &issue.id(), &item.id())
            .unwrap();

        let removed = services.work_items.remove_by_id(&audit(), &item.id()).unwrap();
        assert_eq!(removed.description, "fix bug");
        assert!(services.store().find_work_item(&item.id()).unwrap().is_none());
        assert!(services.store().find_issue(&issue.id()).unwrap().is_none());
        assert_eq!(
            services
                .work_items
                .remove_by_id(&audit(), &item.id())
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}
