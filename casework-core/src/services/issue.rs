use std::sync::Arc;
use uuid::Uuid;

use crate::db::CaseStore;
use crate::error::{DbResultExt, ServiceError, ServiceResult};
use crate::models::{AuditContext, Issue};

use super::{load_issue, non_empty, require_text};

pub struct IssueService<S> {
    store: Arc<S>,
}

impl<S: CaseStore> IssueService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create(&self, audit: &AuditContext, description: &str) -> ServiceResult<Issue> {
        require_text(description, "issue description")?;

        self.store.atomically(|store| {
            let issue = store
                .save_issue(&Issue::new(description, audit))
                .db(|| format!("saving issue '{}'", description))?;
            log::debug!("{} created issue {}", audit, issue.id());
            Ok(issue)
        })
    }

    pub fn get_by_id(&self, id: &Uuid) -> ServiceResult<Issue> {
        load_issue(&*self.store, id)
    }

    pub fn update_description(
        &self,
        audit: &AuditContext,
        id: &Uuid,
        description: &str,
    ) -> ServiceResult<Issue> {
        require_text(description, "issue description")?;

        self.store.atomically(|store| {
            let mut issue = load_issue(store, id)?;
            if !issue.active {
                return Err(ServiceError::NotAllowed(format!(
                    "issue {} is inactive",
                    id
                )));
            }
            issue.description = description.to_string();
            issue.meta.touch(audit);
            store
                .save_issue(&issue)
                .db(|| format!("saving issue {}", id))
        })
    }

    fn set_active(&self, audit: &AuditContext, id: &Uuid, active: bool) -> ServiceResult<Issue> {
        self.store.atomically(|store| {
            let mut issue = load_issue(store, id)?;
            issue.active = active;
            issue.meta.touch(audit);
            store
                .save_issue(&issue)
                .db(|| format!("saving issue {}", id))
        })
    }

    pub fn activate(&self, audit: &AuditContext, id: &Uuid) -> ServiceResult<Issue> {
        self.set_active(audit, id, true)
    }

    pub fn inactivate(&self, audit: &AuditContext, id: &Uuid) -> ServiceResult<Issue> {
        self.set_active(audit, id, false)
    }

    /// Issues whose description is exactly `description`
    pub fn get_by_description(&self, description: &str) -> ServiceResult<Vec<Issue>> {
        let issues = self
            .store
            .issues_by_description(description)
            .db(|| format!("searching issues for '{}'", description))?;
        non_empty(issues, || format!("no issues described as '{}'", description))
    }

    /// Zero-based page of issues in creation order
    pub fn get_all_by_page(&self, page: usize, size: usize) -> ServiceResult<Vec<Issue>> {
        if size == 0 {
            return Err(ServiceError::InvalidInput(
                "page size must be at least 1".to_string(),
            ));
        }
        let offset = page.checked_mul(size).ok_or_else(|| {
            ServiceError::InvalidInput(format!("page {} of size {} is out of range", page, size))
        })?;

        let issues = self
            .store
            .issue_page(offset, size)
            .db(|| format!("loading issue page {}", page))?;
        non_empty(issues, || format!("issue page {} (size {}) is empty", page, size))
    }

    /// Deletes the issue, clearing the reference held by its work item
    pub fn remove_by_id(&self, audit: &AuditContext, id: &Uuid) -> ServiceResult<Issue> {
        self.store.atomically(|store| {
            let issue = load_issue(store, id)?;

            if let Some(work_item_id) = issue.work_item_id {
                let item = store
                    .find_work_item(&work_item_id)
                    .db(|| format!("loading work item {}", work_item_id))?;
                if let Some(mut item) = item.filter(|w| w.issue_id.as_ref() == Some(id)) {
                    item.issue_id = None;
                    item.meta.touch(audit);
                    store
                        .save_work_item(&item)
                        .db(|| format!("detaching issue from work item '{}'", item.description))?;
                }
            }

            store
                .delete_issue(id)
                .db(|| format!("deleting issue {}", id))?;
            log::info!("{} removed issue {}", audit, id);
            Ok(issue)
        })
    }
}
