use std::sync::Arc;
use uuid::Uuid;

use crate::config::Limits;
use crate::db::{CaseStore, UserSearch};
use crate::error::{DbResultExt, ServiceError, ServiceResult};
use crate::models::{AuditContext, User, WorkItemStatus};

use super::{load_user_by_number, non_empty};

/// User lifecycle. Users are addressed by their external user number.
pub struct UserService<S> {
    store: Arc<S>,
    limits: Limits,
}

impl<S: CaseStore> UserService<S> {
    pub fn new(store: Arc<S>, limits: Limits) -> Self {
        Self { store, limits }
    }

    fn validate_username(&self, username: &str) -> ServiceResult<()> {
        let len = username.chars().count();
        if len < self.limits.min_username_len {
            return Err(ServiceError::InvalidInput(format!(
                "username '{}' has {} characters, at least {} required",
                username, len, self.limits.min_username_len
            )));
        }
        Ok(())
    }

    pub fn create(
        &self,
        audit: &AuditContext,
        user_number: i64,
        username: &str,
        first_name: &str,
        last_name: &str,
    ) -> ServiceResult<User> {
        self.validate_username(username)?;

        self.store.atomically(|store| {
            let existing = store
                .find_user_by_number(user_number)
                .db(|| format!("looking up user number {}", user_number))?;
            if existing.is_some() {
                return Err(ServiceError::DuplicateValue(format!(
                    "user number {} already exists",
                    user_number
                )));
            }

            let user = User::new(user_number, username, first_name, last_name, audit);
            let user = store
                .save_user(&user)
                .db(|| format!("saving user {}", user_number))?;
            log::debug!("{} created user {} ({})", audit, user_number, user.username);
            Ok(user)
        })
    }

    pub fn get_by_user_number(&self, user_number: i64) -> ServiceResult<User> {
        load_user_by_number(&*self.store, user_number)
    }

    /// Applies `change` to an active user and saves it
    fn update_active_user(
        &self,
        audit: &AuditContext,
        user_number: i64,
        change: impl FnOnce(&mut User),
    ) -> ServiceResult<User> {
        self.store.atomically(|store| {
            let mut user = load_user_by_number(store, user_number)?;
            if !user.active {
                return Err(ServiceError::NotAllowed(format!(
                    "user {} is inactive",
                    user_number
                )));
            }
            change(&mut user);
            user.meta.touch(audit);
            store
                .save_user(&user)
                .db(|| format!("saving user {}", user_number))
        })
    }

    pub fn update_username(
        &self,
        audit: &AuditContext,
        user_number: i64,
        username: &str,
    ) -> ServiceResult<User> {
        self.validate_username(username)?;
        self.update_active_user(audit, user_number, |user| {
            user.username = username.to_string()
        })
    }

    pub fn update_first_name(
        &self,
        audit: &AuditContext,
        user_number: i64,
        first_name: &str,
    ) -> ServiceResult<User> {
        self.update_active_user(audit, user_number, |user| {
            user.first_name = first_name.to_string()
        })
    }

    pub fn update_last_name(
        &self,
        audit: &AuditContext,
        user_number: i64,
        last_name: &str,
    ) -> ServiceResult<User> {
        self.update_active_user(audit, user_number, |user| {
            user.last_name = last_name.to_string()
        })
    }

    pub fn activate(&self, audit: &AuditContext, user_number: i64) -> ServiceResult<User> {
        self.store.atomically(|store| {
            let mut user = load_user_by_number(store, user_number)?;
            user.active = true;
            user.meta.touch(audit);
            store
                .save_user(&user)
                .db(|| format!("saving user {}", user_number))
        })
    }

    /// Deactivates the user after resetting all of its work items to unstarted
    pub fn inactivate(&self, audit: &AuditContext, user_number: i64) -> ServiceResult<User> {
        self.store.atomically(|store| {
            let mut user = load_user_by_number(store, user_number)?;

            let items = store
                .work_items_by_user(&user.id())
                .db(|| format!("listing work items of user {}", user_number))?;
            let mut reset = 0;
            for mut item in items {
                if item.status == WorkItemStatus::Unstarted {
                    continue;
                }
                item.status = WorkItemStatus::Unstarted;
                item.meta.touch(audit);
                store
                    .save_work_item(&item)
                    .db(|| format!("resetting work item '{}'", item.description))?;
                reset += 1;
            }

            user.active = false;
            user.meta.touch(audit);
            let user = store
                .save_user(&user)
                .db(|| format!("saving user {}", user_number))?;
            log::debug!(
                "{} inactivated user {} ({} work items reset)",
                audit,
                user_number,
                reset
            );
            Ok(user)
        })
    }

    pub fn get_all_by_team_id(&self, team_id: &Uuid) -> ServiceResult<Vec<User>> {
        let users = self
            .store
            .users_in_team(team_id)
            .db(|| format!("listing users of team {}", team_id))?;
        non_empty(users, || format!("no users in team {}", team_id))
    }

    /// Users matching every supplied name fragment
    pub fn search(&self, search: &UserSearch) -> ServiceResult<Vec<User>> {
        let users = self.store.search_users(search).db(|| "searching users")?;
        non_empty(users, || format!("no users match {:?}", search))
    }
}
