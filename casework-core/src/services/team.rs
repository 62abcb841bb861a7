use std::sync::Arc;
use uuid::Uuid;

use crate::config::Limits;
use crate::db::{CaseStore, TeamRepository};
use crate::error::{DbResultExt, ServiceError, ServiceResult};
use crate::models::{AuditContext, Team, User};

use super::{load_team, load_user, non_empty, require_text};

/// Team lifecycle and membership
pub struct TeamService<S> {
    store: Arc<S>,
    limits: Limits,
}

impl<S: CaseStore> TeamService<S> {
    pub fn new(store: Arc<S>, limits: Limits) -> Self {
        Self { store, limits }
    }

    /// Creates an active team. Fails with DuplicateValue if the name is taken.
    pub fn create(&self, audit: &AuditContext, name: &str) -> ServiceResult<Team> {
        require_text(name, "team name")?;

        self.store.atomically(|store| {
            ensure_name_free(store, name, None)?;
            let team = store
                .save_team(&Team::new(name, audit))
                .db(|| format!("saving team '{}'", name))?;
            log::debug!("{} created team '{}' ({})", audit, team.name, team.id());
            Ok(team)
        })
    }

    pub fn get_by_id(&self, id: &Uuid) -> ServiceResult<Team> {
        load_team(&*self.store, id)
    }

    pub fn get_by_name(&self, name: &str) -> ServiceResult<Team> {
        self.store
            .find_team_by_name(name)
            .db(|| format!("loading team '{}'", name))?
            .ok_or_else(|| ServiceError::NotFound(format!("team '{}'", name)))
    }

    /// Renames an active team
    pub fn update_name(&self, audit: &AuditContext, id: &Uuid, new_name: &str) -> ServiceResult<Team> {
        require_text(new_name, "team name")?;

        self.store.atomically(|store| {
            let mut team = load_team(store, id)?;
            if !team.active {
                return Err(ServiceError::NotAllowed(format!(
                    "team '{}' is inactive and cannot be renamed",
                    team.name
                )));
            }
            ensure_name_free(store, new_name, Some(id))?;

            team.name = new_name.to_string();
            team.meta.touch(audit);
            store
                .save_team(&team)
                .db(|| format!("saving team {}", id))
        })
    }

    pub fn set_active(&self, audit: &AuditContext, active: bool, id: &Uuid) -> ServiceResult<Team> {
        self.store.atomically(|store| {
            let mut team = load_team(store, id)?;
            team.active = active;
            team.meta.touch(audit);
            let team = store
                .save_team(&team)
                .db(|| format!("saving team {}", id))?;
            log::debug!("{} set team '{}' active={}", audit, team.name, active);
            Ok(team)
        })
    }

    /// Makes the user a member of the team and returns the updated user.
    ///
    /// Both must exist and be active, and the team must have room.
    pub fn add_user_to_team(
        &self,
        audit: &AuditContext,
        team_id: &Uuid,
        user_id: &Uuid,
    ) -> ServiceResult<User> {
        self.store.atomically(|store| {
            let team = load_team(store, team_id)?;
            let mut user = load_user(store, user_id)?;
            ensure_both_active(&team, &user)?;

            if user.team_id == Some(team.id()) {
                return Ok(user);
            }

            let members = store
                .count_users_in_team(team_id)
                .db(|| format!("counting members of team {}", team_id))?;
            if members >= self.limits.max_team_members {
                log::warn!(
                    "Rejected adding user {} to full team '{}' ({} members)",
                    user.user_number,
                    team.name,
                    members
                );
                return Err(ServiceError::MaximumQuantity(format!(
                    "team '{}' already has {} members (limit {})",
                    team.name, members, self.limits.max_team_members
                )));
            }

            user.team_id = Some(team.id());
            user.meta.touch(audit);
            let user = store
                .save_user(&user)
                .db(|| format!("saving user {}", user.user_number))?;
            log::debug!(
                "{} added user {} to team '{}'",
                audit,
                user.user_number,
                team.name
            );
            Ok(user)
        })
    }

    /// Clears the user's membership of the team and returns the updated user
    pub fn remove_user_from_team(
        &self,
        audit: &AuditContext,
        team_id: &Uuid,
        user_id: &Uuid,
    ) -> ServiceResult<User> {
        self.store.atomically(|store| {
            let team = load_team(store, team_id)?;
            let mut user = load_user(store, user_id)?;
            ensure_both_active(&team, &user)?;

            if user.team_id != Some(team.id()) {
                return Err(ServiceError::NotAllowed(format!(
                    "user {} is not a member of team '{}'",
                    user.user_number, team.name
                )));
            }

            user.team_id = None;
            user.meta.touch(audit);
            let user = store
                .save_user(&user)
                .db(|| format!("saving user {}", user.user_number))?;
            log::debug!(
                "{} removed user {} from team '{}'",
                audit,
                user.user_number,
                team.name
            );
            Ok(user)
        })
    }

    pub fn get_all(&self) -> ServiceResult<Vec<Team>> {
        let teams = self.store.list_teams().db(|| "listing teams")?;
        non_empty(teams, || "no teams exist".to_string())
    }

    pub fn get_members(&self, team_id: &Uuid) -> ServiceResult<Vec<User>> {
        let team = load_team(&*self.store, team_id)?;
        let members = self
            .store
            .users_in_team(team_id)
            .db(|| format!("listing members of team {}", team_id))?;
        non_empty(members, || format!("team '{}' has no members", team.name))
    }

    /// Deletes the team after detaching its members; returns the removed team
    pub fn remove_by_id(&self, audit: &AuditContext, id: &Uuid) -> ServiceResult<Team> {
        self.store.atomically(|store| {
            let team = load_team(store, id)?;
            let members = store
                .users_in_team(id)
                .db(|| format!("listing members of team {}", id))?;
            for mut user in members {
                user.team_id = None;
                user.meta.touch(audit);
                store
                    .save_user(&user)
                    .db(|| format!("detaching user {} from team {}", user.user_number, id))?;
            }
            store
                .delete_team(id)
                .db(|| format!("deleting team {}", id))?;
            log::info!("{} removed team '{}' ({})", audit, team.name, id);
            Ok(team)
        })
    }
}

fn ensure_name_free<R: TeamRepository + ?Sized>(
    store: &R,
    name: &str,
    owner: Option<&Uuid>,
) -> ServiceResult<()> {
    let existing = store
        .find_team_by_name(name)
        .db(|| format!("looking up team '{}'", name))?;
    match existing {
        Some(team) if Some(&team.meta.id) != owner => Err(ServiceError::DuplicateValue(format!(
            "team name '{}' already exists",
            name
        ))),
        _ => Ok(()),
    }
}

fn ensure_both_active(team: &Team, user: &User) -> ServiceResult<()> {
    if !team.active {
        return Err(ServiceError::NotAllowed(format!(
            "team '{}' is inactive",
            team.name
        )));
    }
    if !user.active {
        return Err(ServiceError::NotAllowed(format!(
            "user {} is inactive",
            user.user_number
        )));
    }
    Ok(())
}
