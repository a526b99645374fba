//! In-memory [`OncallStore`] used by the test-suite.
//!
//! Mutations check everything before touching state, which gives the same
//! all-or-nothing behaviour the PostgreSQL store gets from transactions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;

use crate::audit::AuditEntry;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::policy::{GoverningEvent, MemberViewer, Viewer};
use crate::store::OncallStore;

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub profile: UserProfile,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredRole {
    pub id: i64,
    pub name: String,
    pub display_order: i32,
}

#[derive(Debug, Clone)]
pub struct StoredSchedule {
    pub id: i64,
    pub team_id: i64,
    pub roster_id: i64,
    pub role_id: i64,
    pub events: Vec<ScheduleEvent>,
}

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub team_id: i64,
    pub role_id: i64,
    pub user_id: i64,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone)]
pub struct DeletedTeam {
    pub team_id: i64,
    pub old_name: String,
    pub new_name: String,
    pub deletion_date: i64,
}

#[derive(Debug, Default)]
pub struct State {
    next_id: i64,
    pub teams: Vec<Team>,
    pub users: Vec<StoredUser>,
    pub roles: Vec<StoredRole>,
    pub rosters: Vec<(i64, i64, String)>,
    /// (roster_id, user_id, in_rotation)
    pub members: Vec<(i64, i64, bool)>,
    pub schedules: Vec<StoredSchedule>,
    pub events: Vec<StoredEvent>,
    pub team_admins: Vec<(i64, i64)>,
    pub team_users: Vec<(i64, i64)>,
    pub team_services: Vec<(i64, String)>,
    pub deleted_teams: Vec<DeletedTeam>,
    pub sessions: Vec<Session>,
    pub audits: Vec<AuditEntry>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_id(&self, name: &str) -> Option<i64> {
        self.users
            .iter()
            .find(|u| u.profile.name == name)
            .map(|u| u.profile.id)
    }

    fn active_team(&self, name: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.name == name && t.active)
    }

    fn team_id(&self, name: &str) -> i64 {
        self.teams
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.id)
            .unwrap_or_else(|| panic!("no team {name}"))
    }

    fn user_name(&self, id: i64) -> String {
        self.users
            .iter()
            .find(|u| u.profile.id == id)
            .map(|u| u.profile.name.clone())
            .unwrap_or_default()
    }

    fn rank(&self, role_id: i64) -> i32 {
        self.roles
            .iter()
            .find(|r| r.id == role_id)
            .map(|r| r.display_order)
            .unwrap_or(i32::MAX)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store poisoned")
    }

    pub fn audit_count(&self) -> usize {
        self.state().audits.len()
    }

    // Fixture builders

    pub fn add_user(&self, name: &str, god: bool) -> i64 {
        let mut s = self.state();
        let id = s.next_id();
        s.users.push(StoredUser {
            profile: UserProfile {
                id,
                name: name.to_string(),
                full_name: None,
                time_zone: Some("US/Pacific".into()),
                photo_url: None,
                active: true,
                god,
                contacts: BTreeMap::new(),
            },
            password_hash: None,
        });
        id
    }

    pub fn set_password_hash(&self, user: &str, hash: &str) {
        let mut s = self.state();
        if let Some(u) = s.users.iter_mut().find(|u| u.profile.name == user) {
            u.password_hash = Some(hash.to_string());
        }
    }

    pub fn add_team(&self, name: &str) -> i64 {
        let mut s = self.state();
        let id = s.next_id();
        s.teams.push(Team {
            id,
            name: name.to_string(),
            description: None,
            email: None,
            slack_channel: None,
            slack_channel_notifications: None,
            override_phone_number: None,
            scheduling_timezone: Some("US/Pacific".into()),
            iris_plan: None,
            iris_enabled: false,
            api_managed_roster: false,
            active: true,
        });
        id
    }

    pub fn add_role(&self, name: &str, display_order: i32) -> i64 {
        let mut s = self.state();
        let id = s.next_id();
        s.roles.push(StoredRole {
            id,
            name: name.to_string(),
            display_order,
        });
        id
    }

    pub fn add_roster(&self, team: &str, name: &str) -> i64 {
        let mut s = self.state();
        let team_id = s.team_id(team);
        let id = s.next_id();
        s.rosters.push((id, team_id, name.to_string()));
        id
    }

    pub fn add_member(&self, roster_id: i64, user_id: i64, in_rotation: bool) {
        self.state().members.push((roster_id, user_id, in_rotation));
    }

    pub fn add_schedule(&self, team: &str, roster_id: i64, role_id: i64) -> i64 {
        let mut s = self.state();
        let team_id = s.team_id(team);
        let id = s.next_id();
        s.schedules.push(StoredSchedule {
            id,
            team_id,
            roster_id,
            role_id,
            events: vec![ScheduleEvent {
                start: 0,
                duration: 604_800,
            }],
        });
        id
    }

    pub fn add_event(&self, team: &str, role_id: i64, user_id: i64, start: i64, end: i64) -> i64 {
        let mut s = self.state();
        let team_id = s.team_id(team);
        let id = s.next_id();
        s.events.push(StoredEvent {
            id,
            team_id,
            role_id,
            user_id,
            start,
            end,
        });
        id
    }

    pub fn grant_admin(&self, team: &str, user_id: i64) {
        let mut s = self.state();
        let team_id = s.team_id(team);
        s.team_admins.push((team_id, user_id));
    }

    pub fn add_team_user(&self, team: &str, user_id: i64) {
        let mut s = self.state();
        let team_id = s.team_id(team);
        s.team_users.push((team_id, user_id));
    }

    pub fn add_service(&self, team: &str, service: &str) {
        let mut s = self.state();
        let team_id = s.team_id(team);
        s.team_services.push((team_id, service.to_string()));
    }
}

#[async_trait]
impl OncallStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn team_by_name(&self, name: &str, active: bool) -> AppResult<Option<Team>> {
        Ok(self
            .state()
            .teams
            .iter()
            .find(|t| t.name == name && t.active == active)
            .cloned())
    }

    async fn team_names(&self, filter: &NameFilter) -> AppResult<Vec<String>> {
        let mut names: Vec<String> = self
            .state()
            .teams
            .iter()
            .filter(|t| t.active && filter.matches(t.id, &t.name))
            .map(|t| t.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn create_team(
        &self,
        team: &NewTeam,
        creator: &str,
        audit: &AuditEntry,
    ) -> AppResult<i64> {
        let mut s = self.state();
        if s.teams.iter().any(|t| t.name == team.name) {
            return Err(AppError::Conflict(format!(
                "A team named '{}' already exists",
                team.name
            )));
        }
        let id = s.next_id();
        s.teams.push(Team {
            id,
            name: team.name.clone(),
            description: team.description.clone(),
            email: team.email.clone(),
            slack_channel: team.slack_channel.clone(),
            slack_channel_notifications: team.slack_channel_notifications.clone(),
            override_phone_number: team.override_phone_number.clone(),
            scheduling_timezone: Some(team.scheduling_timezone.clone()),
            iris_plan: team.iris_plan.clone(),
            iris_enabled: team.iris_enabled,
            api_managed_roster: team.api_managed_roster,
            active: true,
        });
        if let Some(user_id) = s.user_id(creator) {
            s.team_admins.push((id, user_id));
            s.team_users.push((id, user_id));
        }
        s.audits.push(audit.clone().with("team_id", json!(id)));
        Ok(id)
    }

    async fn update_team(
        &self,
        name: &str,
        patch: &TeamPatch,
        audit: &AuditEntry,
    ) -> AppResult<()> {
        let mut s = self.state();
        let id = s
            .active_team(name)
            .map(|t| t.id)
            .ok_or_else(|| AppError::NotFound(format!("team \"{name}\" not found")))?;
        if let Some(new_name) = &patch.name {
            if s.teams.iter().any(|t| t.id != id && &t.name == new_name) {
                return Err(AppError::Conflict(format!(
                    "A team named '{new_name}' already exists"
                )));
            }
        }

        let team = s
            .teams
            .iter_mut()
            .find(|t| t.id == id)
            .expect("team looked up above");
        if let Some(v) = &patch.name {
            team.name = v.clone();
        }
        if let Some(v) = &patch.description {
            team.description = v.clone();
        }
        if let Some(v) = &patch.slack_channel {
            team.slack_channel = v.clone();
        }
        if let Some(v) = &patch.slack_channel_notifications {
            team.slack_channel_notifications = v.clone();
        }
        if let Some(v) = &patch.email {
            team.email = v.clone();
        }
        if let Some(v) = &patch.scheduling_timezone {
            team.scheduling_timezone = Some(v.clone());
        }
        if let Some(v) = &patch.iris_plan {
            team.iris_plan = v.clone();
        }
        if let Some(v) = patch.iris_enabled {
            team.iris_enabled = v;
        }
        if let Some(v) = &patch.override_phone_number {
            team.override_phone_number = v.clone();
        }
        if let Some(v) = patch.api_managed_roster {
            team.api_managed_roster = v;
        }
        s.audits.push(audit.clone());
        Ok(())
    }

    async fn delete_team(
        &self,
        name: &str,
        new_name: &str,
        now: i64,
        audit: &AuditEntry,
    ) -> AppResult<()> {
        let mut s = self.state();
        let id = s
            .active_team(name)
            .map(|t| t.id)
            .ok_or_else(|| AppError::NotFound(format!("team \"{name}\" not found")))?;

        s.events.retain(|e| !(e.team_id == id && e.start > now));
        if let Some(team) = s.teams.iter_mut().find(|t| t.id == id) {
            team.active = false;
            team.name = new_name.to_string();
        }
        s.deleted_teams.push(DeletedTeam {
            team_id: id,
            old_name: name.to_string(),
            new_name: new_name.to_string(),
            deletion_date: now,
        });
        s.audits.push(audit.clone());
        Ok(())
    }

    async fn team_user_names(&self, team_id: i64) -> AppResult<Vec<String>> {
        let s = self.state();
        let mut names: Vec<String> = s
            .team_users
            .iter()
            .filter(|(t, _)| *t == team_id)
            .map(|(_, u)| s.user_name(*u))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn team_admin_names(&self, team_id: i64) -> AppResult<Vec<String>> {
        let s = self.state();
        let mut names: Vec<String> = s
            .team_admins
            .iter()
            .filter(|(t, _)| *t == team_id)
            .map(|(_, u)| s.user_name(*u))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn team_service_names(&self, team_id: i64) -> AppResult<Vec<String>> {
        let mut names: Vec<String> = self
            .state()
            .team_services
            .iter()
            .filter(|(t, _)| *t == team_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn is_team_admin(&self, team: &str, user: &str) -> AppResult<bool> {
        let s = self.state();
        let Some(u) = s.users.iter().find(|u| u.profile.name == user) else {
            return Ok(false);
        };
        if u.profile.god {
            return Ok(true);
        }
        let Some(t) = s.active_team(team) else {
            return Ok(false);
        };
        Ok(s.team_admins.contains(&(t.id, u.profile.id)))
    }

    async fn rosters(&self, team_id: i64, filter: &NameFilter) -> AppResult<Vec<Roster>> {
        let mut rosters: Vec<Roster> = self
            .state()
            .rosters
            .iter()
            .filter(|(id, t, name)| *t == team_id && filter.matches(*id, name))
            .map(|(id, _, name)| Roster {
                id: *id,
                name: name.clone(),
            })
            .collect();
        rosters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rosters)
    }

    async fn roster_members(
        &self,
        team_id: i64,
        filter: &NameFilter,
    ) -> AppResult<Vec<MembershipRow>> {
        let s = self.state();
        let mut rows = Vec::new();
        for (roster_id, t, roster) in &s.rosters {
            if *t != team_id || !filter.matches(*roster_id, roster) {
                continue;
            }
            for (_, user_id, in_rotation) in s.members.iter().filter(|m| m.0 == *roster_id) {
                let events = s
                    .events
                    .iter()
                    .filter(|e| e.team_id == team_id && e.user_id == *user_id)
                    .map(|e| GoverningEvent {
                        display_order: s.rank(e.role_id),
                        start: e.start,
                        duration: e.end - e.start,
                    })
                    .collect();
                rows.push(MembershipRow {
                    roster: roster.clone(),
                    user_id: *user_id,
                    user: s.user_name(*user_id),
                    in_rotation: *in_rotation,
                    events,
                });
            }
        }
        rows.sort_by(|a, b| (&a.roster, &a.user).cmp(&(&b.roster, &b.user)));
        Ok(rows)
    }

    async fn create_roster(&self, team: &str, name: &str, audit: &AuditEntry) -> AppResult<i64> {
        let mut s = self.state();
        let team_id = s
            .active_team(team)
            .map(|t| t.id)
            .ok_or_else(|| AppError::NotFound(format!("team \"{team}\" not found")))?;
        if s.rosters.iter().any(|(_, t, n)| *t == team_id && n == name) {
            return Err(AppError::Conflict(format!(
                "roster name \"{name}\" already exists for team {team}"
            )));
        }
        let id = s.next_id();
        s.rosters.push((id, team_id, name.to_string()));
        s.audits.push(audit.clone().with("roster_id", json!(id)));
        Ok(id)
    }

    async fn viewer(&self, user: Option<&str>, team_id: i64) -> AppResult<Viewer> {
        let s = self.state();
        let Some(u) = user.and_then(|name| s.users.iter().find(|u| u.profile.name == name)) else {
            return Ok(Viewer::Anonymous);
        };
        let user_id = u.profile.id;

        let mut assignment_ranks: Vec<i32> = s
            .members
            .iter()
            .filter(|(_, member, _)| *member == user_id)
            .flat_map(|(roster_id, _, _)| {
                s.schedules
                    .iter()
                    .filter(move |sc| sc.roster_id == *roster_id && sc.team_id == team_id)
            })
            .map(|sc| s.rank(sc.role_id))
            .collect();
        assignment_ranks.sort_unstable();
        assignment_ranks.dedup();

        Ok(Viewer::Member(MemberViewer {
            user_id,
            name: u.profile.name.clone(),
            god: u.profile.god,
            team_admin: s.team_admins.contains(&(team_id, user_id)),
            assignment_ranks,
        }))
    }

    async fn schedules(&self, team_id: i64) -> AppResult<Vec<Schedule>> {
        let s = self.state();
        let team = s.teams.iter().find(|t| t.id == team_id);
        Ok(s
            .schedules
            .iter()
            .filter(|sc| sc.team_id == team_id)
            .map(|sc| {
                let role = s.roles.iter().find(|r| r.id == sc.role_id);
                let roster = s.rosters.iter().find(|r| r.0 == sc.roster_id);
                Schedule {
                    id: sc.id,
                    role: role.map(|r| r.name.clone()).unwrap_or_default(),
                    role_id: sc.role_id,
                    roster: roster.map(|r| r.2.clone()).unwrap_or_default(),
                    roster_id: sc.roster_id,
                    team: team.map(|t| t.name.clone()).unwrap_or_default(),
                    team_id,
                    timezone: team.and_then(|t| t.scheduling_timezone.clone()),
                    advanced_mode: 0,
                    auto_populate_threshold: 21,
                    events: sc.events.clone(),
                }
            })
            .collect())
    }

    async fn users(&self, filter: &UserFilter) -> AppResult<Vec<UserProfile>> {
        let mut users: Vec<UserProfile> = self
            .state()
            .users
            .iter()
            .filter(|u| filter.matches(u.profile.id, &u.profile.name))
            .map(|u| u.profile.clone())
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn password_hash(&self, user: &str) -> AppResult<Option<String>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.profile.name == user)
            .and_then(|u| u.password_hash.clone()))
    }

    async fn upsert_directory_user(
        &self,
        user: &str,
        profile: &DirectoryProfile,
    ) -> AppResult<bool> {
        let created = self.state().user_id(user).is_none();
        if created {
            self.add_user(user, false);
        }
        let mut s = self.state();
        if let Some(u) = s.users.iter_mut().find(|u| u.profile.name == user) {
            if profile.full_name.is_some() {
                u.profile.full_name = profile.full_name.clone();
            }
            u.profile
                .contacts
                .extend(profile.contacts.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(created)
    }

    async fn create_session(&self, session: &Session) -> AppResult<()> {
        let mut s = self.state();
        if s.sessions.iter().any(|x| x.id == session.id) {
            return Err(AppError::Conflict("User already logged in".into()));
        }
        s.sessions.push(session.clone());
        Ok(())
    }

    async fn session(&self, id: &str) -> AppResult<Option<Session>> {
        Ok(self.state().sessions.iter().find(|x| x.id == id).cloned())
    }

    async fn delete_session(&self, id: &str) -> AppResult<()> {
        self.state().sessions.retain(|x| x.id != id);
        Ok(())
    }
}

// Assertion helpers.
impl State {
    pub fn event_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.events.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn teams_by_name(&self) -> HashMap<String, bool> {
        self.teams.iter().map(|t| (t.name.clone(), t.active)).collect()
    }
}
