//! Persistence boundary.
//!
//! Every handler reaches the database through [`OncallStore`]. Each mutating
//! method runs as one transaction that also writes the supplied audit entry,
//! so the business change and its audit row land together or not at all.

use async_trait::async_trait;

use crate::audit::AuditEntry;
use crate::error::AppResult;
use crate::models::*;
use crate::policy::Viewer;

pub mod postgres;

#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

#[async_trait]
pub trait OncallStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    // Teams

    async fn team_by_name(&self, name: &str, active: bool) -> AppResult<Option<Team>>;

    /// Names of active teams matching `filter`, sorted.
    async fn team_names(&self, filter: &NameFilter) -> AppResult<Vec<String>>;

    /// Creates the team, makes `creator` its admin and member, and audits.
    async fn create_team(&self, team: &NewTeam, creator: &str, audit: &AuditEntry)
        -> AppResult<i64>;

    /// Applies `patch` to the active team `name`. `NotFound` if none matched,
    /// `Conflict` if a rename collides.
    async fn update_team(&self, name: &str, patch: &TeamPatch, audit: &AuditEntry)
        -> AppResult<()>;

    /// Deactivates the team, drops its events starting after `now`, renames it
    /// to `new_name` and records the rename. `NotFound` without writes if no
    /// active team is called `name`.
    async fn delete_team(
        &self,
        name: &str,
        new_name: &str,
        now: i64,
        audit: &AuditEntry,
    ) -> AppResult<()>;

    async fn team_user_names(&self, team_id: i64) -> AppResult<Vec<String>>;
    async fn team_admin_names(&self, team_id: i64) -> AppResult<Vec<String>>;
    async fn team_service_names(&self, team_id: i64) -> AppResult<Vec<String>>;

    /// True when `user` is a god user or an admin of the team called `team`.
    async fn is_team_admin(&self, team: &str, user: &str) -> AppResult<bool>;

    // Rosters

    async fn rosters(&self, team_id: i64, filter: &NameFilter) -> AppResult<Vec<Roster>>;

    /// Membership rows of the matching rosters, each with the user's team events.
    async fn roster_members(&self, team_id: i64, filter: &NameFilter)
        -> AppResult<Vec<MembershipRow>>;

    /// `NotFound` for an unknown team, `Conflict` for a duplicate name.
    async fn create_roster(&self, team: &str, name: &str, audit: &AuditEntry) -> AppResult<i64>;

    /// Resolves a viewer name against a team. Unknown names resolve to anonymous.
    async fn viewer(&self, user: Option<&str>, team_id: i64) -> AppResult<Viewer>;

    // Schedules

    async fn schedules(&self, team_id: i64) -> AppResult<Vec<Schedule>>;

    // Users

    async fn users(&self, filter: &UserFilter) -> AppResult<Vec<UserProfile>>;
    async fn password_hash(&self, user: &str) -> AppResult<Option<String>>;

    /// Creates or refreshes a user from directory data. Returns true if created.
    async fn upsert_directory_user(&self, user: &str, profile: &DirectoryProfile)
        -> AppResult<bool>;

    // Sessions

    /// `Conflict` if the session id is already in use.
    async fn create_session(&self, session: &Session) -> AppResult<()>;
    async fn session(&self, id: &str) -> AppResult<Option<Session>>;
    async fn delete_session(&self, id: &str) -> AppResult<()>;
}
