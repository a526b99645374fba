use std::collections::BTreeMap;

use serde_json::json;

use crate::audit::{AuditAction, AuditEntry};
use crate::error::AppResult;
use crate::models::{NameFilter, RosterUser, RosterView};
use crate::policy::{is_visible, Viewer};
use crate::services::{schedules, teams::check_team_auth};
use crate::store::OncallStore;
use crate::validation::check_name;

/// Rosters of a team keyed by name, each with the members `viewer` may see
/// and the schedules rotating through it.
pub async fn list_rosters(
    store: &dyn OncallStore,
    team_id: i64,
    viewer: &Viewer,
    filter: &NameFilter,
    now: i64,
) -> AppResult<BTreeMap<String, RosterView>> {
    let mut rosters: BTreeMap<String, RosterView> = store
        .rosters(team_id, filter)
        .await?
        .into_iter()
        .map(|r| {
            (
                r.name,
                RosterView {
                    id: r.id,
                    users: Vec::new(),
                    schedules: Vec::new(),
                },
            )
        })
        .collect();

    let members = store.roster_members(team_id, filter).await?;
    let total = members.len();
    let mut shown = 0usize;
    for row in members {
        if !is_visible(viewer, &row.events, now) {
            continue;
        }
        if let Some(roster) = rosters.get_mut(&row.roster) {
            shown += 1;
            roster.users.push(RosterUser {
                name: row.user,
                in_rotation: row.in_rotation,
            });
        }
    }
    tracing::debug!(team_id, total, shown, viewer = ?viewer.name(), "roster members filtered");

    for (roster, list) in schedules::by_roster(schedules::get_schedules(store, team_id).await?) {
        if let Some(view) = rosters.get_mut(&roster) {
            view.schedules = list;
        }
    }

    Ok(rosters)
}

pub async fn create_roster(
    store: &dyn OncallStore,
    team: &str,
    name: Option<&str>,
    actor: &str,
) -> AppResult<i64> {
    let name = name.unwrap_or_default();
    check_name("roster", name)?;
    check_team_auth(store, team, actor).await?;

    let audit = AuditEntry::new(
        team,
        AuditAction::RosterCreated,
        actor,
        json!({ "request_body": { "name": name } }),
    );
    let id = store.create_roster(team, name, &audit).await?;
    tracing::info!(team = %team, roster = %name, roster_id = id, "roster created");
    Ok(id)
}
