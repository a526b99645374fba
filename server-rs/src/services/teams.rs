use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{NameFilter, NewTeam, Team, TeamField, TeamPatch, UserFilter};
use crate::policy::can_see_admins;
use crate::services::iris::PlanLookup;
use crate::services::{rosters, users};
use crate::store::OncallStore;

/// Fails with `Forbidden` unless `user` is a god user or an admin of `team`.
pub async fn check_team_auth(store: &dyn OncallStore, team: &str, user: &str) -> AppResult<()> {
    if store.is_team_admin(team, user).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "user \"{user}\" is not an admin of team \"{team}\""
        )))
    }
}

pub async fn list_teams(store: &dyn OncallStore, filter: &NameFilter) -> AppResult<Vec<String>> {
    store.team_names(filter).await
}

/// Team row plus the requested sections, as the JSON the API returns.
pub async fn get_team(
    store: &dyn OncallStore,
    config: &Config,
    name: &str,
    active: bool,
    fields: &[TeamField],
    viewer_name: Option<&str>,
    now: i64,
) -> AppResult<Value> {
    let team: Team = store
        .team_by_name(name, active)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("team \"{name}\" not found")))?;

    let mut out = match serde_json::to_value(&team) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    let viewer = store.viewer(viewer_name, team.id).await?;

    for field in fields {
        let value = match field {
            TeamField::Users => {
                let names = store.team_user_names(team.id).await?;
                let profiles = users::get_user_data(store, &UserFilter::by_names(names)).await?;
                let map: Map<String, Value> = profiles
                    .into_iter()
                    .map(|p| (p.name.clone(), json!(p)))
                    .collect();
                Value::Object(map)
            }
            TeamField::Admins => {
                if can_see_admins(&viewer, config.policy.minimum_display_order_to_see_admins) {
                    let admins = store.team_admin_names(team.id).await?;
                    json!(admins
                        .into_iter()
                        .map(|name| json!({ "name": name }))
                        .collect::<Vec<_>>())
                } else {
                    json!([])
                }
            }
            TeamField::Services => json!(store.team_service_names(team.id).await?),
            TeamField::Rosters => json!(
                rosters::list_rosters(store, team.id, &viewer, &NameFilter::default(), now).await?
            ),
        };
        out.insert(field.key().to_string(), value);
    }

    Ok(Value::Object(out))
}

pub async fn create_team(
    store: &dyn OncallStore,
    plans: Option<&dyn PlanLookup>,
    config: &Config,
    body: &Value,
    actor: &str,
) -> AppResult<i64> {
    let team = NewTeam::from_json(body, &config.supported_timezones)?;
    if let Some(plan) = &team.iris_plan {
        verify_plan(plans, plan).await?;
    }

    let audit = AuditEntry::new(
        &team.name,
        AuditAction::TeamCreated,
        actor,
        json!({ "request_body": body }),
    );
    let id = store.create_team(&team, actor, &audit).await?;
    tracing::info!(team = %team.name, team_id = id, owner = %actor, "team created");
    Ok(id)
}

pub async fn update_team(
    store: &dyn OncallStore,
    plans: Option<&dyn PlanLookup>,
    config: &Config,
    name: &str,
    body: &Value,
    actor: &str,
) -> AppResult<()> {
    check_team_auth(store, name, actor).await?;

    let patch = TeamPatch::from_json(body, &config.supported_timezones)?;
    if let Some(plan) = patch.plan_to_verify() {
        verify_plan(plans, plan).await?;
    }
    if patch.is_empty() {
        return Err(AppError::BadRequest("no editable team fields in request".into()));
    }

    let audit = AuditEntry::new(
        name,
        AuditAction::TeamEdited,
        actor,
        json!({ "request_body": body }),
    );
    store.update_team(name, &patch, &audit).await?;
    tracing::info!(team = %name, owner = %actor, "team edited");
    Ok(())
}

/// Soft delete: the row stays for history under a fresh UUID name.
pub async fn delete_team(
    store: &dyn OncallStore,
    name: &str,
    actor: &str,
    now: i64,
) -> AppResult<String> {
    check_team_auth(store, name, actor).await?;

    let new_name = Uuid::new_v4().to_string();
    let audit = AuditEntry::new(
        name,
        AuditAction::TeamDeleted,
        actor,
        json!({ "new_name": new_name }),
    );
    store.delete_team(name, &new_name, now, &audit).await?;
    Ok(new_name)
}

async fn verify_plan(plans: Option<&dyn PlanLookup>, plan: &str) -> AppResult<()> {
    let plans = plans.ok_or_else(|| {
        AppError::BadRequest("escalation plans are not configured on this server".into())
    })?;
    if plans.plan_exists(plan).await? {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "invalid iris escalation plan: no iris plan named {plan} exists"
        )))
    }
}
