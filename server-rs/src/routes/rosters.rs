use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::{NameFilter, RosterView};
use crate::services::rosters;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRosterRequest {
    pub name: Option<String>,
}

pub async fn list_rosters(
    State(state): State<AppState>,
    Path(team): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    user: Option<Extension<AuthUser>>,
) -> AppResult<Json<BTreeMap<String, RosterView>>> {
    let filter = NameFilter::from_params(&params)?;
    let store = state.store.as_ref();
    let team = store
        .team_by_name(&team, true)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("team \"{team}\" not found")))?;

    let viewer = store
        .viewer(user.as_ref().map(|Extension(u)| u.name.as_str()), team.id)
        .await?;
    let rosters =
        rosters::list_rosters(store, team.id, &viewer, &filter, Utc::now().timestamp()).await?;
    Ok(Json(rosters))
}

pub async fn create_roster(
    State(state): State<AppState>,
    Path(team): Path<String>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRosterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = rosters::create_roster(
        state.store.as_ref(),
        &team,
        body.name.as_deref(),
        &user.name,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}
