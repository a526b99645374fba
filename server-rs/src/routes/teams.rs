use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{NameFilter, TeamField};
use crate::services::teams;
use crate::AppState;

pub async fn list_teams(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<String>>> {
    let filter = NameFilter::from_params(&params)?;
    Ok(Json(teams::list_teams(state.store.as_ref(), &filter).await?))
}

pub async fn create_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = teams::create_team(
        state.store.as_ref(),
        state.plans.as_deref(),
        &state.config,
        &body,
        &user.name,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// `?fields=users,admins` picks sections; `?active=0` reads a deleted team.
pub async fn get_team(
    State(state): State<AppState>,
    Path(team): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    user: Option<Extension<AuthUser>>,
) -> AppResult<Json<Value>> {
    let fields = TeamField::parse_list(params.get("fields").map(String::as_str));
    let active = params
        .get("active")
        .map_or(true, |v| !matches!(v.as_str(), "0" | "false"));
    let viewer = user.as_ref().map(|Extension(u)| u.name.as_str());

    let body = teams::get_team(
        state.store.as_ref(),
        &state.config,
        &team,
        active,
        &fields,
        viewer,
        Utc::now().timestamp(),
    )
    .await?;
    Ok(Json(body))
}

pub async fn update_team(
    State(state): State<AppState>,
    Path(team): Path<String>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<Value>,
) -> AppResult<StatusCode> {
    teams::update_team(
        state.store.as_ref(),
        state.plans.as_deref(),
        &state.config,
        &team,
        &body,
        &user.name,
    )
    .await?;
    Ok(StatusCode::OK)
}

pub async fn delete_team(
    State(state): State<AppState>,
    Path(team): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<StatusCode> {
    teams::delete_team(
        state.store.as_ref(),
        &team,
        &user.name,
        Utc::now().timestamp(),
    )
    .await?;
    Ok(StatusCode::OK)
}
