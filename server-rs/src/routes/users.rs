use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppResult;
use crate::models::UserProfile;
use crate::services::users;
use crate::AppState;

pub async fn get_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(users::get_user(state.store.as_ref(), &user).await?))
}
