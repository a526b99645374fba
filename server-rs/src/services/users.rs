use crate::error::{AppError, AppResult};
use crate::models::{UserFilter, UserProfile};
use crate::store::OncallStore;

pub async fn get_user_data(
    store: &dyn OncallStore,
    filter: &UserFilter,
) -> AppResult<Vec<UserProfile>> {
    store.users(filter).await
}

pub async fn get_user(store: &dyn OncallStore, name: &str) -> AppResult<UserProfile> {
    get_user_data(store, &UserFilter::by_name(name))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("user \"{name}\" not found")))
}
