use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    Extension, Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthOutcome;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{generate_csrf_token, issue_session_token, verify_token, AuthUser};
use crate::models::{LoginRequest, Session};
use crate::services::users;
use crate::AppState;

/// Login credentials from either a urlencoded form or a JSON body.
async fn read_credentials(state: &AppState, req: Request) -> AppResult<LoginRequest> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        let Json(body) = Json::<LoginRequest>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(body)
    } else {
        let Form(body) = Form::<LoginRequest>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(body)
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(state.config.session.secure_cookie)
        .same_site(SameSite::Lax)
        .build()
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
) -> AppResult<(CookieJar, Json<Value>)> {
    let body = read_credentials(&state, req).await?;
    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(AppError::BadRequest("Missing user/password".into()));
    };

    let store = state.store.as_ref();
    let outcome = state
        .authenticator
        .authenticate(store, &username, &password, body.domain.as_deref())
        .await?;
    if outcome == AuthOutcome::Rejected {
        tracing::info!(user = %username, "login rejected");
        return Err(AppError::Unauthorized("bad login credentials".into()));
    }

    let profile = users::get_user(store, &username).await?;

    // Reuse the session id of a cookie the client already holds.
    let session_id = jar
        .get(&state.config.session.cookie_name)
        .and_then(|c| verify_token(c.value(), &state.config.session.secret).ok())
        .map(|claims| claims.sid)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let csrf_token = generate_csrf_token();
    store
        .create_session(&Session {
            id: session_id.clone(),
            user_name: username.clone(),
            csrf_token: csrf_token.clone(),
        })
        .await?;

    let token = issue_session_token(&username, &session_id, &state.config.session)?;
    tracing::info!(user = %username, "login succeeded");

    let mut body = serde_json::to_value(&profile).map_err(|e| AppError::Internal(e.to_string()))?;
    if let Value::Object(map) = &mut body {
        map.insert("csrf_token".into(), Value::String(csrf_token));
    }
    Ok((jar.add(session_cookie(&state, token)), Json(body)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, StatusCode)> {
    state.store.delete_session(&user.session_id).await?;
    tracing::info!(user = %user.name, "logged out");

    let removal = Cookie::build(state.config.session.cookie_name.clone())
        .path("/")
        .build();
    Ok((jar.remove(removal), StatusCode::OK))
}
