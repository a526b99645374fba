use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};
use crate::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user name
    pub sid: String, // session row id
    pub exp: i64,
    pub iat: i64,
}

/// The logged-in user, set in request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub name: String,
    pub session_id: String,
}

pub fn issue_session_token(user: &str, session_id: &str, config: &SessionConfig) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.to_string(),
        sid: session_id.to_string(),
        exp: now + config.expiry_secs,
        iat: now,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?)
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// 128 random bits, hex encoded.
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time comparison of the sent header against the session's token.
fn csrf_matches(sent: Option<&[u8]>, expected: &str) -> bool {
    sent.is_some_and(|sent| bool::from(sent.ct_eq(expected.as_bytes())))
}

fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

/// Session token from the session cookie, falling back to a bearer header.
fn extract_token(req: &Request, cookie_name: &str) -> Option<String> {
    CookieJar::from_headers(req.headers())
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .or_else(|| extract_bearer(req))
}

/// Resolves the token to a live session row owned by the token's subject.
async fn resolve_session(state: &AppState, token: &str) -> AppResult<(AuthUser, String)> {
    let claims = verify_token(token, &state.config.session.secret)?;
    let session = state
        .store
        .session(&claims.sid)
        .await?
        .filter(|s| s.user_name == claims.sub)
        .ok_or_else(|| AppError::Unauthorized("Session expired or logged out".into()))?;
    Ok((
        AuthUser {
            name: session.user_name,
            session_id: session.id,
        },
        session.csrf_token,
    ))
}

/// Middleware: requires a valid session. Mutating methods must also echo the
/// session's CSRF token in `X-CSRF-TOKEN`. Sets AuthUser in extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&req, &state.config.session.cookie_name)
        .ok_or_else(|| AppError::Unauthorized("Missing session".into()))?;
    let (user, csrf_token) = resolve_session(&state, &token).await?;

    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        let sent = req.headers().get(CSRF_HEADER).map(|v| v.as_bytes());
        if !csrf_matches(sent, &csrf_token) {
            tracing::warn!(user = %user.name, method = %req.method(), "csrf check failed");
            return Err(AppError::Unauthorized("CSRF token mismatch".into()));
        }
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Middleware: sets AuthUser if a valid session is presented but doesn't require it.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = extract_token(&req, &state.config.session.cookie_name) {
        match resolve_session(&state, &token).await {
            Ok((user, _)) => {
                req.extensions_mut().insert(user);
            }
            Err(AppError::Database(e)) => return Err(AppError::Database(e)),
            Err(_) => {}
        }
    }
    Ok(next.run(req).await)
}
