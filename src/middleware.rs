use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use tracing::warn;

use crate::auth::unix_now;
use crate::db::{get_session_user, DbPool};
use crate::error::AppError;
use crate::models::AuthUser;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

/// An authenticated request, via session cookie or `Authorization: Bearer <token>`.
pub struct Auth(pub AuthUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = check_session_cookie(parts, &state.db)? {
            return Ok(Auth(user));
        }

        if let Some(user) = check_bearer_token(parts, &state.db)? {
            return Ok(Auth(user));
        }

        warn!("Unauthorized API access attempt");
        Err(AppError::Unauthorized)
    }
}

fn check_session_cookie(parts: &Parts, db: &DbPool) -> Result<Option<AuthUser>, AppError> {
    let cookies = parts
        .headers
        .get_all("cookie")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|s| s.trim().split_once('='));

    let now = unix_now();
    for (name, value) in cookies {
        if name == SESSION_COOKIE {
            if let Some(user) = get_session_user(db, value, now)? {
                return Ok(Some(user));
            }
        }
    }
    Ok(None)
}

fn check_bearer_token(parts: &Parts, db: &DbPool) -> Result<Option<AuthUser>, AppError> {
    match bearer_token(&parts.headers) {
        Some(token) => get_session_user(db, token, unix_now()),
        None => Ok(None),
    }
}

/// The token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
}
