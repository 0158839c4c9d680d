use axum::http::{HeaderMap, StatusCode};
use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{
    generate_session_token, hash_password, unix_now, verify_password, SESSION_TTL_SECS,
};
use crate::db::{create_session, create_user, delete_session, get_user_by_email};
use crate::error::AppError;
use crate::middleware::{bearer_token, Auth, SESSION_COOKIE};
use crate::models::{
    AuthUser, NewUser, Session, SigninRequest, SignupRequest, TokenResponse, UserRole,
};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(CookieJar, (StatusCode, Json<TokenResponse>)), AppError> {
    let email = req.email.trim();
    if !email.contains('@') {
        return Err(AppError::bad_request("Email must be a valid address"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if req.nickname.trim().is_empty() {
        return Err(AppError::bad_request("Nickname cannot be empty"));
    }

    let user = create_user(
        &state.db,
        &NewUser {
            email: email.to_string(),
            password_hash: hash_password(&req.password)?,
            role: req.role.unwrap_or(UserRole::User),
            nickname: req.nickname.trim().to_string(),
        },
    )?;
    info!(id = user.id, role = user.role.as_str(), "User signed up");

    let (jar, token) = start_session(&state, jar, user.id)?;
    Ok((jar, (StatusCode::CREATED, Json(token))))
}

pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SigninRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), AppError> {
    let user = get_user_by_email(&state.db, req.email.trim())?;
    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
        warn!("Rejected sign-in attempt");
        return Err(AppError::Unauthorized);
    };
    info!(id = user.id, "User signed in");

    let (jar, token) = start_session(&state, jar, user.id)?;
    Ok((jar, Json(token)))
}

fn start_session(
    state: &AppState,
    jar: CookieJar,
    user_id: i64,
) -> Result<(CookieJar, TokenResponse), AppError> {
    let now = unix_now();
    let session = Session {
        id: generate_session_token(),
        user_id,
        created_at: now,
        expires_at: now + SESSION_TTL_SECS,
    };
    create_session(&state.db, &session)?;

    let cookie = Cookie::build((SESSION_COOKIE, session.id.clone()))
        .path(cookie_path(state))
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS));

    Ok((jar.add(cookie), TokenResponse { token: session.id }))
}

fn cookie_path(state: &AppState) -> String {
    if state.base_path.is_empty() {
        "/".to_string()
    } else {
        state.base_path.to_string()
    }
}

pub async fn signout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        delete_session(&state.db, session_cookie.value())?;
    }
    if let Some(token) = bearer_token(&headers) {
        delete_session(&state.db, token)?;
    }
    info!("User signed out");

    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path(cookie_path(&state))
        .http_only(true)
        .max_age(time::Duration::seconds(0));

    Ok((jar.remove(cookie), Json(json!({ "success": true }))))
}

pub async fn me(Auth(user): Auth) -> Json<AuthUser> {
    Json(user)
}
