use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use tracing::info;

use parley_core::users::MAX_USERNAME_CHARS;
use parley_types::api::{LoginRequest, SessionInfoResponse, SuccessResponse};
use parley_types::error::DomainError;
use parley_types::events::{AUTH_REVOKED, WsEvent};

use crate::error::ApiError;
use crate::extract::{AUTH_COOKIE, Auth};
use crate::state::AppState;

/// Sessions issued at login are valid for 30 days.
const SESSION_TTL_DAYS: i64 = 30;

/// Verify credentials and set the session cookie. Unknown user and wrong
/// password produce the same response to prevent account enumeration.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SuccessResponse>), ApiError> {
    if req.username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Username too long"));
    }

    state
        .sessions
        .verify_credentials(&req.username, &req.password)
        .await
        .map_err(|e| match e {
            DomainError::UnknownUser | DomainError::InvalidCredential => {
                ApiError::new(StatusCode::UNAUTHORIZED, "Incorrect username or password")
            }
            other => other.into(),
        })?;

    let expires_on = Utc::now() + Duration::days(SESSION_TTL_DAYS);
    let token = state.sessions.create_session(&req.username, expires_on).await?;

    info!("User '{}' logged in", req.username);

    let cookie = Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((jar.add(cookie), Json(SuccessResponse { success: true })))
}

/// Revoke the presented session and force-disconnect exactly the channels it
/// authenticated. The user's other sessions stay untouched.
pub async fn revoke(
    State(state): State<AppState>,
    Auth(session): Auth,
) -> Result<Json<SuccessResponse>, ApiError> {
    let username = state.sessions.revoke(&session.token).await?;

    state
        .registry
        .disconnect_by_token(&username, &session.token, WsEvent::empty(AUTH_REVOKED))
        .await;

    info!("Session of user '{}' revoked", username);
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn info(Auth(session): Auth) -> Json<SessionInfoResponse> {
    Json(SessionInfoResponse {
        username: session.username,
        created_at: session.created_at,
    })
}
