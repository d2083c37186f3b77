use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::warn;

use parley_core::users::MAX_USERNAME_CHARS;
use parley_types::api::{AddUserRequest, SuccessResponse};
use parley_types::events::{AUTH_REVOKED, WsEvent};

use crate::error::ApiError;
use crate::extract::Auth;
use crate::state::AppState;

/// Account administration is reserved for the distinguished first user.
fn require_first_user(state: &AppState, username: &str) -> Result<(), ApiError> {
    if username != state.first_user {
        warn!("Unauthorized admin access attempted by user '{}'", username);
        return Err(ApiError::unauthorized());
    }
    Ok(())
}

pub async fn add_user(
    State(state): State<AppState>,
    Auth(session): Auth,
    Json(req): Json<AddUserRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    require_first_user(&state, &session.username)?;

    if req.username.is_empty() || req.username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Invalid username"));
    }

    state.users.add_user(&req.username, &req.password).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Delete an account. Storage cascades sessions and messages; every live
/// channel of the user is force-disconnected afterwards.
pub async fn delete_user(
    State(state): State<AppState>,
    Auth(session): Auth,
    Path(username): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    require_first_user(&state, &session.username)?;

    if username == state.first_user {
        return Err(ApiError::new(StatusCode::CONFLICT, "Cannot delete first user"));
    }

    state.users.delete_user(&username).await?;
    state
        .registry
        .disconnect_all(&username, WsEvent::empty(AUTH_REVOKED))
        .await;

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn list_users(
    State(state): State<AppState>,
    Auth(session): Auth,
) -> Result<Json<Vec<String>>, ApiError> {
    require_first_user(&state, &session.username)?;

    let users = state.users.list_users().await?;
    Ok(Json(users))
}
