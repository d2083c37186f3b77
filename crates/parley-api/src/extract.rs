use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use parley_core::session::SessionInfo;
use parley_types::error::DomainError;

use crate::error::ApiError;
use crate::state::AppState;

/// Name of the session cookie presented by clients.
pub const AUTH_COOKIE: &str = "x_auth_cookie";

/// Authenticated caller, resolved from the session cookie. Rejects missing,
/// unknown and expired tokens uniformly with 401 so callers cannot probe
/// which of the three it was.
pub struct Auth(pub SessionInfo);

impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(AUTH_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| {
                ApiError::new(StatusCode::UNAUTHORIZED, "Authorization cookie missing")
            })?;

        let info = state.sessions.get_session_info(&token).await.map_err(|e| match e {
            DomainError::InvalidSession => ApiError::unauthorized(),
            other => other.into(),
        })?;

        if info.expired {
            return Err(ApiError::unauthorized());
        }

        Ok(Auth(info))
    }
}
