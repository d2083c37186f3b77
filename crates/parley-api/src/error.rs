use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use parley_types::error::DomainError;

/// HTTP-facing error: a status code plus a user-visible detail string.
/// Internal failures are logged with context here and surfaced as a generic
/// server error without detail.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: &str) -> Self {
        Self {
            status,
            detail: detail.to_string(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Session token invalid")
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        use DomainError::*;
        match err {
            UnknownUser => Self::new(StatusCode::NOT_FOUND, "User not found"),
            UserExists => Self::new(StatusCode::CONFLICT, "User exists"),
            InvalidCredential => {
                Self::new(StatusCode::UNAUTHORIZED, "Incorrect username or password")
            }
            InvalidSession => Self::unauthorized(),
            SelfMessage => Self::new(StatusCode::BAD_REQUEST, "Cannot send message to self"),
            UnknownRecipient => Self::new(StatusCode::NOT_FOUND, "Recipient not found"),
            NoRelation => Self::new(
                StatusCode::CONFLICT,
                "Cannot compose message from send_message",
            ),
            RelationExists => Self::new(StatusCode::CONFLICT, "Existing conversation exists"),
            InvalidMessage => Self::new(StatusCode::NOT_FOUND, "Invalid message ID provided"),
            InvalidExpiry => Self::new(StatusCode::BAD_REQUEST, "Expiry must be in the future"),
            InvalidBody => Self::new(
                StatusCode::BAD_REQUEST,
                "Message must be 1-2000 characters",
            ),
            Internal(e) => {
                error!("Internal error handling request: {:#}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
