use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfoResponse {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// -- Users (first-user administration) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddUserRequest {
    pub username: String,
    pub password: String,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeMessageRequest {
    pub recipient: String,
    pub message_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient: String,
    pub message_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub message_data: String,
}

/// One message as seen by either participant. `sender_name` tells the reader
/// which of the two parties sent it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: Uuid,
    pub sender_name: String,
    pub recipient_name: String,
    pub message_data: String,
    pub send_date: DateTime<Utc>,
}

/// Broadcast payload for an edit: the new body plus enough identity to locate
/// the message client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUpdatePayload {
    pub message_id: Uuid,
    pub sender_name: String,
    pub recipient_name: String,
    pub message_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeletePayload {
    pub message_id: Uuid,
    pub sender_name: String,
    pub recipient_name: String,
}
