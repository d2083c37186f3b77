use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use parley_types::api::{
    ComposeMessageRequest, EditMessageRequest, MessageDeletePayload, MessageUpdatePayload,
    MessageView, SendMessageRequest, SuccessResponse,
};
use parley_types::events::{
    MESSAGE_COMPOSE, MESSAGE_DELETE, MESSAGE_RECEIVED, MESSAGE_UPDATE, WsEvent,
};

use crate::error::ApiError;
use crate::extract::Auth;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub recipient: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_amount() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct UserExistsQuery {
    pub username: String,
}

pub async fn recipients(
    State(state): State<AppState>,
    Auth(session): Auth,
) -> Result<Json<Vec<String>>, ApiError> {
    let relations = state.chats.relations_for(&session.username).await?;
    Ok(Json(relations))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Auth(session): Auth,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let messages = state
        .chats
        .list_messages(&session.username, &query.recipient, query.amount, query.offset)
        .await?;
    Ok(Json(messages))
}

pub async fn user_exists(
    State(state): State<AppState>,
    Auth(_session): Auth,
    Query(query): Query<UserExistsQuery>,
) -> Result<Json<bool>, ApiError> {
    let exists = state.users.user_exists(&query.username).await?;
    Ok(Json(exists))
}

/// Continue an existing conversation. The Coordinator role: mutate through
/// the engine, then best-effort broadcast to both parties' open channels.
/// The message is durably stored before any broadcast is attempted.
pub async fn send_message(
    State(state): State<AppState>,
    Auth(session): Auth,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Uuid>, ApiError> {
    let message_id = state
        .chats
        .send(&session.username, &req.recipient, &req.message_data)
        .await?;

    notify_both(
        &state,
        MESSAGE_RECEIVED,
        &session.username,
        &req.recipient,
        &MessageView {
            message_id,
            sender_name: session.username.clone(),
            recipient_name: req.recipient.clone(),
            message_data: req.message_data,
            send_date: Utc::now(),
        },
    )
    .await;

    Ok(Json(message_id))
}

/// Start a brand-new conversation.
pub async fn compose_message(
    State(state): State<AppState>,
    Auth(session): Auth,
    Json(req): Json<ComposeMessageRequest>,
) -> Result<Json<Uuid>, ApiError> {
    let message_id = state
        .chats
        .compose(&session.username, &req.recipient, &req.message_data)
        .await?;

    notify_both(
        &state,
        MESSAGE_COMPOSE,
        &session.username,
        &req.recipient,
        &MessageView {
            message_id,
            sender_name: session.username.clone(),
            recipient_name: req.recipient.clone(),
            message_data: req.message_data,
            send_date: Utc::now(),
        },
    )
    .await;

    Ok(Json(message_id))
}

pub async fn get_message(
    State(state): State<AppState>,
    Auth(session): Auth,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>, ApiError> {
    let message = state.chats.get_message(&session.username, message_id).await?;
    Ok(Json(message))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Auth(session): Auth,
    Path(message_id): Path<Uuid>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let recipient = state
        .chats
        .edit_message(&session.username, message_id, &req.message_data)
        .await?;

    notify_both(
        &state,
        MESSAGE_UPDATE,
        &session.username,
        &recipient,
        &MessageUpdatePayload {
            message_id,
            sender_name: session.username.clone(),
            recipient_name: recipient.clone(),
            message_data: req.message_data,
        },
    )
    .await;

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Auth(session): Auth,
    Path(message_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let recipient = state.chats.delete_message(&session.username, message_id).await?;

    notify_both(
        &state,
        MESSAGE_DELETE,
        &session.username,
        &recipient,
        &MessageDeletePayload {
            message_id,
            sender_name: session.username.clone(),
            recipient_name: recipient.clone(),
        },
    )
    .await;

    Ok(Json(SuccessResponse { success: true }))
}

/// Broadcast one event to the recipient's and the sender's open channels.
/// Either side having zero channels is fine; the payload is identical so
/// neither party can observe a different logical event.
async fn notify_both(
    state: &AppState,
    event_name: &str,
    sender: &str,
    recipient: &str,
    payload: &impl serde::Serialize,
) {
    let event = WsEvent::new(event_name, payload);
    state.registry.broadcast(recipient, event.clone()).await;
    state.registry.broadcast(sender, event).await;
}
