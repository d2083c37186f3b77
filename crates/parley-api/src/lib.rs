pub mod auth;
pub mod chats;
pub mod error;
pub mod extract;
pub mod state;
pub mod users;
pub mod ws;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/token", post(auth::login))
        .route("/token/revoke", post(auth::revoke))
        .route("/token/info", get(auth::info))
        .route("/users", post(users::add_user).get(users::list_users))
        .route("/users/{username}", delete(users::delete_user))
        .route("/chats/recipients", get(chats::recipients))
        .route("/chats/messages", get(chats::get_messages))
        .route("/chats/user_exists", get(chats::user_exists))
        .route("/chats/message", post(chats::send_message))
        .route("/chats/message/compose", post(chats::compose_message))
        .route(
            "/chats/message/{message_id}",
            get(chats::get_message)
                .patch(chats::edit_message)
                .delete(chats::delete_message),
        )
        .route("/ws/chat", get(ws::chat_socket))
        .with_state(state)
}
