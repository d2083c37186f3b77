use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;

use parley_gateway::connection;

use crate::extract::Auth;
use crate::state::AppState;

/// Upgrade an authenticated request to the chat WebSocket. The session
/// cookie is validated before the upgrade, so the connection loop only ever
/// sees authenticated channels.
pub async fn chat_socket(
    State(state): State<AppState>,
    Auth(session): Auth,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        connection::serve(socket, state.registry.clone(), session.username, session.token)
    })
}
