use serde::{Deserialize, Serialize};
use serde_json::Value;

// Event names carried in the envelope's `message` field. Consumers must
// ignore names they do not recognise.
pub const MESSAGE_RECEIVED: &str = "message.received";
pub const MESSAGE_COMPOSE: &str = "message.compose";
pub const MESSAGE_UPDATE: &str = "message.update";
pub const MESSAGE_DELETE: &str = "message.delete";
pub const AUTH_REVOKED: &str = "auth.revoked";

/// Keepalive reply sent on the socket itself, outside of any broadcast.
pub const ALIVE: &str = "ALIVE";

/// The wire envelope for every frame exchanged over the chat socket, in both
/// directions: `{"message": <name>, "data": <object>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub message: String,
    pub data: Value,
}

impl WsEvent {
    /// Build an event from any serializable payload. Serialization of our own
    /// payload types cannot fail; a failure would be a programming error, so
    /// it degrades to an empty object rather than panicking mid-broadcast.
    pub fn new(name: &str, data: &impl Serialize) -> Self {
        Self {
            message: name.to_string(),
            data: serde_json::to_value(data).unwrap_or(Value::Object(Default::default())),
        }
    }

    pub fn empty(name: &str) -> Self {
        Self {
            message: name.to_string(),
            data: Value::Object(Default::default()),
        }
    }
}
