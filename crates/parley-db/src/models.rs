//! Database row types, mapping directly to SQLite rows. Distinct from the
//! API models so the storage layer stays independent of the wire shapes.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

/// A session joined with its owner's username.
pub struct SessionRow {
    pub token: String,
    pub username: String,
    pub created_at: String,
    pub expires_on: String,
}

/// A message joined with both participant usernames.
pub struct MessageRow {
    pub id: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub message_data: String,
    pub sent_at: String,
}
