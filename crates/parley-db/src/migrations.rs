use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            expires_on  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message_data    TEXT NOT NULL,
            sent_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, recipient_id, sent_at);

        CREATE TABLE IF NOT EXISTS chat_relations (
            sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (sender_id, recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_relations_recipient
            ON chat_relations(recipient_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
