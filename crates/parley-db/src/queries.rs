use crate::Database;
use crate::models::{MessageRow, SessionRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

const MESSAGE_COLUMNS: &str = "m.id, su.username, ru.username, m.message_data, m.sent_at
         FROM messages m
         JOIN users su ON su.id = m.sender_id
         JOIN users ru ON ru.id = m.recipient_id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, username, password_hash, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Sessions, messages and relations cascade through the schema's foreign
    /// keys. Returns false if no such user existed.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn list_usernames(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT username FROM users ORDER BY username")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    // -- Sessions --

    pub fn insert_session(
        &self,
        token: &str,
        user_id: &str,
        created_at: &str,
        expires_on: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_on) VALUES (?1, ?2, ?3, ?4)",
                params![token, user_id, created_at, expires_on],
            )?;
            Ok(())
        })
    }

    pub fn get_session(&self, token: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.token, u.username, s.created_at, s.expires_on
                 FROM sessions s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
            )?;

            let row = stmt
                .query_row([token], |row| {
                    Ok(SessionRow {
                        token: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_on: row.get(3)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    /// Returns false if the token was unknown.
    pub fn delete_session(&self, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(deleted > 0)
        })
    }

    // -- Relations --

    /// Direction-agnostic: a relation row in either orientation counts.
    pub fn relation_exists(&self, a_id: &str, b_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chat_relations
                     WHERE (sender_id = ?1 AND recipient_id = ?2)
                        OR (sender_id = ?2 AND recipient_id = ?1)",
                    params![a_id, b_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// All usernames this user has exchanged messages with, either direction.
    pub fn relation_counterparts(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username FROM chat_relations r
                     JOIN users u ON u.id = r.recipient_id
                     WHERE r.sender_id = ?1
                 UNION
                 SELECT u.username FROM chat_relations r
                     JOIN users u ON u.id = r.sender_id
                     WHERE r.recipient_id = ?1
                 ORDER BY 1",
            )?;
            let names = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    // -- Messages --

    /// Insert a message, materializing the chat relation if this is the first
    /// message between the pair. One transaction: the relation must never
    /// exist without its first message having committed.
    pub fn store_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        message_data: &str,
        sent_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO chat_relations (sender_id, recipient_id)
                 SELECT ?1, ?2
                 WHERE NOT EXISTS (
                     SELECT 1 FROM chat_relations
                     WHERE sender_id = ?2 AND recipient_id = ?1
                 )",
                params![sender_id, recipient_id],
            )?;
            tx.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, message_data, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, sender_id, recipient_id, message_data, sent_at],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Messages between two users, newest first. Ordered on the immutable
    /// (sent_at, id) pair so pagination stays stable under concurrent inserts.
    pub fn messages_between(
        &self,
        a_id: &str,
        b_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                    OR (m.sender_id = ?2 AND m.recipient_id = ?1)
                 ORDER BY m.sent_at DESC, m.id DESC
                 LIMIT ?3 OFFSET ?4",
            ))?;

            let rows = stmt
                .query_map(params![a_id, b_id, limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sender-scoped lookup: only returns the message when `sender_id` is its
    /// original sender.
    pub fn message_by_sender(&self, message_id: &str, sender_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message_by_sender(conn, message_id, sender_id))
    }

    /// Replace the body of a sender-owned message. Returns the recipient
    /// username, or None when the id is unknown or not owned by the sender.
    pub fn edit_message(
        &self,
        message_id: &str,
        sender_id: &str,
        message_data: &str,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(row) = query_message_by_sender(&tx, message_id, sender_id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE messages SET message_data = ?1 WHERE id = ?2",
                params![message_data, message_id],
            )?;
            tx.commit()?;
            Ok(Some(row.recipient_name))
        })
    }

    /// Remove a sender-owned message. The chat relation stays: it records
    /// history of contact, not current message count. Returns the recipient
    /// username, or None when the id is unknown or not owned by the sender.
    pub fn delete_message(&self, message_id: &str, sender_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(row) = query_message_by_sender(&tx, message_id, sender_id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
            tx.commit()?;
            Ok(Some(row.recipient_name))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password_hash, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_message_by_sender(
    conn: &Connection,
    message_id: &str,
    sender_id: &str,
) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} WHERE m.id = ?1 AND m.sender_id = ?2"
    ))?;

    let row = stmt
        .query_row(params![message_id, sender_id], map_message_row)
        .optional()?;

    Ok(row)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_name: row.get(1)?,
        recipient_name: row.get(2)?,
        message_data: row.get(3)?,
        sent_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::{Database, format_ts};
    use chrono::{Duration, Utc};

    fn db_with_users(names: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for (i, name) in names.iter().enumerate() {
            db.create_user(&format!("user-{i}"), name, "hash", &format_ts(Utc::now()))
                .unwrap();
        }
        db
    }

    #[test]
    fn user_lookup_roundtrip() {
        let db = db_with_users(&["alice"]);
        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(row.id, "user-0");
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn relation_is_direction_agnostic() {
        let db = db_with_users(&["alice", "bob"]);
        let now = format_ts(Utc::now());
        db.store_message("m1", "user-0", "user-1", "hi", &now).unwrap();

        assert!(db.relation_exists("user-0", "user-1").unwrap());
        assert!(db.relation_exists("user-1", "user-0").unwrap());

        // Reply does not create a second relation row in the other direction
        db.store_message("m2", "user-1", "user-0", "hello", &now).unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM chat_relations", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn messages_paginate_newest_first() {
        let db = db_with_users(&["alice", "bob"]);
        let base = Utc::now();
        for i in 0..3 {
            db.store_message(
                &format!("m{i}"),
                "user-0",
                "user-1",
                &format!("msg {i}"),
                &format_ts(base + Duration::seconds(i)),
            )
            .unwrap();
        }

        let first = db.messages_between("user-0", "user-1", 1, 0).unwrap();
        let second = db.messages_between("user-0", "user-1", 1, 1).unwrap();
        assert_eq!(first[0].message_data, "msg 2");
        assert_eq!(second[0].message_data, "msg 1");
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn edit_and_delete_are_sender_scoped() {
        let db = db_with_users(&["alice", "bob"]);
        let now = format_ts(Utc::now());
        db.store_message("m1", "user-0", "user-1", "hi", &now).unwrap();

        // bob is not the sender
        assert!(db.edit_message("m1", "user-1", "changed").unwrap().is_none());
        assert!(db.delete_message("m1", "user-1").unwrap().is_none());

        let recipient = db.edit_message("m1", "user-0", "changed").unwrap().unwrap();
        assert_eq!(recipient, "bob");

        assert!(db.delete_message("m1", "user-0").unwrap().is_some());
        // Relation survives message deletion
        assert!(db.relation_exists("user-0", "user-1").unwrap());
    }

    #[test]
    fn deleting_user_cascades_sessions_and_messages() {
        let db = db_with_users(&["alice", "bob"]);
        let now = format_ts(Utc::now());
        let later = format_ts(Utc::now() + Duration::days(1));
        db.insert_session("tok", "user-0", &now, &later).unwrap();
        db.store_message("m1", "user-0", "user-1", "hi", &now).unwrap();

        assert!(db.delete_user("user-0").unwrap());
        assert!(db.get_session("tok").unwrap().is_none());
        assert!(db.messages_between("user-0", "user-1", 10, 0).unwrap().is_empty());
    }
}
