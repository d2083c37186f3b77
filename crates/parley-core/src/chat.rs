use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use parley_db::models::MessageRow;
use parley_db::{Database, format_ts, parse_ts};
use parley_types::api::MessageView;
use parley_types::error::{DomainError, DomainResult};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Owns chat-relation and message state: who may start a conversation, who
/// may reply, who may edit or delete which message, and how history pages.
///
/// The compose/send split is a deliberate two-step contract: `compose` opens
/// a conversation with a stranger exactly once, `send` continues an existing
/// one. Neither endpoint can stand in for the other.
#[derive(Clone)]
pub struct ChatEngine {
    db: Arc<Database>,
}

impl ChatEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// True when the two users have ever exchanged a message, in either
    /// direction.
    pub async fn has_relation(&self, a: &str, b: &str) -> DomainResult<bool> {
        let db = self.db.clone();
        let a = a.to_owned();
        let b = b.to_owned();
        crate::run_blocking(move || {
            let a_row = db.get_user_by_username(&a)?.ok_or(DomainError::UnknownUser)?;
            let b_row = db.get_user_by_username(&b)?.ok_or(DomainError::UnknownUser)?;
            Ok(db.relation_exists(&a_row.id, &b_row.id)?)
        })
        .await
    }

    /// Start a brand-new conversation. Fails with `RelationExists` once any
    /// message has ever been exchanged between the pair.
    pub async fn compose(
        &self,
        sender: &str,
        recipient: &str,
        message_data: &str,
    ) -> DomainResult<Uuid> {
        self.store(sender, recipient, message_data, false).await
    }

    /// Continue an existing conversation. Fails with `NoRelation` until the
    /// first `compose` between the pair has happened.
    pub async fn send(
        &self,
        sender: &str,
        recipient: &str,
        message_data: &str,
    ) -> DomainResult<Uuid> {
        self.store(sender, recipient, message_data, true).await
    }

    async fn store(
        &self,
        sender: &str,
        recipient: &str,
        message_data: &str,
        relation_required: bool,
    ) -> DomainResult<Uuid> {
        validate_body(message_data)?;
        if sender == recipient {
            return Err(DomainError::SelfMessage);
        }

        let db = self.db.clone();
        let sender = sender.to_owned();
        let recipient = recipient.to_owned();
        let message_data = message_data.to_owned();
        crate::run_blocking(move || {
            let sender_row = db
                .get_user_by_username(&sender)?
                .ok_or(DomainError::UnknownUser)?;
            let recipient_row = db
                .get_user_by_username(&recipient)?
                .ok_or(DomainError::UnknownRecipient)?;

            let related = db.relation_exists(&sender_row.id, &recipient_row.id)?;
            match (relation_required, related) {
                (true, false) => return Err(DomainError::NoRelation),
                (false, true) => return Err(DomainError::RelationExists),
                _ => {}
            }

            let message_id = Uuid::new_v4();
            db.store_message(
                &message_id.to_string(),
                &sender_row.id,
                &recipient_row.id,
                &message_data,
                &format_ts(Utc::now()),
            )?;

            debug!("Stored message {} from '{}' to '{}'", message_id, sender, recipient);
            Ok(message_id)
        })
        .await
    }

    /// Message history between `caller` and `counterpart`, newest first.
    /// `limit` and `offset` apply after ordering on the immutable
    /// (timestamp, id) pair, so pages stay stable under concurrent inserts.
    pub async fn list_messages(
        &self,
        caller: &str,
        counterpart: &str,
        limit: u32,
        offset: u32,
    ) -> DomainResult<Vec<MessageView>> {
        let db = self.db.clone();
        let caller = caller.to_owned();
        let counterpart = counterpart.to_owned();
        crate::run_blocking(move || {
            let caller_row = db
                .get_user_by_username(&caller)?
                .ok_or(DomainError::UnknownUser)?;
            let counterpart_row = db
                .get_user_by_username(&counterpart)?
                .ok_or(DomainError::UnknownRecipient)?;

            db.messages_between(&caller_row.id, &counterpart_row.id, limit, offset)?
                .into_iter()
                .map(view_from_row)
                .collect()
        })
        .await
    }

    /// Identity-scoped single-message fetch: only the original sender can
    /// address a message by id. Recipients read through `list_messages`.
    pub async fn get_message(&self, caller: &str, message_id: Uuid) -> DomainResult<MessageView> {
        let db = self.db.clone();
        let caller = caller.to_owned();
        crate::run_blocking(move || {
            let caller_row = db
                .get_user_by_username(&caller)?
                .ok_or(DomainError::UnknownUser)?;

            let row = db
                .message_by_sender(&message_id.to_string(), &caller_row.id)?
                .ok_or(DomainError::InvalidMessage)?;
            view_from_row(row)
        })
        .await
    }

    /// Replace the body of a message the caller sent. Id and timestamp are
    /// immutable. Returns the recipient username for broadcast targeting.
    pub async fn edit_message(
        &self,
        caller: &str,
        message_id: Uuid,
        message_data: &str,
    ) -> DomainResult<String> {
        validate_body(message_data)?;

        let db = self.db.clone();
        let caller = caller.to_owned();
        let message_data = message_data.to_owned();
        crate::run_blocking(move || {
            let caller_row = db
                .get_user_by_username(&caller)?
                .ok_or(DomainError::UnknownUser)?;

            db.edit_message(&message_id.to_string(), &caller_row.id, &message_data)?
                .ok_or(DomainError::InvalidMessage)
        })
        .await
    }

    /// Permanently remove a message the caller sent. The chat relation
    /// survives. Returns the recipient username for broadcast targeting.
    pub async fn delete_message(&self, caller: &str, message_id: Uuid) -> DomainResult<String> {
        let db = self.db.clone();
        let caller = caller.to_owned();
        crate::run_blocking(move || {
            let caller_row = db
                .get_user_by_username(&caller)?
                .ok_or(DomainError::UnknownUser)?;

            db.delete_message(&message_id.to_string(), &caller_row.id)?
                .ok_or(DomainError::InvalidMessage)
        })
        .await
    }

    /// Every username the caller has exchanged messages with.
    pub async fn relations_for(&self, username: &str) -> DomainResult<Vec<String>> {
        let db = self.db.clone();
        let username = username.to_owned();
        crate::run_blocking(move || {
            let row = db
                .get_user_by_username(&username)?
                .ok_or(DomainError::UnknownUser)?;
            Ok(db.relation_counterparts(&row.id)?)
        })
        .await
    }
}

fn validate_body(message_data: &str) -> DomainResult<()> {
    let chars = message_data.chars().count();
    if chars == 0 || chars > MAX_MESSAGE_CHARS {
        return Err(DomainError::InvalidBody);
    }
    Ok(())
}

fn view_from_row(row: MessageRow) -> DomainResult<MessageView> {
    Ok(MessageView {
        message_id: row
            .id
            .parse()
            .with_context(|| format!("corrupt message id '{}'", row.id))?,
        sender_name: row.sender_name,
        recipient_name: row.recipient_name,
        message_data: row.message_data,
        send_date: parse_ts(&row.sent_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserDirectory;

    async fn engine_with_users(names: &[&str]) -> ChatEngine {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let users = UserDirectory::new(db.clone());
        for name in names {
            users.add_user(name, "password123").await.unwrap();
        }
        ChatEngine::new(db)
    }

    #[tokio::test]
    async fn compose_then_send_contract() {
        let chats = engine_with_users(&["alice", "bob"]).await;

        // Cannot reply before any conversation exists
        assert!(matches!(
            chats.send("alice", "bob", "hi").await,
            Err(DomainError::NoRelation)
        ));

        chats.compose("alice", "bob", "hi").await.unwrap();
        assert!(chats.has_relation("alice", "bob").await.unwrap());
        assert!(chats.has_relation("bob", "alice").await.unwrap());

        // Cannot open a second parallel conversation
        assert!(matches!(
            chats.compose("alice", "bob", "again").await,
            Err(DomainError::RelationExists)
        ));
        // Reply works from either side once the relation exists
        chats.send("bob", "alice", "hello back").await.unwrap();
        chats.send("alice", "bob", "continuing").await.unwrap();
    }

    #[tokio::test]
    async fn self_messaging_always_fails() {
        let chats = engine_with_users(&["alice"]).await;
        assert!(matches!(
            chats.compose("alice", "alice", "hi").await,
            Err(DomainError::SelfMessage)
        ));
        assert!(matches!(
            chats.send("alice", "alice", "hi").await,
            Err(DomainError::SelfMessage)
        ));
    }

    #[tokio::test]
    async fn body_length_bounds() {
        let chats = engine_with_users(&["alice", "bob"]).await;
        assert!(matches!(
            chats.compose("alice", "bob", "").await,
            Err(DomainError::InvalidBody)
        ));
        assert!(matches!(
            chats.compose("alice", "bob", &"x".repeat(2001)).await,
            Err(DomainError::InvalidBody)
        ));
        // Single character is the lower boundary and must succeed
        chats.compose("alice", "bob", "x").await.unwrap();
        chats.send("alice", "bob", &"y".repeat(2000)).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_recipient() {
        let chats = engine_with_users(&["alice"]).await;
        assert!(matches!(
            chats.compose("alice", "nobody", "hi").await,
            Err(DomainError::UnknownRecipient)
        ));
        assert!(matches!(
            chats.list_messages("alice", "nobody", 10, 0).await,
            Err(DomainError::UnknownRecipient)
        ));
    }

    #[tokio::test]
    async fn pagination_is_stable_and_disjoint() {
        let chats = engine_with_users(&["alice", "bob"]).await;
        chats.compose("alice", "bob", "first").await.unwrap();
        chats.send("bob", "alice", "second").await.unwrap();
        chats.send("alice", "bob", "third").await.unwrap();

        let newest = chats.list_messages("alice", "bob", 1, 0).await.unwrap();
        let next = chats.list_messages("alice", "bob", 1, 1).await.unwrap();
        assert_eq!(newest[0].message_data, "third");
        assert_eq!(next[0].message_data, "second");
        assert_ne!(newest[0].message_id, next[0].message_id);

        // Both parties see the same history with the sender named per message
        let bobs_view = chats.list_messages("bob", "alice", 100, 0).await.unwrap();
        assert_eq!(bobs_view.len(), 3);
        assert_eq!(bobs_view[1].sender_name, "bob");
        assert_eq!(bobs_view[2].sender_name, "alice");
    }

    #[tokio::test]
    async fn edit_keeps_identity_and_timestamp() {
        let chats = engine_with_users(&["alice", "bob"]).await;
        let id = chats.compose("alice", "bob", "tpyo").await.unwrap();
        let before = chats.get_message("alice", id).await.unwrap();

        let recipient = chats.edit_message("alice", id, "typo").await.unwrap();
        assert_eq!(recipient, "bob");

        let after = chats.get_message("alice", id).await.unwrap();
        assert_eq!(after.message_id, before.message_id);
        assert_eq!(after.send_date, before.send_date);
        assert_eq!(after.message_data, "typo");
    }

    #[tokio::test]
    async fn non_owner_is_indistinguishable_from_missing() {
        let chats = engine_with_users(&["alice", "bob"]).await;
        let id = chats.compose("alice", "bob", "mine").await.unwrap();

        // bob received the message but cannot address it by id
        assert!(matches!(
            chats.get_message("bob", id).await,
            Err(DomainError::InvalidMessage)
        ));
        assert!(matches!(
            chats.edit_message("bob", id, "hijack").await,
            Err(DomainError::InvalidMessage)
        ));
        assert!(matches!(
            chats.delete_message("bob", id).await,
            Err(DomainError::InvalidMessage)
        ));
        // Same error as a genuinely unknown id
        assert!(matches!(
            chats.delete_message("alice", Uuid::new_v4()).await,
            Err(DomainError::InvalidMessage)
        ));
    }

    #[tokio::test]
    async fn deleting_all_messages_keeps_the_relation() {
        let chats = engine_with_users(&["alice", "bob"]).await;
        let id = chats.compose("alice", "bob", "only one").await.unwrap();
        chats.delete_message("alice", id).await.unwrap();

        assert!(chats.has_relation("alice", "bob").await.unwrap());
        assert!(chats.list_messages("alice", "bob", 10, 0).await.unwrap().is_empty());
        // Still a reply conversation, not a new compose
        assert!(matches!(
            chats.compose("bob", "alice", "hi").await,
            Err(DomainError::RelationExists)
        ));
    }

    #[tokio::test]
    async fn relations_list_both_directions() {
        let chats = engine_with_users(&["alice", "bob", "carol"]).await;
        chats.compose("alice", "bob", "hi").await.unwrap();
        chats.compose("carol", "alice", "hey").await.unwrap();

        let relations = chats.relations_for("alice").await.unwrap();
        assert_eq!(relations, vec!["bob".to_string(), "carol".to_string()]);
    }
}
