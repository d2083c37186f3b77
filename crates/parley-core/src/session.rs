use std::sync::Arc;

use anyhow::anyhow;
use argon2::{Argon2, PasswordHash, PasswordVerifier, password_hash};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::debug;

use parley_db::{Database, format_ts, parse_ts};
use parley_types::error::{DomainError, DomainResult};

/// Metadata of a known session. `expired` is computed against the clock at
/// lookup time and is never cached.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expired: bool,
}

/// Sole source of truth for "is this caller authenticated". Owns the session
/// rows; expiry is a read-time predicate and revocation is the only deletion
/// path.
#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
}

impl SessionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue a fresh opaque token for `username`, valid until `expires_on`.
    pub async fn create_session(
        &self,
        username: &str,
        expires_on: DateTime<Utc>,
    ) -> DomainResult<String> {
        if expires_on <= Utc::now() {
            return Err(DomainError::InvalidExpiry);
        }

        let db = self.db.clone();
        let username = username.to_owned();
        crate::run_blocking(move || {
            let user = db
                .get_user_by_username(&username)?
                .ok_or(DomainError::UnknownUser)?;

            let token = generate_token();
            db.insert_session(&token, &user.id, &format_ts(Utc::now()), &format_ts(expires_on))?;

            debug!("Created session for user '{}'", username);
            Ok(token)
        })
        .await
    }

    /// Check a password against the stored hash. The Argon2 comparison is
    /// constant-time; a hash that fails to parse is an internal fault, not a
    /// wrong password.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> DomainResult<()> {
        let db = self.db.clone();
        let username = username.to_owned();
        let password = password.to_owned();
        crate::run_blocking(move || {
            let user = db
                .get_user_by_username(&username)?
                .ok_or(DomainError::UnknownUser)?;

            let parsed = PasswordHash::new(&user.password_hash)
                .map_err(|e| anyhow!("stored hash for '{}' unparseable: {}", username, e))?;

            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(()),
                Err(password_hash::Error::Password) => Err(DomainError::InvalidCredential),
                Err(e) => Err(DomainError::Internal(anyhow!("verifier fault: {}", e))),
            }
        })
        .await
    }

    pub async fn get_session_info(&self, token: &str) -> DomainResult<SessionInfo> {
        let db = self.db.clone();
        let token = token.to_owned();
        crate::run_blocking(move || {
            let row = db.get_session(&token)?.ok_or(DomainError::InvalidSession)?;

            let expires_on = parse_ts(&row.expires_on)?;
            Ok(SessionInfo {
                token: row.token,
                username: row.username,
                created_at: parse_ts(&row.created_at)?,
                expired: Utc::now() > expires_on,
            })
        })
        .await
    }

    /// False for unknown tokens: callers that must distinguish "unknown" from
    /// "expired" use `get_session_info` instead.
    pub async fn is_expired(&self, token: &str) -> DomainResult<bool> {
        let db = self.db.clone();
        let token = token.to_owned();
        crate::run_blocking(move || {
            let Some(row) = db.get_session(&token)? else {
                return Ok(false);
            };
            let expires_on = parse_ts(&row.expires_on)?;
            Ok(Utc::now() > expires_on)
        })
        .await
    }

    /// Delete the session row. Returns the owning username so the caller can
    /// disconnect exactly that token's live channels.
    pub async fn revoke(&self, token: &str) -> DomainResult<String> {
        let db = self.db.clone();
        let token = token.to_owned();
        crate::run_blocking(move || {
            let row = db.get_session(&token)?.ok_or(DomainError::InvalidSession)?;
            if !db.delete_session(&token)? {
                // Lost a race with another revoke of the same token
                return Err(DomainError::InvalidSession);
            }
            Ok(row.username)
        })
        .await
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserDirectory;
    use chrono::Duration;

    async fn manager_with_user(name: &str, password: &str) -> SessionManager {
        let db = Arc::new(Database::open_in_memory().unwrap());
        UserDirectory::new(db.clone())
            .add_user(name, password)
            .await
            .unwrap();
        SessionManager::new(db)
    }

    #[tokio::test]
    async fn create_and_inspect_session() {
        let sessions = manager_with_user("alice", "hunter2hunter2").await;
        let token = sessions
            .create_session("alice", Utc::now() + Duration::days(30))
            .await
            .unwrap();
        assert!(token.len() >= 43); // 32 bytes, url-safe base64

        let info = sessions.get_session_info(&token).await.unwrap();
        assert_eq!(info.username, "alice");
        assert!(!info.expired);
    }

    #[tokio::test]
    async fn expiry_is_a_read_time_predicate() {
        let sessions = manager_with_user("alice", "hunter2hunter2").await;
        let token = sessions
            .create_session("alice", Utc::now() + Duration::milliseconds(30))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        // Expired but still present: metadata remains inspectable
        assert!(sessions.is_expired(&token).await.unwrap());
        let info = sessions.get_session_info(&token).await.unwrap();
        assert!(info.expired);
    }

    #[tokio::test]
    async fn unknown_token_is_not_expired() {
        let sessions = manager_with_user("alice", "hunter2hunter2").await;
        assert!(!sessions.is_expired("no-such-token").await.unwrap());
        assert!(matches!(
            sessions.get_session_info("no-such-token").await,
            Err(DomainError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn create_session_rejects_past_expiry() {
        let sessions = manager_with_user("alice", "hunter2hunter2").await;
        let result = sessions
            .create_session("alice", Utc::now() - Duration::seconds(1))
            .await;
        assert!(matches!(result, Err(DomainError::InvalidExpiry)));
    }

    #[tokio::test]
    async fn revoke_leaves_other_sessions_alone() {
        let sessions = manager_with_user("alice", "hunter2hunter2").await;
        let expiry = Utc::now() + Duration::days(1);
        let first = sessions.create_session("alice", expiry).await.unwrap();
        let second = sessions.create_session("alice", expiry).await.unwrap();

        let owner = sessions.revoke(&first).await.unwrap();
        assert_eq!(owner, "alice");
        assert!(matches!(
            sessions.get_session_info(&first).await,
            Err(DomainError::InvalidSession)
        ));
        assert!(sessions.get_session_info(&second).await.is_ok());

        // Revoking twice fails: the row is gone
        assert!(matches!(
            sessions.revoke(&first).await,
            Err(DomainError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn verify_credentials_uniform_failures() {
        let sessions = manager_with_user("alice", "hunter2hunter2").await;
        assert!(sessions.verify_credentials("alice", "hunter2hunter2").await.is_ok());
        assert!(matches!(
            sessions.verify_credentials("alice", "wrong").await,
            Err(DomainError::InvalidCredential)
        ));
        assert!(matches!(
            sessions.verify_credentials("nobody", "whatever").await,
            Err(DomainError::UnknownUser)
        ));
    }
}
