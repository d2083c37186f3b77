use std::sync::Arc;

use anyhow::anyhow;
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_db::{Database, format_ts};
use parley_types::error::{DomainError, DomainResult};

pub const MAX_USERNAME_CHARS: usize = 20;

/// Administrative user CRUD. Account creation and deletion are privileged
/// operations reserved for the distinguished first user; the gate itself
/// lives at the HTTP boundary.
#[derive(Clone)]
pub struct UserDirectory {
    db: Arc<Database>,
}

impl UserDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Seed the distinguished first user if no account with that name exists.
    /// Idempotent across restarts.
    pub async fn ensure_first_user(&self, username: &str, password: &str) -> DomainResult<()> {
        match self.add_user(username, password).await {
            Ok(()) => {
                info!("Seeded first user '{}'", username);
                Ok(())
            }
            Err(DomainError::UserExists) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn add_user(&self, username: &str, password: &str) -> DomainResult<()> {
        let db = self.db.clone();
        let username = username.to_owned();
        let password = password.to_owned();
        crate::run_blocking(move || {
            if db.get_user_by_username(&username)?.is_some() {
                return Err(DomainError::UserExists);
            }

            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| anyhow!("password hashing failed: {}", e))?
                .to_string();

            db.create_user(
                &Uuid::new_v4().to_string(),
                &username,
                &password_hash,
                &format_ts(Utc::now()),
            )?;
            Ok(())
        })
        .await
    }

    /// Remove an account. Sessions and messages cascade at the storage layer;
    /// disconnecting the user's live channels is the caller's job.
    pub async fn delete_user(&self, username: &str) -> DomainResult<()> {
        let db = self.db.clone();
        let username = username.to_owned();
        crate::run_blocking(move || {
            let user = db
                .get_user_by_username(&username)?
                .ok_or(DomainError::UnknownUser)?;
            db.delete_user(&user.id)?;
            info!("Deleted user '{}'", username);
            Ok(())
        })
        .await
    }

    pub async fn list_users(&self) -> DomainResult<Vec<String>> {
        let db = self.db.clone();
        crate::run_blocking(move || Ok(db.list_usernames()?)).await
    }

    pub async fn user_exists(&self, username: &str) -> DomainResult<bool> {
        let db = self.db.clone();
        let username = username.to_owned();
        crate::run_blocking(move || Ok(db.get_user_by_username(&username)?.is_some())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn add_list_delete() {
        let users = directory();
        users.add_user("bob", "password123").await.unwrap();
        users.add_user("alice", "password123").await.unwrap();

        assert!(matches!(
            users.add_user("alice", "other").await,
            Err(DomainError::UserExists)
        ));
        assert_eq!(users.list_users().await.unwrap(), vec!["alice", "bob"]);
        assert!(users.user_exists("alice").await.unwrap());

        users.delete_user("alice").await.unwrap();
        assert!(!users.user_exists("alice").await.unwrap());
        assert!(matches!(
            users.delete_user("alice").await,
            Err(DomainError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn first_user_seed_is_idempotent() {
        let users = directory();
        users.ensure_first_user("admin", "topsecret99").await.unwrap();
        users.ensure_first_user("admin", "topsecret99").await.unwrap();
        assert_eq!(users.list_users().await.unwrap(), vec!["admin"]);
    }
}
