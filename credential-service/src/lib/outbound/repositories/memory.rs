use std::collections::HashMap;

use async_trait::async_trait;
use auth::token_digest;
use auth::ResetGrant;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::credential::errors::CredentialError;
use crate::domain::credential::models::EmailAddress;
use crate::domain::credential::models::PasswordHash;
use crate::domain::credential::models::ResetTokenRecord;
use crate::domain::credential::models::User;
use crate::domain::credential::models::UserId;
use crate::domain::credential::ports::CredentialStore;

#[derive(Default)]
struct Tables {
    /// Map of user_id -> User
    users: HashMap<UserId, User>,
    /// Map of normalized email -> user_id, the uniqueness index
    emails: HashMap<String, UserId>,
    /// Map of token digest -> record
    reset_tokens: HashMap<Vec<u8>, ResetTokenRecord>,
}

/// Process-local credential store.
///
/// Every state transition takes the single write lock, so check-and-set
/// sequences are atomic with respect to each other.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    tables: RwLock<Tables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unconsumed reset tokens held for `user_id`.
    pub async fn unconsumed_reset_tokens(&self, user_id: &UserId) -> usize {
        self.tables
            .read()
            .await
            .reset_tokens
            .values()
            .filter(|record| record.user_id == *user_id && !record.is_consumed())
            .count()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<User>, CredentialError> {
        let tables = self.tables.read().await;

        Ok(tables
            .emails
            .get(email.as_str())
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, CredentialError> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, CredentialError> {
        let mut tables = self.tables.write().await;

        if tables.emails.contains_key(user.email.as_str()) {
            return Err(CredentialError::EmailAlreadyExists(
                user.email.as_str().to_string(),
            ));
        }

        tables
            .emails
            .insert(user.email.as_str().to_string(), user.id);
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update_user_password(
        &self,
        user_id: &UserId,
        password_hash: &PasswordHash,
        updated_at: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let mut tables = self.tables.write().await;

        let user = tables
            .users
            .get_mut(user_id)
            .ok_or(CredentialError::NotFound(user_id.to_string()))?;

        user.password_hash = password_hash.clone();
        user.updated_at = updated_at;

        Ok(())
    }

    async fn create_reset_token(
        &self,
        user_id: &UserId,
        grant: &ResetGrant,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(user_id) {
            return Err(CredentialError::NotFound(user_id.to_string()));
        }

        // Supersede whatever is still outstanding for this user
        tables
            .reset_tokens
            .retain(|_, record| record.user_id != *user_id || record.is_consumed());

        let token_hash = token_digest(&grant.opaque_id);
        tables.reset_tokens.insert(
            token_hash.clone(),
            ResetTokenRecord {
                token_hash,
                user_id: *user_id,
                expires_at: grant.expires_at,
                consumed_at: None,
                created_at: now,
            },
        );

        Ok(())
    }

    async fn consume_reset_token(
        &self,
        opaque_id: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<UserId, CredentialError> {
        let mut tables = self.tables.write().await;
        let tables = &mut *tables;

        let record = tables
            .reset_tokens
            .get_mut(&token_digest(opaque_id))
            .filter(|record| record.is_usable(now))
            .ok_or(CredentialError::InvalidResetToken)?;

        let user = tables
            .users
            .get_mut(&record.user_id)
            .ok_or(CredentialError::InvalidResetToken)?;

        record.consumed_at = Some(now);
        user.password_hash = password_hash.clone();
        user.updated_at = now;

        Ok(user.id)
    }

    async fn purge_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, CredentialError> {
        let mut tables = self.tables.write().await;
        let before = tables.reset_tokens.len();

        tables
            .reset_tokens
            .retain(|_, record| record.is_usable(now));

        Ok((before - tables.reset_tokens.len()) as u64)
    }
}
