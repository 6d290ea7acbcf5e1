use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth::AccessToken;
use auth::PasswordError;
use auth::PasswordHasher;
use auth::TokenCodec;
use auth::TokenError;
use chrono::Utc;

use crate::domain::credential::errors::CredentialError;
use crate::domain::credential::errors::PasswordPolicyError;
use crate::domain::credential::models::ChangePasswordCommand;
use crate::domain::credential::models::EmailAddress;
use crate::domain::credential::models::Password;
use crate::domain::credential::models::PasswordHash;
use crate::domain::credential::models::SignupCommand;
use crate::domain::credential::models::User;
use crate::domain::credential::models::UserId;
use crate::domain::credential::ports::CredentialServicePort;
use crate::domain::credential::ports::CredentialStore;
use crate::domain::credential::ports::ResetNotifier;

/// Upper bounds for calls that leave the process.
#[derive(Debug, Clone, Copy)]
pub struct ServiceTimeouts {
    pub store: Duration,
    pub mail: Duration,
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(2),
            mail: Duration::from_secs(5),
        }
    }
}

/// The one error a failed login may produce.
///
/// Both the unknown-email and the wrong-password branches go through here so
/// the two stay indistinguishable to the caller.
fn rejected_login() -> CredentialError {
    CredentialError::InvalidCredentials
}

/// Domain service implementation for credential operations.
///
/// Concrete implementation of CredentialServicePort with dependency injection.
pub struct CredentialService<CS, RN>
where
    CS: CredentialStore,
    RN: ResetNotifier,
{
    store: Arc<CS>,
    notifier: Arc<RN>,
    codec: Arc<TokenCodec>,
    password_hasher: PasswordHasher,
    decoy_hash: String,
    timeouts: ServiceTimeouts,
}

impl<CS, RN> CredentialService<CS, RN>
where
    CS: CredentialStore,
    RN: ResetNotifier,
{
    /// Create a new credential service with injected dependencies.
    ///
    /// # Arguments
    /// * `store` - Persistence for users and reset tokens
    /// * `notifier` - Delivery of reset links
    /// * `codec` - Process-wide token codec holding the signing key
    /// * `timeouts` - Bounds for store and mail calls
    ///
    /// # Errors
    /// * `HashingFailed` - The decoy hash for unknown-email logins could not
    ///   be prepared
    pub fn new(
        store: Arc<CS>,
        notifier: Arc<RN>,
        codec: Arc<TokenCodec>,
        timeouts: ServiceTimeouts,
    ) -> Result<Self, PasswordError> {
        let password_hasher = PasswordHasher::new();
        let decoy_hash = password_hasher.decoy_hash()?;

        Ok(Self {
            store,
            notifier,
            codec,
            password_hasher,
            decoy_hash,
            timeouts,
        })
    }

    /// Run a store call under the store timeout.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, CredentialError>
    where
        F: Future<Output = Result<T, CredentialError>>,
    {
        match tokio::time::timeout(self.timeouts.store, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, "Credential store call timed out");
                Err(CredentialError::Unavailable(format!(
                    "{} timed out",
                    operation
                )))
            }
        }
    }

    async fn hash_password(&self, password: &Password) -> Result<PasswordHash, CredentialError> {
        let hasher = self.password_hasher;
        let plaintext = password.as_str().to_owned();

        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| CredentialError::Unknown(format!("Hashing task failed: {}", e)))?
            .map(PasswordHash::new)
            .map_err(|e| match e {
                PasswordError::Empty => CredentialError::InvalidPassword(PasswordPolicyError::Empty),
                PasswordError::HashingFailed(msg) => {
                    CredentialError::Unknown(format!("Password hashing failed: {}", msg))
                }
            })
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, CredentialError> {
        let hasher = self.password_hasher;
        let plaintext = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .map_err(|e| CredentialError::Unknown(format!("Verification task failed: {}", e)))
    }

    /// Look up and check an email/password pair.
    async fn check_credentials(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let Ok(email) = EmailAddress::new(email.to_string()) else {
            self.verify_password(password, &self.decoy_hash).await?;
            return Err(rejected_login());
        };

        let user = self
            .bounded("find_user_by_email", self.store.find_user_by_email(&email))
            .await?;

        match user {
            Some(user) => {
                if self
                    .verify_password(password, user.password_hash.as_str())
                    .await?
                {
                    Ok(user)
                } else {
                    Err(rejected_login())
                }
            }
            None => {
                // Same CPU cost as a real verification
                self.verify_password(password, &self.decoy_hash).await?;
                Err(rejected_login())
            }
        }
    }

    fn issue_token(&self, user: &User) -> Result<AccessToken, CredentialError> {
        Ok(self
            .codec
            .issue_access_token(&user.id.to_string(), Utc::now())?)
    }
}

#[async_trait]
impl<CS, RN> CredentialServicePort for CredentialService<CS, RN>
where
    CS: CredentialStore,
    RN: ResetNotifier,
{
    async fn signup(&self, command: SignupCommand) -> Result<User, CredentialError> {
        let password_hash = self.hash_password(&command.password).await?;
        let now = Utc::now();

        let user = User {
            id: UserId::new(),
            email: command.email,
            password_hash,
            created_at: now,
            updated_at: now,
        };

        let created_user = self
            .bounded("create_user", self.store.create_user(user))
            .await?;

        tracing::info!(user_id = %created_user.id, "Account created");

        Ok(created_user)
    }

    async fn login(&self, email: &str, password: &str) -> Result<AccessToken, CredentialError> {
        let user = self.check_credentials(email, password).await.map_err(|e| {
            if e == rejected_login() {
                tracing::info!("Login rejected");
            }
            e
        })?;

        let token = self.issue_token(&user)?;
        tracing::info!(user_id = %user.id, "Login succeeded");

        Ok(token)
    }

    async fn refresh_access_token(&self, token: &str) -> Result<AccessToken, CredentialError> {
        let user = self.authenticate(token).await?;

        self.reissue_access_token(&user).await
    }

    async fn reissue_access_token(&self, user: &User) -> Result<AccessToken, CredentialError> {
        let refreshed = self.issue_token(user)?;

        tracing::debug!(user_id = %user.id, "Access token refreshed");

        Ok(refreshed)
    }

    async fn authenticate(&self, token: &str) -> Result<User, CredentialError> {
        let subject = self.codec.verify_access_token(token, Utc::now())?;

        let user_id =
            UserId::from_string(&subject).map_err(|_| CredentialError::Token(TokenError::Malformed))?;

        self.bounded("find_user_by_id", self.store.find_user_by_id(&user_id))
            .await?
            .ok_or(CredentialError::Token(TokenError::Malformed))
    }

    async fn change_password(
        &self,
        user_id: &UserId,
        command: ChangePasswordCommand,
    ) -> Result<(), CredentialError> {
        let user = self
            .bounded("find_user_by_id", self.store.find_user_by_id(user_id))
            .await?
            .ok_or(CredentialError::NotFound(user_id.to_string()))?;

        if !self
            .verify_password(&command.current_password, user.password_hash.as_str())
            .await?
        {
            return Err(rejected_login());
        }

        let new_hash = self.hash_password(&command.new_password).await?;

        self.bounded(
            "update_user_password",
            self.store
                .update_user_password(&user.id, &new_hash, Utc::now()),
        )
        .await?;

        tracing::info!(user_id = %user.id, "Password changed");

        Ok(())
    }

    async fn request_password_reset(&self, email: &EmailAddress) -> Result<(), CredentialError> {
        let Some(user) = self
            .bounded("find_user_by_email", self.store.find_user_by_email(email))
            .await?
        else {
            tracing::debug!("Password reset requested for unregistered address");
            return Ok(());
        };

        let now = Utc::now();
        let grant = self.codec.issue_reset_token(&user.id.to_string(), now);

        self.bounded(
            "create_reset_token",
            self.store.create_reset_token(&user.id, &grant, now),
        )
        .await?;

        // The token stays valid if delivery fails; a later request supersedes it
        let delivery = tokio::time::timeout(
            self.timeouts.mail,
            self.notifier
                .send_reset_email(&user.email, &grant.opaque_id, grant.expires_at),
        )
        .await;

        match delivery {
            Ok(Ok(())) => {
                tracing::info!(user_id = %user.id, expires_at = %grant.expires_at, "Password reset issued");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to deliver reset email");
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(user_id = %user.id, "Reset email delivery timed out");
                Err(CredentialError::Unavailable(
                    "reset email delivery timed out".to_string(),
                ))
            }
        }
    }

    async fn confirm_password_reset(
        &self,
        opaque_id: &str,
        new_password: Password,
    ) -> Result<(), CredentialError> {
        // Hash first: a hashing failure must not burn the token
        let new_hash = self.hash_password(&new_password).await?;

        let user_id = self
            .bounded(
                "consume_reset_token",
                self.store
                    .consume_reset_token(opaque_id, &new_hash, Utc::now()),
            )
            .await?;

        tracing::info!(user_id = %user_id, "Password reset completed");

        Ok(())
    }

    async fn purge_reset_tokens(&self) -> Result<u64, CredentialError> {
        let removed = self
            .bounded(
                "purge_reset_tokens",
                self.store.purge_reset_tokens(Utc::now()),
            )
            .await?;

        if removed > 0 {
            tracing::debug!(removed, "Purged inert reset tokens");
        }

        Ok(removed)
    }
}
