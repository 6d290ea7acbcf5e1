use async_trait::async_trait;
use auth::AccessToken;
use auth::ResetGrant;
use chrono::DateTime;
use chrono::Utc;

use crate::domain::credential::errors::CredentialError;
use crate::domain::credential::errors::NotificationError;
use crate::domain::credential::models::ChangePasswordCommand;
use crate::domain::credential::models::EmailAddress;
use crate::domain::credential::models::Password;
use crate::domain::credential::models::PasswordHash;
use crate::domain::credential::models::SignupCommand;
use crate::domain::credential::models::User;
use crate::domain::credential::models::UserId;

/// Port for credential domain service operations.
#[async_trait]
pub trait CredentialServicePort: Send + Sync + 'static {
    /// Register a new account.
    ///
    /// # Arguments
    /// * `command` - Validated email and password
    ///
    /// # Returns
    /// Created user entity
    ///
    /// # Errors
    /// * `EmailAlreadyExists` - Email is already registered
    /// * `Unavailable` - Store timed out or is unreachable
    async fn signup(&self, command: SignupCommand) -> Result<User, CredentialError>;

    /// Exchange an email and password for an access token.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email or wrong password; the two
    ///   cases are indistinguishable
    /// * `Unavailable` - Store timed out or is unreachable
    async fn login(&self, email: &str, password: &str) -> Result<AccessToken, CredentialError>;

    /// Exchange a still-valid access token for a fresh one.
    ///
    /// # Errors
    /// * `Token(Malformed)` - Token is not authentic, or its subject is gone
    /// * `Token(Expired)` - Token has expired
    async fn refresh_access_token(&self, token: &str) -> Result<AccessToken, CredentialError>;

    /// Issue a fresh access token for a user whose bearer token has already
    /// been resolved through `authenticate`.
    async fn reissue_access_token(&self, user: &User) -> Result<AccessToken, CredentialError>;

    /// Resolve an access token to its user.
    ///
    /// # Errors
    /// * `Token(Malformed)` - Token is not authentic, or its subject is gone
    /// * `Token(Expired)` - Token has expired
    async fn authenticate(&self, token: &str) -> Result<User, CredentialError>;

    /// Replace the password of an authenticated user.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Current password does not match
    /// * `NotFound` - User does not exist
    async fn change_password(
        &self,
        user_id: &UserId,
        command: ChangePasswordCommand,
    ) -> Result<(), CredentialError>;

    /// Start a password reset for `email`.
    ///
    /// Succeeds whether or not the address is registered.
    ///
    /// # Errors
    /// * `Unavailable` - Store or mail relay failed for a registered address
    async fn request_password_reset(&self, email: &EmailAddress) -> Result<(), CredentialError>;

    /// Finish a password reset with the identifier from the email.
    ///
    /// # Errors
    /// * `InvalidResetToken` - Unknown, expired, or already used identifier
    /// * `Unavailable` - Store timed out or is unreachable
    async fn confirm_password_reset(
        &self,
        opaque_id: &str,
        new_password: Password,
    ) -> Result<(), CredentialError>;

    /// Drop consumed and expired reset tokens.
    ///
    /// # Returns
    /// Number of records removed
    async fn purge_reset_tokens(&self) -> Result<u64, CredentialError>;
}

/// Persistence operations for users and reset tokens.
///
/// Implementations own the atomicity of the reset-token transitions.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Retrieve user by normalized email address.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    async fn find_user_by_email(&self, email: &EmailAddress)
        -> Result<Option<User>, CredentialError>;

    /// Retrieve user by identifier.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, CredentialError>;

    /// Persist new user.
    ///
    /// # Errors
    /// * `EmailAlreadyExists` - Email is already registered
    async fn create_user(&self, user: User) -> Result<User, CredentialError>;

    /// Replace a user's password hash.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    async fn update_user_password(
        &self,
        user_id: &UserId,
        password_hash: &PasswordHash,
        updated_at: DateTime<Utc>,
    ) -> Result<(), CredentialError>;

    /// Store a reset token, superseding any unconsumed one for the same user
    /// in the same atomic step.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    async fn create_reset_token(
        &self,
        user_id: &UserId,
        grant: &ResetGrant,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError>;

    /// Mark a reset token consumed and install `password_hash` on its owner,
    /// as one atomic transition.
    ///
    /// Of two concurrent calls with the same id, at most one succeeds.
    ///
    /// # Returns
    /// Owner of the token
    ///
    /// # Errors
    /// * `InvalidResetToken` - Unknown, consumed, `now >= expires_at`, or the
    ///   owner no longer exists
    async fn consume_reset_token(
        &self,
        opaque_id: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<UserId, CredentialError>;

    /// Delete consumed tokens and tokens expired at `now`.
    ///
    /// # Returns
    /// Number of records removed
    async fn purge_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, CredentialError>;
}

/// Delivery of reset links to account owners.
#[async_trait]
pub trait ResetNotifier: Send + Sync + 'static {
    /// Send the reset identifier to `to`.
    ///
    /// # Errors
    /// * `Rejected` - Relay refused the message
    /// * `Transport` - Relay could not be reached
    async fn send_reset_email(
        &self,
        to: &EmailAddress,
        opaque_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotificationError>;
}
