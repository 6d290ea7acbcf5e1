use async_trait::async_trait;
use auth::token_digest;
use auth::ResetGrant;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::credential::errors::CredentialError;
use crate::domain::credential::models::EmailAddress;
use crate::domain::credential::models::PasswordHash;
use crate::domain::credential::models::User;
use crate::domain::credential::models::UserId;
use crate::domain::credential::ports::CredentialStore;

const USERS_EMAIL_KEY: &str = "users_email_key";

/// SQLSTATE codes for transactions Postgres aborted to break a conflict.
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: PgRow) -> Result<User, CredentialError> {
        let id: Uuid = row.try_get("id").map_err(database_error)?;
        let email: String = row.try_get("email").map_err(database_error)?;
        let password_hash: String = row.try_get("password_hash").map_err(database_error)?;

        Ok(User {
            id: UserId(id),
            email: EmailAddress::new(email)?,
            password_hash: PasswordHash::new(password_hash),
            created_at: row.try_get("created_at").map_err(database_error)?,
            updated_at: row.try_get("updated_at").map_err(database_error)?,
        })
    }
}

/// Connection failures and aborted transactions are retryable; everything
/// else is not.
fn database_error(e: sqlx::Error) -> CredentialError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CredentialError::Unavailable(e.to_string())
        }
        sqlx::Error::Database(db_err)
            if matches!(
                db_err.code().as_deref(),
                Some(DEADLOCK_DETECTED) | Some(SERIALIZATION_FAILURE)
            ) =>
        {
            CredentialError::Unavailable(e.to_string())
        }
        _ => CredentialError::Database(e.to_string()),
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_user_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<User>, CredentialError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(Self::row_to_user).transpose()
    }

    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, CredentialError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(Self::row_to_user).transpose()
    }

    async fn create_user(&self, user: User) -> Result<User, CredentialError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.0)
        .bind(user.email.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() && db_err.constraint() == Some(USERS_EMAIL_KEY) {
                    return CredentialError::EmailAlreadyExists(user.email.as_str().to_string());
                }
            }
            database_error(e)
        })?;

        Ok(user)
    }

    async fn update_user_password(
        &self,
        user_id: &UserId,
        password_hash: &PasswordHash,
        updated_at: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id.0)
        .bind(password_hash.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(user_id.to_string()));
        }

        Ok(())
    }

    async fn create_reset_token(
        &self,
        user_id: &UserId,
        grant: &ResetGrant,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        // Lock order for every reset transition: user row, then token rows
        let owner = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(database_error)?;

        if owner.is_none() {
            return Err(CredentialError::NotFound(user_id.to_string()));
        }

        sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE user_id = $1 AND consumed_at IS NULL
            "#,
        )
        .bind(user_id.0)
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&grant.opaque_id)
        .bind(user_id.0)
        .bind(grant.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        tx.commit().await.map_err(database_error)?;

        Ok(())
    }

    async fn consume_reset_token(
        &self,
        opaque_id: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<UserId, CredentialError> {
        let token_hash = token_digest(opaque_id);
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM password_reset_tokens WHERE token_hash = $1",
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(database_error)?;

        let Some(owner) = owner else {
            return Err(CredentialError::InvalidResetToken);
        };

        // Same lock order as create_reset_token: user row first
        let locked = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(owner)
            .fetch_optional(&mut *tx)
            .await
            .map_err(database_error)?;

        if locked.is_none() {
            return Err(CredentialError::InvalidResetToken);
        }

        // The conditional update is the gate: a concurrent consumer has either
        // committed already or is still waiting on the user lock
        let consumed = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET consumed_at = $3
            WHERE token_hash = $1
              AND user_id = $2
              AND consumed_at IS NULL
              AND expires_at > $3
            "#,
        )
        .bind(&token_hash)
        .bind(owner)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        if consumed.rows_affected() == 0 {
            return Err(CredentialError::InvalidResetToken);
        }

        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(owner)
        .bind(password_hash.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        tx.commit().await.map_err(database_error)?;

        Ok(UserId(owner))
    }

    async fn purge_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, CredentialError> {
        let result = sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE consumed_at IS NOT NULL OR expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected())
    }
}
