use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

use crate::domain::credential::errors::NotificationError;
use crate::domain::credential::models::EmailAddress;
use crate::domain::credential::ports::ResetNotifier;

/// Notifier for local development: records that a message would be sent.
///
/// The reset identifier itself is never written to the log.
#[derive(Debug, Default, Clone)]
pub struct LogResetNotifier;

impl LogResetNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResetNotifier for LogResetNotifier {
    async fn send_reset_email(
        &self,
        to: &EmailAddress,
        _opaque_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            to = %to,
            expires_at = %expires_at,
            "Reset email dispatched (log transport)"
        );

        Ok(())
    }
}
