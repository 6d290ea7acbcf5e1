use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;

use crate::domain::credential::errors::NotificationError;
use crate::domain::credential::models::EmailAddress;
use crate::domain::credential::ports::ResetNotifier;
use crate::outbound::notifications::reset_link;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Message body accepted by the mail relay.
#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: String,
}

/// Delivers reset links through a JSON mail relay over HTTP.
pub struct HttpResetNotifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
    reset_url_base: String,
}

impl HttpResetNotifier {
    /// # Arguments
    /// * `endpoint` - Relay URL receiving a POST per message
    /// * `api_key` - Sent as a bearer token when present
    /// * `from_address` - Sender address
    /// * `reset_url_base` - Page the reset link points at
    /// * `timeout` - Per-request bound
    ///
    /// # Errors
    /// * `Transport` - HTTP client could not be built
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from_address: String,
        reset_url_base: String,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            from_address,
            reset_url_base,
        })
    }
}

#[async_trait]
impl ResetNotifier for HttpResetNotifier {
    async fn send_reset_email(
        &self,
        to: &EmailAddress,
        opaque_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        let message = OutgoingMessage {
            from: &self.from_address,
            to: to.as_str(),
            subject: "Reset your password",
            body: format!(
                "Someone asked to reset the password for this address.\n\n\
                 Follow this link to choose a new one: {}\n\n\
                 The link expires at {}. If you did not ask for this, ignore this message.",
                reset_link(&self.reset_url_base, opaque_id),
                expires_at.to_rfc2822()
            ),
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            tracing::error!(status = %status, "Mail relay rejected reset email");
            return Err(NotificationError::Rejected(status.to_string()));
        }
        if !status.is_success() {
            tracing::error!(status = %status, "Mail relay failed");
            return Err(NotificationError::Transport(status.to_string()));
        }

        tracing::debug!(to = %to, "Reset email accepted by relay");

        Ok(())
    }
}
