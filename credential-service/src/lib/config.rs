use std::env;
use std::fmt;
use std::time::Duration;

use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    pub mail: MailConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct TokenConfig {
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: i64,
    #[serde(default = "default_reset_ttl_minutes")]
    pub reset_ttl_minutes: i64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[redacted]")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("reset_ttl_minutes", &self.reset_ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    Log,
    Http,
}

#[derive(Deserialize, Clone)]
pub struct MailConfig {
    pub transport: MailTransport,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    pub from_address: String,
    pub reset_url_base: String,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("from_address", &self.from_address)
            .field("reset_url_base", &self.reset_url_base)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_store_timeout_ms")]
    pub store_ms: u64,
    #[serde(default = "default_mail_timeout_ms")]
    pub mail_ms: u64,
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn mail(&self) -> Duration {
        Duration::from_millis(self.mail_ms)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_purge_interval_secs() -> u64 {
    300
}

fn default_algorithm() -> String {
    auth::codec::DEFAULT_ALGORITHM.to_string()
}

fn default_issuer() -> String {
    auth::codec::DEFAULT_ISSUER.to_string()
}

fn default_access_ttl_minutes() -> i64 {
    auth::codec::DEFAULT_ACCESS_TTL_MINUTES
}

fn default_reset_ttl_minutes() -> i64 {
    auth::codec::DEFAULT_RESET_TTL_MINUTES
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_mail_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (TOKENS__SECRET, DATABASE__URL, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let configuration = ConfigBuilder::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Self::environment())
            .build()?;

        let config: Config = configuration.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Unprefixed environment overrides.
    ///
    /// Example: TOKENS__SECRET=... overrides tokens.secret
    fn environment() -> Environment {
        Environment::default().separator("__")
    }

    /// Reject settings that would only fail later, on the first request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Message(format!(
                "tokens.secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }

        if self.tokens.access_ttl_minutes <= 0 || self.tokens.reset_ttl_minutes <= 0 {
            return Err(ConfigError::Message(
                "token lifetimes must be positive".to_string(),
            ));
        }

        if self.mail.transport == MailTransport::Http && self.mail.endpoint.is_none() {
            return Err(ConfigError::Message(
                "mail.endpoint is required when mail.transport = \"http\"".to_string(),
            ));
        }

        Ok(())
    }

    /// Codec settings derived from the `tokens` section.
    pub fn token_settings(&self) -> auth::TokenSettings {
        auth::TokenSettings::new(self.tokens.secret.as_bytes())
            .with_algorithm(&self.tokens.algorithm)
            .with_issuer(&self.tokens.issuer)
            .with_access_ttl(chrono::Duration::minutes(self.tokens.access_ttl_minutes))
            .with_reset_ttl(chrono::Duration::minutes(self.tokens.reset_ttl_minutes))
    }
}
