use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::jwt::Claims;
use crate::jwt::JwtError;
use crate::jwt::JwtHandler;
use crate::reset::generate_opaque_token;

pub const DEFAULT_ALGORITHM: &str = "HS256";
pub const DEFAULT_ISSUER: &str = "credential-service";
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
pub const DEFAULT_RESET_TTL_MINUTES: i64 = 15;

/// Everything the codec needs, read once at startup.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Vec<u8>,
    pub algorithm: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub reset_ttl: Duration,
}

impl TokenSettings {
    /// Settings with the default algorithm, issuer and lifetimes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: DEFAULT_ALGORITHM.to_string(),
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            reset_ttl: Duration::minutes(DEFAULT_RESET_TTL_MINUTES),
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl ToString) -> Self {
        self.algorithm = algorithm.to_string();
        self
    }

    pub fn with_issuer(mut self, issuer: impl ToString) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_reset_ttl(mut self, ttl: Duration) -> Self {
        self.reset_ttl = ttl;
        self
    }
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"[redacted]")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("reset_ttl", &self.reset_ttl)
            .finish()
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A freshly generated reset capability, not yet stored.
#[derive(Clone, PartialEq, Eq)]
pub struct ResetGrant {
    pub opaque_id: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for ResetGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetGrant")
            .field("opaque_id", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Access token verification and signing failures.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,

    #[error("Token is expired")]
    Expired,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies access tokens, and mints reset identifiers.
///
/// Holds the signing key for the lifetime of the process. Immutable after
/// construction; share it behind an `Arc`.
pub struct TokenCodec {
    jwt_handler: JwtHandler,
    issuer: String,
    access_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from settings.
    ///
    /// # Errors
    /// * `UnsupportedAlgorithm` - Algorithm is not HS256, HS384 or HS512
    pub fn new(settings: TokenSettings) -> Result<Self, JwtError> {
        let jwt_handler = JwtHandler::from_algorithm_name(&settings.secret, &settings.algorithm)?;

        Ok(Self {
            jwt_handler,
            issuer: settings.issuer,
            access_ttl: settings.access_ttl,
            reset_ttl: settings.reset_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn reset_ttl(&self) -> Duration {
        self.reset_ttl
    }

    /// Sign an access token for `subject_id` valid from `now` for the access TTL.
    ///
    /// # Errors
    /// * `Signing` - The JWT library refused to encode the claims
    pub fn issue_access_token(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, TokenError> {
        let claims = Claims::access(subject_id, &self.issuer, now, self.access_ttl);

        let token = self
            .jwt_handler
            .encode(&claims)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(AccessToken {
            token,
            subject: claims.sub,
            issued_at: now,
            expires_at: now + self.access_ttl,
        })
    }

    /// Verify an access token at `now` and return its subject.
    ///
    /// Signature and structure are checked before expiry. A forged or
    /// tampered token is `Malformed` regardless of its claimed lifetime.
    ///
    /// # Errors
    /// * `Malformed` - Bad encoding, signature, algorithm, issuer, type or
    ///   lifetime
    /// * `Expired` - Authentic token with `now >= exp`
    pub fn verify_access_token(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims: Claims = self.jwt_handler.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "access token rejected");
            TokenError::Malformed
        })?;

        if claims.iss != self.issuer || claims.exp <= claims.iat {
            return Err(TokenError::Malformed);
        }

        if claims.is_expired(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims.sub)
    }

    /// Mint a reset capability for `subject_id`, valid for the reset TTL.
    ///
    /// The identifier is random and unrelated to the subject; only the store
    /// knows who it belongs to.
    pub fn issue_reset_token(&self, subject_id: &str, now: DateTime<Utc>) -> ResetGrant {
        let grant = ResetGrant {
            opaque_id: generate_opaque_token(),
            expires_at: now + self.reset_ttl,
        };

        tracing::debug!(
            subject = subject_id,
            expires_at = %grant.expires_at,
            "reset token minted"
        );

        grant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_secret_key_at_least_32_bytes!";

    fn codec() -> TokenCodec {
        TokenCodec::new(TokenSettings::new(SECRET)).expect("Failed to build codec")
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let codec = codec();
        let issued = at(1_700_000_000);

        let token = codec
            .issue_access_token("user123", issued)
            .expect("Failed to issue token");

        assert_eq!(token.subject, "user123");
        assert_eq!(token.expires_at - token.issued_at, Duration::minutes(30));

        let subject = codec
            .verify_access_token(&token.token, issued)
            .expect("Token validation failed");
        assert_eq!(subject, "user123");
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let issued = at(1_700_000_000);
        let ttl = codec.access_ttl();
        let token = codec.issue_access_token("user123", issued).unwrap();

        let just_before = issued + ttl - Duration::seconds(1);
        let exactly = issued + ttl;
        let just_after = issued + ttl + Duration::seconds(1);

        assert_eq!(
            codec.verify_access_token(&token.token, just_before),
            Ok("user123".to_string())
        );
        assert_eq!(
            codec.verify_access_token(&token.token, exactly),
            Err(TokenError::Expired)
        );
        assert_eq!(
            codec.verify_access_token(&token.token, just_after),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_forged_expired_token_is_malformed_not_expired() {
        let codec = codec();
        let forger = TokenCodec::new(TokenSettings::new(
            b"attacker_secret_key_at_least_32_bytes".to_vec(),
        ))
        .unwrap();

        let issued = at(1_000);
        let forged = forger.issue_access_token("user123", issued).unwrap();

        // Long after expiry the answer is still about the signature
        let later = issued + Duration::days(1);
        assert_eq!(
            codec.verify_access_token(&forged.token, later),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_tampered_token_is_malformed() {
        let codec = codec();
        let token = codec.issue_access_token("user123", at(1_000)).unwrap();

        let mut parts: Vec<&str> = token.token.split('.').collect();
        let other = codec.issue_access_token("admin", at(1_000)).unwrap();
        let other_payload = other.token.split('.').nth(1).unwrap().to_string();
        parts[1] = &other_payload;
        let tampered = parts.join(".");

        assert_eq!(
            codec.verify_access_token(&tampered, at(1_000)),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = codec();

        assert_eq!(
            codec.verify_access_token("invalid.token.here", at(0)),
            Err(TokenError::Malformed)
        );
        assert_eq!(codec.verify_access_token("", at(0)), Err(TokenError::Malformed));
    }

    #[test]
    fn test_foreign_issuer_is_malformed() {
        let codec = codec();
        let foreign = TokenCodec::new(TokenSettings::new(SECRET).with_issuer("someone-else")).unwrap();

        let token = foreign.issue_access_token("user123", at(1_000)).unwrap();

        assert_eq!(
            codec.verify_access_token(&token.token, at(1_000)),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_token_without_type_tag_is_malformed() {
        #[derive(serde::Serialize)]
        struct Untyped<'a> {
            sub: &'a str,
            iat: i64,
            exp: i64,
            iss: &'a str,
        }

        let codec = codec();
        let handler = JwtHandler::new(SECRET);
        let token = handler
            .encode(&Untyped {
                sub: "user123",
                iat: 1_000,
                exp: 5_000,
                iss: DEFAULT_ISSUER,
            })
            .unwrap();

        assert_eq!(
            codec.verify_access_token(&token, at(1_000)),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_configured_algorithm_and_ttl() {
        let codec = TokenCodec::new(
            TokenSettings::new(SECRET)
                .with_algorithm("HS512")
                .with_access_ttl(Duration::minutes(5)),
        )
        .unwrap();
        let token = codec.issue_access_token("user123", at(0)).unwrap();

        assert_eq!(token.expires_at, at(300));
        assert!(codec.verify_access_token(&token.token, at(299)).is_ok());
        assert_eq!(
            codec.verify_access_token(&token.token, at(300)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let result = TokenCodec::new(TokenSettings::new(SECRET).with_algorithm("ES256"));
        assert!(matches!(result, Err(JwtError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn test_issue_reset_token() {
        let codec = codec();
        let now = at(1_000);

        let first = codec.issue_reset_token("user123", now);
        let second = codec.issue_reset_token("user123", now);

        assert_eq!(first.expires_at, now + Duration::minutes(15));
        assert_ne!(first.opaque_id, second.opaque_id);
        assert!(!first.opaque_id.contains("user123"));
        assert!(!format!("{:?}", first).contains(&first.opaque_id));
    }
}
