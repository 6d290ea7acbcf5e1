use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Kind of token a set of claims was minted for.
///
/// Carried in the `typ` claim so a token minted for one purpose cannot be
/// replayed where another is expected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
}

/// Claims embedded in a signed access token.
///
/// Standard RFC 7519 fields plus the `typ` tag. Timestamps are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issuer
    pub iss: String,

    /// Token type tag
    pub typ: TokenType,
}

impl Claims {
    /// Create access-token claims valid for `ttl` from `issued_at`.
    ///
    /// # Arguments
    /// * `subject` - Unique user identifier
    /// * `issuer` - Issuer name written into `iss`
    /// * `issued_at` - Issue instant
    /// * `ttl` - Lifetime of the token
    pub fn access(
        subject: impl ToString,
        issuer: impl ToString,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            iss: issuer.to_string(),
            typ: TokenType::Access,
        }
    }

    /// Check if the token is expired at `now`.
    ///
    /// The expiry instant itself already counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Expiry as a timestamp, if it is representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn test_access_claims() {
        let claims = Claims::access("user123", "credential-service", at(1_000), Duration::minutes(30));

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.iss, "credential-service");
        assert_eq!(claims.typ, TokenType::Access);
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_is_expired() {
        let claims = Claims::access("user123", "test", at(0), Duration::seconds(1_000));

        assert!(!claims.is_expired(at(999)));
        assert!(claims.is_expired(at(1_000))); // Exactly at expiration
        assert!(claims.is_expired(at(1_001)));
    }

    #[test]
    fn test_token_type_wire_name() {
        let claims = Claims::access("user123", "test", at(0), Duration::seconds(60));
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["typ"], "access");
    }
}
