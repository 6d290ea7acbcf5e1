//! Credential primitives library
//!
//! Pure, non-suspending building blocks for the credential service:
//! - Password hashing (Argon2id, PHC strings)
//! - Signed access tokens (JWT, HMAC family)
//! - Opaque reset identifiers
//!
//! Nothing here touches storage or the network. The service layer decides
//! where these run and what they are checked against.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &hash));
//! assert!(!hasher.verify("other_password", &hash));
//! ```
//!
//! ## Access Tokens
//! ```
//! use auth::{TokenCodec, TokenError, TokenSettings};
//! use chrono::{Duration, Utc};
//!
//! let codec = TokenCodec::new(TokenSettings::new(b"secret_key_at_least_32_bytes_long!".to_vec())).unwrap();
//! let now = Utc::now();
//!
//! let token = codec.issue_access_token("user123", now).unwrap();
//! assert_eq!(codec.verify_access_token(&token.token, now).unwrap(), "user123");
//!
//! let later = now + Duration::hours(1);
//! assert_eq!(codec.verify_access_token(&token.token, later), Err(TokenError::Expired));
//! ```
//!
//! ## Reset Identifiers
//! ```
//! use auth::{TokenCodec, TokenSettings};
//! use chrono::Utc;
//!
//! let codec = TokenCodec::new(TokenSettings::new(b"secret_key_at_least_32_bytes_long!".to_vec())).unwrap();
//! let grant = codec.issue_reset_token("user123", Utc::now());
//! assert!(!grant.opaque_id.is_empty());
//! ```

pub mod codec;
pub mod jwt;
pub mod password;
pub mod reset;

// Re-export commonly used items
pub use codec::AccessToken;
pub use codec::ResetGrant;
pub use codec::TokenCodec;
pub use codec::TokenError;
pub use codec::TokenSettings;
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtHandler;
pub use jwt::TokenType;
pub use password::PasswordError;
pub use password::PasswordHasher;
pub use reset::token_digest;
