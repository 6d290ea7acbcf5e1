use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

/// Entropy per reset identifier: 32 bytes = 256 bits.
pub const RESET_TOKEN_BYTES: usize = 32;

/// Generate an opaque, URL-safe reset identifier.
///
/// Pure randomness from the OS generator, base64url without padding. It has
/// no internal structure; the store maps it to its owner.
pub fn generate_opaque_token() -> String {
    let mut buffer = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

/// SHA-256 of a reset identifier.
///
/// Stores key reset tokens by this digest; the raw identifier only ever
/// travels to the account owner.
pub fn token_digest(opaque_id: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(opaque_id.as_bytes());
    hasher.finalize().to_vec()
}
