//! Prefixed identifier generation
//!
//! Account ids and token ids are generated as `{prefix}_{random}` where the
//! random part carries at least 96 bits of entropy, base64 URL-safe encoded.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::RngCore;

/// Prefix used for account identifiers
pub const ACCOUNT_PREFIX: &str = "acct";

/// Prefix used for magic link token identifiers (`jti`)
pub const TOKEN_PREFIX: &str = "mlt";

const MIN_ENTROPY_BYTES: usize = 12;

/// Generate a prefixed ID with 96 bits of entropy
///
/// # Example
/// ```
/// use kagi_core::id::generate_prefixed_id;
///
/// let account_id = generate_prefixed_id("acct");
/// assert!(account_id.starts_with("acct_"));
/// ```
pub fn generate_prefixed_id(prefix: &str) -> String {
    generate_prefixed_id_with_bytes(prefix, MIN_ENTROPY_BYTES)
}

/// Generate a prefixed ID with `bytes` random bytes, never fewer than 12
pub fn generate_prefixed_id_with_bytes(prefix: &str, bytes: usize) -> String {
    let mut random_bytes = vec![0u8; bytes.max(MIN_ENTROPY_BYTES)];
    rand::rng().fill_bytes(&mut random_bytes);

    let encoded = BASE64_URL_SAFE_NO_PAD.encode(random_bytes);

    format!("{prefix}_{encoded}")
}

/// Validate that a prefixed ID has the expected format
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= MIN_ENTROPY_BYTES,
        Err(_) => false,
    }
}
