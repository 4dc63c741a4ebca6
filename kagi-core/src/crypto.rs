//! Token hashing helpers
//!
//! Raw tokens and token ids are never stored or logged. Single-use markers are
//! keyed by the SHA-256 of the token id, and log lines carry a short
//! fingerprint derived the same way.

use sha2::{Digest, Sha256};

const FINGERPRINT_LEN: usize = 12;

/// Hash a token (or token id) for storage using SHA-256, hex encoded.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, non-reversible identifier for a token, safe to put in logs and events.
pub fn token_fingerprint(token: &str) -> String {
    let mut hash = hash_token(token);
    hash.truncate(FINGERPRINT_LEN);
    hash
}
