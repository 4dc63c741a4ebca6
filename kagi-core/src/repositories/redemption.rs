use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Durable record that a token has been redeemed
///
/// Keyed by the SHA-256 of the token id, never the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionMarker {
    pub token_hash: String,
    pub redeemed_at: DateTime<Utc>,
    /// Expiry of the token; the marker is useless after this
    pub expires_at: DateTime<Utc>,
}

/// Store of single-use markers
#[async_trait]
pub trait RedemptionRepository: Send + Sync + 'static {
    /// Atomically record `token_hash` as redeemed.
    ///
    /// Returns `true` when this call placed the marker and `false` when one
    /// already existed. Concurrent calls for the same hash must see exactly one
    /// `true`; a read-then-write implementation does not satisfy this.
    async fn mark_redeemed(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn find_marker(&self, token_hash: &str) -> Result<Option<RedemptionMarker>, Error>;

    /// Remove markers whose token expired strictly before `before`, returning
    /// how many were removed.
    ///
    /// A token is still accepted at the instant of its expiry, so a marker
    /// with `expires_at == before` must be kept.
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
