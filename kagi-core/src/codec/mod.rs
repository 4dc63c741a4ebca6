//! Token codec capability
//!
//! The codec owns signing, encoding and raw expiry checks. kagi only relies on
//! the contract below, so any conforming implementation (signed JWT, HMAC blob,
//! database token table) can be plugged in. [`JwtTokenCodec`] is the bundled one.
pub mod jwt;

use async_trait::async_trait;
use chrono::Duration;

use crate::{
    error::CodecError,
    token::{IssuedToken, MagicLinkClaims, TokenPurpose, VerifiedToken},
};

pub use jwt::{JwtAlgorithm, JwtCodecConfig, JwtTokenCodec};

#[async_trait]
pub trait TokenCodec: Send + Sync + 'static {
    /// Sign `claims` for `purpose`, valid for `lifetime` from now.
    ///
    /// Each issued token receives a fresh unique token id.
    async fn issue(
        &self,
        claims: &MagicLinkClaims,
        purpose: TokenPurpose,
        lifetime: Duration,
    ) -> Result<IssuedToken, CodecError>;

    /// Check signature, expiry and purpose, returning the embedded claims.
    ///
    /// Returns [`CodecError::Expired`] for expired tokens,
    /// [`CodecError::PurposeMismatch`] for tokens of another purpose and
    /// [`CodecError::Invalid`] for anything malformed or tampered with.
    async fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<VerifiedToken, CodecError>;
}
