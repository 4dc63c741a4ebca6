//! JWT token codec
//!
//! Magic link tokens are compact JWTs signed with HS256 or RS256. The payload
//! carries the [`MagicLinkClaims`] flattened next to the registered claims:
//!
//! ```json
//! {
//!   "jti": "mlt_...",
//!   "iss": "kagi",
//!   "iat": 1700000000,
//!   "exp": 1700000601,
//!   "iat_ms": 1700000000250,
//!   "exp_ms": 1700000600250,
//!   "purpose": "magic_link",
//!   "action": "sign_in_with_magic_link",
//!   "identity": "alice@example.com",
//!   "account_id": "acct_..."
//! }
//! ```
//!
//! `iat_ms` and `exp_ms` carry the issue and expiry instants in milliseconds.
//! `exp` is rounded up to the next second so that jsonwebtoken's whole-second
//! check never refuses a token that `exp_ms` still allows, and verification
//! then refuses any token whose `exp_ms` has passed. There is no leeway.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CodecError, ConfigError},
    id::{TOKEN_PREFIX, generate_prefixed_id},
    token::{IssuedToken, MagicLinkClaims, TokenPurpose, VerifiedToken},
};

use super::TokenCodec;

/// Shortest accepted HS256 secret, in bytes
pub const MIN_HS256_SECRET_LEN: usize = 32;

const SECRET_ENV: &str = "KAGI_TOKEN_SECRET";
const ISSUER_ENV: &str = "KAGI_TOKEN_ISSUER";

/// JWT algorithm and key material
#[derive(Clone)]
pub enum JwtAlgorithm {
    /// RS256 - RSA with SHA-256
    RS256 {
        /// Private key for signing (PEM). Empty for a verify-only codec.
        private_key: Vec<u8>,
        /// Public key for verifying (PEM)
        public_key: Vec<u8>,
    },
    /// HS256 - HMAC with SHA-256
    HS256 {
        /// Secret key for both signing and verifying
        secret_key: Vec<u8>,
    },
}

impl std::fmt::Debug for JwtAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtAlgorithm::RS256 { .. } => f.write_str("RS256"),
            JwtAlgorithm::HS256 { .. } => f.write_str("HS256"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtCodecConfig {
    pub algorithm: JwtAlgorithm,
    /// Issuer claim, checked on verification when set
    pub issuer: Option<String>,
}

impl JwtCodecConfig {
    pub fn new_rs256(private_key: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::RS256 {
                private_key,
                public_key,
            },
            issuer: None,
        }
    }

    pub fn new_hs256(secret_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::HS256 { secret_key },
            issuer: None,
        }
    }

    /// Read an HS256 secret from `KAGI_TOKEN_SECRET` and an optional issuer
    /// from `KAGI_TOKEN_ISSUER`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`JwtCodecConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(SECRET_ENV)
            .ok_or_else(|| ConfigError::MissingField(SECRET_ENV.to_string()))?;

        let config = Self::new_hs256(secret.into_bytes());
        Ok(match lookup(ISSUER_ENV) {
            Some(issuer) => config.with_issuer(issuer),
            None => config,
        })
    }

    /// Create a configuration with a random HS256 secret
    ///
    /// Tokens do not survive a restart; useful for tests and single-process setups.
    pub fn new_random_hs256() -> Self {
        use rand::RngCore;

        let mut secret_key = vec![0u8; MIN_HS256_SECRET_LEN];
        rand::rng().fill_bytes(&mut secret_key);
        Self::new_hs256(secret_key)
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn jwt_algorithm(&self) -> Algorithm {
        match &self.algorithm {
            JwtAlgorithm::RS256 { .. } => Algorithm::RS256,
            JwtAlgorithm::HS256 { .. } => Algorithm::HS256,
        }
    }

    fn keys(&self) -> Result<(Option<EncodingKey>, DecodingKey), ConfigError> {
        let invalid_key = |message: String| ConfigError::InvalidValue {
            key: "jwt_key".to_string(),
            message,
        };

        match &self.algorithm {
            JwtAlgorithm::HS256 { secret_key } => {
                if secret_key.len() < MIN_HS256_SECRET_LEN {
                    return Err(invalid_key(format!(
                        "HS256 secret must be at least {MIN_HS256_SECRET_LEN} bytes"
                    )));
                }
                Ok((
                    Some(EncodingKey::from_secret(secret_key)),
                    DecodingKey::from_secret(secret_key),
                ))
            }
            JwtAlgorithm::RS256 {
                private_key,
                public_key,
            } => {
                let encoding = if private_key.is_empty() {
                    None
                } else {
                    Some(
                        EncodingKey::from_rsa_pem(private_key)
                            .map_err(|e| invalid_key(format!("Invalid RSA private key: {e}")))?,
                    )
                };
                let decoding = DecodingKey::from_rsa_pem(public_key)
                    .map_err(|e| invalid_key(format!("Invalid RSA public key: {e}")))?;
                Ok((encoding, decoding))
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtPayload {
    jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    iat: i64,
    exp: i64,
    iat_ms: i64,
    exp_ms: i64,
    purpose: TokenPurpose,
    #[serde(flatten)]
    claims: MagicLinkClaims,
}

/// [`TokenCodec`] backed by `jsonwebtoken`
///
/// Keys are parsed once at construction.
pub struct JwtTokenCodec {
    algorithm: Algorithm,
    issuer: Option<String>,
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
}

impl JwtTokenCodec {
    pub fn new(config: JwtCodecConfig) -> Result<Self, ConfigError> {
        let (encoding_key, decoding_key) = config.keys()?;

        Ok(Self {
            algorithm: config.jwt_algorithm(),
            issuer: config.issuer,
            encoding_key,
            decoding_key,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

#[async_trait]
impl TokenCodec for JwtTokenCodec {
    async fn issue(
        &self,
        claims: &MagicLinkClaims,
        purpose: TokenPurpose,
        lifetime: Duration,
    ) -> Result<IssuedToken, CodecError> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| CodecError::Signing("No signing key configured".to_string()))?;

        let now = Utc::now();
        let issued_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .and_then(|at| DateTime::from_timestamp_millis(at.timestamp_millis()))
            .ok_or_else(|| {
                CodecError::Signing(format!("Token lifetime {lifetime} is out of range"))
            })?;

        let payload = JwtPayload {
            jti: generate_prefixed_id(TOKEN_PREFIX),
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: ceil_seconds(expires_at),
            iat_ms: issued_at.timestamp_millis(),
            exp_ms: expires_at.timestamp_millis(),
            purpose,
            claims: claims.clone(),
        };

        let token = encode(&Header::new(self.algorithm), &payload, encoding_key)
            .map_err(|e| CodecError::Signing(format!("Failed to encode JWT: {e}")))?;

        Ok(IssuedToken {
            token,
            token_id: payload.jti,
            issued_at,
            expires_at,
        })
    }

    async fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<VerifiedToken, CodecError> {
        let data = decode::<JwtPayload>(token, &self.decoding_key, &self.validation()).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => CodecError::Expired,
                _ => CodecError::Invalid(format!("JWT validation failed: {e}")),
            },
        )?;
        let payload = data.claims;

        if payload.purpose != purpose {
            return Err(CodecError::PurposeMismatch {
                expected: purpose.to_string(),
                actual: payload.purpose.to_string(),
            });
        }

        let timestamp = |millis: i64, claim: &str| {
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| CodecError::Invalid(format!("Claim '{claim}' is out of range")))
        };
        let issued_at = timestamp(payload.iat_ms, "iat_ms")?;
        let expires_at = timestamp(payload.exp_ms, "exp_ms")?;

        if Utc::now() > expires_at {
            return Err(CodecError::Expired);
        }

        Ok(VerifiedToken {
            claims: payload.claims,
            purpose: payload.purpose,
            token_id: payload.jti,
            issued_at,
            expires_at,
        })
    }
}

fn ceil_seconds(at: DateTime<Utc>) -> i64 {
    if at.timestamp_subsec_millis() > 0 {
        at.timestamp() + 1
    } else {
        at.timestamp()
    }
}
