//! Magic link claims and token values
//!
//! A magic link token is produced by a [`TokenCodec`](crate::codec::TokenCodec)
//! and is never persisted by kagi. It carries:
//!
//! | Claim        | Description                                                       |
//! | ------------ | ----------------------------------------------------------------- |
//! | `action`     | The sign-in action name the token may be redeemed for             |
//! | `identity`   | The identity field value, stringified                             |
//! | `account_id` | The account the token was issued for, absent for bare identities  |
//!
//! Purpose, token id, issue and expiry times are added by the codec.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{account::AccountId, crypto::token_fingerprint};

/// Category a token was issued for
///
/// A codec may issue tokens for several purposes. A token only verifies for the
/// purpose it was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    MagicLink,
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::MagicLink => "magic_link",
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a token was issued to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSubject {
    /// An account that existed at issuance
    Account(AccountId),
    /// A bare identity value with no account behind it at issuance
    Identity(String),
}

/// The claim set of a magic link token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkClaims {
    pub action: String,

    pub identity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

impl MagicLinkClaims {
    pub fn for_account(
        action: impl Into<String>,
        identity: impl Into<String>,
        account_id: AccountId,
    ) -> Self {
        Self {
            action: action.into(),
            identity: identity.into(),
            account_id: Some(account_id),
        }
    }

    pub fn for_identity(action: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            identity: identity.into(),
            account_id: None,
        }
    }

    pub fn subject(&self) -> TokenSubject {
        match &self.account_id {
            Some(account_id) => TokenSubject::Account(account_id.clone()),
            None => TokenSubject::Identity(self.identity.clone()),
        }
    }
}

/// A freshly issued token, ready to be delivered
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// The encoded token handed to the user
    pub token: String,
    /// Unique id of the token, the key for single-use markers
    pub token_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_inner(self) -> String {
        self.token
    }

    /// Short loggable identifier for this token
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.token)
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &format_args!("<{}>", self.fingerprint()))
            .field("token_id", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The result of a successful codec verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub claims: MagicLinkClaims,
    pub purpose: TokenPurpose,
    pub token_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Caller-supplied context passed through to the link sender and logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
