//! Accounts
//!
//! An account is the resource a magic link ultimately authenticates. The core
//! only needs its stable id, its creation time and the value of its identity
//! field(s); everything else about the account lives with the application.
//!
//! | Field        | Type                       | Description                                      |
//! | ------------ | -------------------------- | ------------------------------------------------ |
//! | `id`         | `AccountId`                | The unique identifier for the account.           |
//! | `fields`     | `BTreeMap<String, String>` | Identity field values keyed by field name.       |
//! | `created_at` | `DateTime`                 | The timestamp when the account was created.      |
//! | `updated_at` | `DateTime`                 | The timestamp when the account was last updated. |
//! | `registration_token` | `Option<String>`   | Hash of the token id whose redemption created it. |
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ValidationError,
    id::{ACCOUNT_PREFIX, generate_prefixed_id, validate_prefixed_id},
    identity::IdentityField,
};

/// A unique, stable identifier for an account
///
/// Treat this value as opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: &str) -> Self {
        AccountId(id.to_string())
    }

    pub fn new_random() -> Self {
        AccountId(generate_prefixed_id(ACCOUNT_PREFIX))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate that this ID was generated by [`AccountId::new_random`]
    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, ACCOUNT_PREFIX)
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    pub fields: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// SHA-256 of the id of the magic link token that registered this account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_token: Option<String>,
}

impl Account {
    pub fn builder() -> AccountBuilder {
        AccountBuilder::default()
    }

    /// Raw value of the named field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Value of the given identity field
    pub fn identity(&self, field: &IdentityField) -> Option<&str> {
        self.field(&field.name)
    }
}

#[derive(Default)]
pub struct AccountBuilder {
    id: Option<AccountId>,
    fields: BTreeMap<String, String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    registration_token: Option<String>,
}

impl AccountBuilder {
    pub fn id(mut self, id: AccountId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn registration_token(mut self, token_hash: impl Into<String>) -> Self {
        self.registration_token = Some(token_hash.into());
        self
    }

    pub fn build(self) -> Result<Account, Error> {
        if self.fields.is_empty() {
            return Err(ValidationError::MissingField(
                "At least one identity field is required".to_string(),
            )
            .into());
        }

        let now = Utc::now();
        let created_at = self.created_at.unwrap_or(now);
        Ok(Account {
            id: self.id.unwrap_or_default(),
            fields: self.fields,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            registration_token: self.registration_token,
        })
    }
}

/// An account about to be created through a magic link registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub id: AccountId,
    pub identity_field: String,
    pub identity: String,
    /// Hash of the token id being redeemed, when a magic link creates the account
    pub registration_token: Option<String>,
}

impl NewAccount {
    pub fn new(field: &IdentityField, identity: impl Into<String>) -> Self {
        Self {
            id: AccountId::new_random(),
            identity_field: field.name.clone(),
            identity: identity.into(),
            registration_token: None,
        }
    }

    pub fn with_registration_token(mut self, token_hash: impl Into<String>) -> Self {
        self.registration_token = Some(token_hash.into());
        self
    }

    /// Build the account as it is stored at `created_at`
    pub fn into_account(self, created_at: DateTime<Utc>) -> Result<Account, Error> {
        let builder = Account::builder()
            .id(self.id)
            .field(self.identity_field, self.identity)
            .created_at(created_at);

        match self.registration_token {
            Some(token_hash) => builder.registration_token(token_hash).build(),
            None => builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id() {
        let account_id = AccountId::new("test");
        assert_eq!(account_id.as_str(), "test");
        assert_eq!(AccountId::from(account_id.as_str()), account_id);
        assert!(!account_id.is_valid());

        let random = AccountId::new_random();
        assert!(random.as_str().starts_with("acct_"));
        assert!(random.is_valid());
        assert_ne!(random, AccountId::new_random());
    }

    #[test]
    fn test_account_builder() {
        let account = Account::builder()
            .field("email", "alice@example.com")
            .build()
            .unwrap();

        assert!(account.id.is_valid());
        assert_eq!(account.field("email"), Some("alice@example.com"));
        assert_eq!(
            account.identity(&IdentityField::email()),
            Some("alice@example.com")
        );
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn test_account_builder_requires_identity() {
        let result = Account::builder().build();
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MissingField(_)))
        ));
    }

    #[test]
    fn test_new_account() {
        let new_account = NewAccount::new(&IdentityField::email(), "bob@example.com");
        assert_eq!(new_account.identity_field, "email");
        assert_eq!(new_account.identity, "bob@example.com");
        assert!(new_account.id.is_valid());
        assert_eq!(new_account.registration_token, None);
    }

    #[test]
    fn test_new_account_into_account() {
        let now = Utc::now();
        let new_account =
            NewAccount::new(&IdentityField::email(), "bob@example.com").with_registration_token("abc");
        let id = new_account.id.clone();

        let account = new_account.into_account(now).unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.field("email"), Some("bob@example.com"));
        assert_eq!(account.created_at, now);
        assert_eq!(account.registration_token.as_deref(), Some("abc"));
    }
}
