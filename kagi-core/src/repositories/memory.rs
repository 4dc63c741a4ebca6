//! In-process repository implementations
//!
//! Backed by [`DashMap`], so they are safe to share across tasks. Single-use
//! markers use the map's entry API, which makes check-and-mark atomic per key.
//! Nothing survives a restart.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    Error,
    account::{Account, AccountId, NewAccount},
    error::{StorageError, ValidationError},
    identity::IdentityField,
    repositories::{
        AccountRepository, AccountRepositoryProvider, Destination, LinkSender, RedemptionMarker,
        RedemptionRepository, RedemptionRepositoryProvider, RepositoryProvider,
    },
    token::{IssuedToken, RequestContext},
};

type IdentityKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountRepository {
    accounts: Arc<DashMap<AccountId, Account>>,
    identities: Arc<DashMap<IdentityKey, AccountId>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fully built account, indexing it under `field`.
    ///
    /// Fails when the account has no value for `field` or when the value is taken.
    pub fn insert(&self, account: Account, field: &IdentityField) -> Result<Account, Error> {
        let value = account.identity(field).ok_or_else(|| {
            ValidationError::MissingField(format!("Account has no '{}' value", field.name))
        })?;

        match self.identities.entry((field.name.clone(), field.key(value))) {
            Entry::Occupied(_) => Err(StorageError::Constraint(format!(
                "An account with this {} already exists",
                field.name
            ))
            .into()),
            Entry::Vacant(slot) => {
                self.accounts.insert(account.id.clone(), account.clone());
                slot.insert(account.id.clone());
                Ok(account)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_identity(
        &self,
        field: &IdentityField,
        value: &str,
    ) -> Result<Option<Account>, Error> {
        let id = match self.identities.get(&(field.name.clone(), field.key(value))) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };

        Ok(self.accounts.get(&id).map(|account| account.clone()))
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        Ok(self.accounts.get(id).map(|account| account.clone()))
    }

    async fn create(&self, field: &IdentityField, account: NewAccount) -> Result<Account, Error> {
        self.insert(account.into_account(Utc::now())?, field)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRedemptionRepository {
    markers: Arc<DashMap<String, RedemptionMarker>>,
}

impl InMemoryRedemptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[async_trait]
impl RedemptionRepository for InMemoryRedemptionRepository {
    async fn mark_redeemed(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        match self.markers.entry(token_hash.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(RedemptionMarker {
                    token_hash: token_hash.to_string(),
                    redeemed_at: Utc::now(),
                    expires_at,
                });
                Ok(true)
            }
        }
    }

    async fn find_marker(&self, token_hash: &str) -> Result<Option<RedemptionMarker>, Error> {
        Ok(self.markers.get(token_hash).map(|marker| marker.clone()))
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut removed = 0u64;
        self.markers.retain(|_, marker| {
            let keep = marker.expires_at >= before;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

/// Both in-memory repositories behind a single [`RepositoryProvider`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepositoryProvider {
    accounts: InMemoryAccountRepository,
    redemptions: InMemoryRedemptionRepository,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountRepositoryProvider for InMemoryRepositoryProvider {
    type AccountRepo = InMemoryAccountRepository;

    fn account(&self) -> &Self::AccountRepo {
        &self.accounts
    }
}

impl RedemptionRepositoryProvider for InMemoryRepositoryProvider {
    type RedemptionRepo = InMemoryRedemptionRepository;

    fn redemption(&self) -> &Self::RedemptionRepo {
        &self.redemptions
    }
}

#[async_trait]
impl RepositoryProvider for InMemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// A link delivered by [`InMemoryLinkSender`]
#[derive(Debug, Clone)]
pub struct SentLink {
    pub destination: Destination,
    pub token: IssuedToken,
    pub context: RequestContext,
}

/// [`LinkSender`] that keeps every delivered link in an outbox
///
/// Useful in tests and local development in place of a mailer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLinkSender {
    outbox: Arc<Mutex<Vec<SentLink>>>,
}

impl InMemoryLinkSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every link sent so far, oldest first
    pub fn sent(&self) -> Vec<SentLink> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<SentLink> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl LinkSender for InMemoryLinkSender {
    async fn send(
        &self,
        destination: &Destination,
        token: &IssuedToken,
        context: &RequestContext,
    ) -> Result<(), Error> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentLink {
                destination: destination.clone(),
                token: token.clone(),
                context: context.clone(),
            });
        Ok(())
    }
}
