use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    account::{Account, AccountId, NewAccount},
    identity::IdentityField,
    repositories::{AccountRepository, RedemptionMarker, RedemptionRepository, RepositoryProvider},
};

/// Adapter that exposes a provider's account repository as an [`AccountRepository`]
pub struct AccountRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AccountRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AccountRepository for AccountRepositoryAdapter<R> {
    async fn find_by_identity(
        &self,
        field: &IdentityField,
        value: &str,
    ) -> Result<Option<Account>, Error> {
        self.provider.account().find_by_identity(field, value).await
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        self.provider.account().find_by_id(id).await
    }

    async fn create(&self, field: &IdentityField, account: NewAccount) -> Result<Account, Error> {
        self.provider.account().create(field, account).await
    }
}

/// Adapter that exposes a provider's marker store as a [`RedemptionRepository`]
pub struct RedemptionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> RedemptionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> RedemptionRepository for RedemptionRepositoryAdapter<R> {
    async fn mark_redeemed(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider
            .redemption()
            .mark_redeemed(token_hash, expires_at)
            .await
    }

    async fn find_marker(&self, token_hash: &str) -> Result<Option<RedemptionMarker>, Error> {
        self.provider.redemption().find_marker(token_hash).await
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.redemption().cleanup_expired(before).await
    }
}
