//! Repository traits for the collaborators the magic link core depends on
//!
//! - [`AccountRepository`] resolves accounts by identity value and creates them on registration
//! - [`RedemptionRepository`] holds single-use markers and performs the atomic check-and-mark
//! - [`LinkSender`] delivers an issued token to its destination
//!
//! Storage backends expose their repositories through the `*RepositoryProvider`
//! traits and the combined [`RepositoryProvider`], which adds lifecycle methods.
//! [`memory`] contains in-process implementations of every trait.

pub mod account;
pub mod adapter;
pub mod memory;
pub mod redemption;
pub mod sender;

pub use account::AccountRepository;
pub use adapter::{AccountRepositoryAdapter, RedemptionRepositoryAdapter};
pub use redemption::{RedemptionMarker, RedemptionRepository};
pub use sender::{Destination, LinkSender};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for account repository access.
pub trait AccountRepositoryProvider: Send + Sync + 'static {
    type AccountRepo: AccountRepository;

    fn account(&self) -> &Self::AccountRepo;
}

/// Provider trait for single-use marker access.
pub trait RedemptionRepositoryProvider: Send + Sync + 'static {
    type RedemptionRepo: RedemptionRepository;

    fn redemption(&self) -> &Self::RedemptionRepo;
}

/// Provider trait that storage backends implement to supply every repository.
///
/// # Example
///
/// ```rust,ignore
/// use kagi_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl AccountRepositoryProvider for MyStorage {
///     type AccountRepo = MyAccountRepository;
///     fn account(&self) -> &Self::AccountRepo { &self.accounts }
/// }
///
/// // ... RedemptionRepositoryProvider ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: AccountRepositoryProvider + RedemptionRepositoryProvider {
    /// Create or upgrade the backing schema. Must be idempotent.
    async fn migrate(&self) -> Result<(), Error>;

    async fn health_check(&self) -> Result<(), Error>;
}
