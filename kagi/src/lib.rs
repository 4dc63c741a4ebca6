//! # Kagi
//!
//! Kagi adds passwordless "magic link" sign-in to Rust applications. A user
//! asks for a link, kagi issues a short-lived signed token and hands it to your
//! [`LinkSender`], and when the link comes back kagi verifies it, enforces
//! single use, resolves (or registers) the account and refuses tokens that
//! could be used to take over an account created after the link was issued.
//!
//! Every rejected link looks the same to the end user: see
//! [`Error::public_message`]. The precise [`Rejection`] reason is kept for
//! logging and telemetry.
//!
//! ## Storage Support
//!
//! - In-memory ([`InMemoryRepositoryProvider`])
//! - SQLite (feature `sqlite`, enabled by default)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kagi::{InMemoryLinkSender, JwtCodecConfig, KagiBuilder, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sender = Arc::new(InMemoryLinkSender::new());
//!     let kagi = KagiBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_codec(JwtCodecConfig::new_random_hs256())
//!         .apply_migrations(true)
//!         .build(sender.clone())
//!         .await?;
//!
//!     let context = RequestContext::new();
//!     kagi.request_magic_link("alice@example.com", &context).await?;
//!
//!     let link = sender.last().expect("a link was sent");
//!     let redemption = kagi.sign_in_with_magic_link(link.token.as_str(), &context).await?;
//!     println!("signed in as {}", redemption.account.id);
//!
//!     Ok(())
//! }
//! ```
mod builder;

use std::sync::Arc;

use kagi_core::repositories::{
    AccountRepository, AccountRepositoryAdapter, AccountRepositoryProvider,
    RedemptionRepositoryAdapter,
};

pub use builder::{KagiBuilder, KagiBuilderError, NoStorage, WithStorage};

/// Re-export core types from kagi_core
///
/// These types are commonly used when working with the Kagi API.
pub use kagi_core::{
    Account, AccountId, Error, Event, EventBus, EventHandler, IdentityComparison, IdentityField,
    IdentityKind, IssuedToken, JwtCodecConfig, JwtTokenCodec, MagicLinkService, Redemption,
    Rejection, RequestContext, RequestOutcome, ResourceSchema, Strategy, StrategyConfig,
    TokenCodec,
    codec::JwtAlgorithm,
    repositories::{
        Destination, LinkSender, RepositoryProvider,
        memory::{InMemoryLinkSender, InMemoryRepositoryProvider, SentLink},
    },
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use kagi_storage_sqlite::SqliteRepositoryProvider;

/// The magic link service wired to a repository provider's adapters
pub type KagiService<R, S> =
    MagicLinkService<AccountRepositoryAdapter<R>, RedemptionRepositoryAdapter<R>, JwtTokenCodec, S>;

/// Main entry point for magic link sign-in
///
/// Build one with [`KagiBuilder`] or [`Kagi::new`] and share it across request
/// handlers; every method takes `&self`.
pub struct Kagi<R: RepositoryProvider, S: LinkSender> {
    repositories: Arc<R>,
    service: Arc<KagiService<R, S>>,
}

impl<R: RepositoryProvider, S: LinkSender> Kagi<R, S> {
    /// Create a new Kagi instance from already validated parts
    ///
    /// # Arguments
    ///
    /// * `repositories` - The repository provider implementation
    /// * `strategy` - A strategy produced by [`StrategyConfig::validate`]
    /// * `codec` - The token codec used to sign and verify links
    /// * `sender` - Delivers issued links to users
    pub fn new(
        repositories: Arc<R>,
        strategy: Strategy,
        codec: JwtTokenCodec,
        sender: Arc<S>,
    ) -> Self {
        let service = MagicLinkService::new(
            Arc::new(strategy),
            Arc::new(codec),
            Arc::new(AccountRepositoryAdapter::new(repositories.clone())),
            Arc::new(RedemptionRepositoryAdapter::new(repositories.clone())),
            sender,
        );

        Self {
            repositories,
            service: Arc::new(service),
        }
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    pub fn strategy(&self) -> &Strategy {
        self.service.strategy()
    }

    /// Event bus for telemetry; register handlers with [`EventBus::register`]
    pub fn events(&self) -> &EventBus {
        self.service.events()
    }

    /// The underlying service, for callers that need the issuer or engine directly
    pub fn service(&self) -> &KagiService<R, S> {
        &self.service
    }

    /// Get an account by its ID
    pub async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>, Error> {
        self.repositories.account().find_by_id(account_id).await
    }
}

impl<R: RepositoryProvider, S: LinkSender> Kagi<R, S> {
    /// Issue a link for `identity` and hand it to the sender
    ///
    /// Returns [`RequestOutcome::Suppressed`] without sending anything when the
    /// identity is unknown and registration is disabled. Respond to the user
    /// the same way in both cases.
    pub async fn request_magic_link(
        &self,
        identity: &str,
        context: &RequestContext,
    ) -> Result<RequestOutcome, Error> {
        self.service.request(identity, context).await
    }

    /// Redeem a magic link token
    ///
    /// # Returns
    ///
    /// The signed-in account and whether it was registered by this redemption
    pub async fn sign_in_with_magic_link(
        &self,
        token: &str,
        context: &RequestContext,
    ) -> Result<Redemption, Error> {
        self.service.sign_in(token, context).await
    }

    /// Issue a token bound to an existing account without sending it
    pub async fn issue_for_account(
        &self,
        account: &Account,
        context: &RequestContext,
    ) -> Result<IssuedToken, Error> {
        self.service.issuer().issue_for_account(account, context).await
    }

    /// Issue a token for a bare identity value without sending it
    pub async fn issue_for_identity(
        &self,
        identity: &str,
        context: &RequestContext,
    ) -> Result<IssuedToken, Error> {
        self.service.issuer().issue_for_identity(identity, context).await
    }

    /// Build the URL a user follows to sign in
    pub fn magic_link_url(&self, base_url: &str, token: &IssuedToken) -> String {
        self.service.magic_link_url(base_url, token)
    }

    /// Remove single-use markers whose tokens have expired
    pub async fn cleanup_expired_markers(&self) -> Result<u64, Error> {
        self.service.cleanup_expired_markers().await
    }
}
