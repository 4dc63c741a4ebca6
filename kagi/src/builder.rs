//! Builder pattern for constructing Kagi instances
//!
//! This module provides a type-safe builder for creating [`Kagi`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kagi::{InMemoryLinkSender, KagiBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Strategy and signing key from KAGI_* environment variables
//!     let kagi = KagiBuilder::new()
//!         .with_sqlite("sqlite://kagi.db?mode=rwc")
//!         .await?
//!         .with_env("magic_link")?
//!         .apply_migrations(true)
//!         .build(Arc::new(InMemoryLinkSender::new()))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Duration;
use kagi_core::{
    EventHandler, IdentityField, JwtCodecConfig, JwtTokenCodec, ResourceSchema, StrategyConfig,
    error::{ConfigError, utilities::RequiredSettingExt},
    repositories::{LinkSender, RepositoryProvider, memory::InMemoryRepositoryProvider},
};

use crate::Kagi;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Kagi instance.
#[derive(Debug, thiserror::Error)]
pub enum KagiBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`KagiBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
///
/// Contains the repository provider that will be used by Kagi.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Kagi`] instances.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build
///
/// The strategy defaults to [`StrategyConfig::default`] against a resource
/// named `account` whose only unique field is `email`. A codec must be set with
/// [`KagiBuilder::with_codec`] or [`KagiBuilder::with_env`].
pub struct KagiBuilder<Storage> {
    storage: Storage,
    strategy: StrategyConfig,
    resource: ResourceSchema,
    codec: Option<JwtCodecConfig>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    apply_migrations: bool,
}

impl Default for KagiBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl KagiBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Strategy: `magic_link`, identity field `email`, 10 minute tokens, single use
    /// - Hijacking prevention: enabled
    /// - Registration: disabled
    /// - Apply migrations: false
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            strategy: StrategyConfig::default(),
            resource: ResourceSchema::new("account").unique_field("email"),
            codec: None,
            event_handlers: Vec::new(),
            apply_migrations: false,
        }
    }

    /// Use an already constructed repository provider.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> KagiBuilder<WithStorage<R>> {
        KagiBuilder {
            storage: WithStorage { repositories },
            strategy: self.strategy,
            resource: self.resource,
            codec: self.codec,
            event_handlers: self.event_handlers,
            apply_migrations: self.apply_migrations,
        }
    }

    /// Keep accounts and single-use markers in process memory.
    ///
    /// Nothing survives a restart, so use this for tests and local development.
    pub fn with_memory_storage(self) -> KagiBuilder<WithStorage<InMemoryRepositoryProvider>> {
        self.with_repositories(Arc::new(InMemoryRepositoryProvider::new()))
    }
}

#[cfg(feature = "sqlite")]
impl KagiBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<KagiBuilder<WithStorage<crate::SqliteRepositoryProvider>>, KagiBuilderError> {
        let repositories = crate::SqliteRepositoryProvider::connect(url)
            .await
            .map_err(|e| KagiBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(repositories)))
    }
}

impl<Storage> KagiBuilder<Storage> {
    /// Replace the whole strategy configuration.
    pub fn with_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.strategy = strategy;
        self
    }

    /// Describe the resource the strategy authenticates.
    ///
    /// The strategy's identity field must be a unique field of this resource.
    pub fn with_resource(mut self, resource: ResourceSchema) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_identity_field(mut self, field: IdentityField) -> Self {
        self.strategy.identity_field = field;
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.strategy.token_lifetime_secs = lifetime.num_seconds();
        self
    }

    pub fn with_registration(mut self, enabled: bool) -> Self {
        self.strategy.registration_enabled = enabled;
        self
    }

    pub fn with_codec(mut self, codec: JwtCodecConfig) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Load the strategy named `name` and the codec from `KAGI_*` environment variables.
    pub fn with_env(mut self, name: &str) -> Result<Self, KagiBuilderError> {
        self.strategy = StrategyConfig::from_env(name)?;
        self.codec = Some(JwtCodecConfig::from_env()?);
        Ok(self)
    }

    /// Register a handler on the instance's event bus.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Run the storage migrations during [`KagiBuilder::build`].
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }
}

impl<R: RepositoryProvider> KagiBuilder<WithStorage<R>> {
    /// Validate the configuration and build the [`Kagi`] instance.
    ///
    /// # Errors
    ///
    /// - [`KagiBuilderError::InvalidConfiguration`] when no codec was set, the
    ///   codec keys are unusable, or the strategy fails validation
    /// - [`KagiBuilderError::Migration`] when migrations were requested and failed
    pub async fn build<S: LinkSender>(
        self,
        sender: Arc<S>,
    ) -> Result<Kagi<R, S>, KagiBuilderError> {
        let codec = JwtTokenCodec::new(self.codec.require_setting("token codec")?)?;
        let strategy = self.strategy.validate(&self.resource)?;

        let repositories = self.storage.repositories;
        if self.apply_migrations {
            repositories
                .migrate()
                .await
                .map_err(|e| KagiBuilderError::Migration(e.to_string()))?;
        }

        let kagi = Kagi::new(repositories, strategy, codec, sender);
        for handler in self.event_handlers {
            kagi.events().register(handler).await;
        }

        tracing::debug!(
            strategy = %kagi.strategy().name(),
            resource = %kagi.strategy().resource(),
            "Built kagi instance"
        );

        Ok(kagi)
    }
}
