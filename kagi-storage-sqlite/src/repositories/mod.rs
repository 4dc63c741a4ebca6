//! Repository implementations for SQLite storage

pub mod account;
pub mod redemption;

pub use account::SqliteAccountRepository;
pub use redemption::SqliteRedemptionRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kagi_core::{
    Error,
    error::StorageError,
    map_storage_err,
    repositories::{AccountRepositoryProvider, RedemptionRepositoryProvider, RepositoryProvider},
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;

use crate::migrations::SqliteMigrationManager;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Repository provider implementation for SQLite
///
/// This struct implements the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    account: Arc<SqliteAccountRepository>,
    redemption: Arc<SqliteRedemptionRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let account = Arc::new(SqliteAccountRepository::new(pool.clone()));
        let redemption = Arc::new(SqliteRedemptionRepository::new(pool.clone()));

        Self {
            pool,
            account,
            redemption,
        }
    }

    /// Open a pool for `database_url`.
    ///
    /// Every connection to `sqlite::memory:` gets its own database, so
    /// in-memory URLs use one connection that is never recycled.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let mut options = SqlitePoolOptions::new().max_connections(DEFAULT_MAX_CONNECTIONS);
        if database_url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options.connect(database_url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            Error::Storage(StorageError::Connection(e.to_string()))
        })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl AccountRepositoryProvider for SqliteRepositoryProvider {
    type AccountRepo = SqliteAccountRepository;

    fn account(&self) -> &Self::AccountRepo {
        &self.account
    }
}

impl RedemptionRepositoryProvider for SqliteRepositoryProvider {
    type RedemptionRepo = SqliteRedemptionRepository;

    fn redemption(&self) -> &Self::RedemptionRepo {
        &self.redemption
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
        })?;

        manager
            .up(&SqliteMigrationManager::migrations())
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
            })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        map_storage_err!(sqlx::query("SELECT 1").execute(&self.pool).await)?;
        Ok(())
    }
}

/// Convert a stored unix timestamp in milliseconds back into a `DateTime`
pub(crate) fn from_timestamp(millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        Error::Storage(StorageError::Database(format!(
            "Invalid timestamp in database: {millis}"
        )))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn setup_provider() -> SqliteRepositoryProvider {
        let _ = tracing_subscriber::fmt().try_init();

        let provider = SqliteRepositoryProvider::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        provider.migrate().await.expect("Failed to run migrations");
        provider
    }

    #[tokio::test]
    async fn test_health_check() {
        let provider = setup_provider().await;
        provider.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_twice() {
        let provider = setup_provider().await;
        provider.migrate().await.unwrap();
    }

    #[test]
    fn test_from_timestamp() {
        assert_eq!(from_timestamp(0).unwrap(), DateTime::UNIX_EPOCH);
        assert_eq!(
            from_timestamp(1_700_000_000_123).unwrap().timestamp_subsec_millis(),
            123
        );
        assert!(matches!(
            from_timestamp(i64::MAX),
            Err(Error::Storage(StorageError::Database(_)))
        ));
    }
}
