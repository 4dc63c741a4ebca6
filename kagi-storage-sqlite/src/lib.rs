//! SQLite storage backend for kagi
//!
//! Provides [`SqliteRepositoryProvider`], which implements the account and
//! single-use marker repositories on top of a [`sqlx::SqlitePool`].
//!
//! ```rust,ignore
//! use kagi_core::repositories::RepositoryProvider;
//! use kagi_storage_sqlite::SqliteRepositoryProvider;
//!
//! let provider = SqliteRepositoryProvider::connect("sqlite://kagi.db?mode=rwc").await?;
//! provider.migrate().await?;
//! ```

pub mod migrations;
pub mod repositories;

pub use migrations::{SqliteMigration, SqliteMigrationManager};
pub use repositories::{
    SqliteAccountRepository, SqliteRedemptionRepository, SqliteRepositoryProvider,
};
