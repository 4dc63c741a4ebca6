//! Versioned schema migrations
//!
//! Each migration runs inside its own transaction together with the insert
//! into `kagi_migrations`, so a version is recorded only when its statements
//! succeeded.

use async_trait::async_trait;
use chrono::Utc;
use kagi_core::{Error, error::utilities::DatabaseResultExt};
use sqlx::{SqliteConnection, SqlitePool};

const MIGRATION_TABLE: &str = "kagi_migrations";

#[async_trait]
pub trait SqliteMigration: Send + Sync {
    fn version(&self) -> i64;

    fn name(&self) -> &str;

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every migration kagi ships, in version order
    pub fn migrations() -> Vec<Box<dyn SqliteMigration>> {
        vec![
            Box::new(CreateAccountsTable),
            Box::new(CreateRedemptionsTable),
            Box::new(CreateRedemptionExpiryIndex),
        ]
    }

    pub async fn initialize(&self) -> Result<(), Error> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            );"#
        ))
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to initialize migrations")?;

        Ok(())
    }

    pub async fn up(&self, migrations: &[Box<dyn SqliteMigration>]) -> Result<(), Error> {
        for migration in migrations {
            if self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await.map_db_err()?;

            tracing::info!(
                "Applying migration {} ({})",
                migration.name(),
                migration.version()
            );

            migration
                .up(&mut *tx)
                .await
                .map_db_err_with_context(migration.name())?;

            sqlx::query(&format!(
                "INSERT INTO {MIGRATION_TABLE} (version, name, applied_at) VALUES (?1, ?2, ?3)"
            ))
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_db_err()?;

            tx.commit().await.map_db_err()?;
        }

        Ok(())
    }

    /// Roll back applied migrations, newest first
    pub async fn down(&self, migrations: &[Box<dyn SqliteMigration>]) -> Result<(), Error> {
        for migration in migrations.iter().rev() {
            if !self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await.map_db_err()?;

            tracing::info!(
                "Rolling back migration {} ({})",
                migration.name(),
                migration.version()
            );

            migration
                .down(&mut *tx)
                .await
                .map_db_err_with_context(migration.name())?;

            sqlx::query(&format!("DELETE FROM {MIGRATION_TABLE} WHERE version = ?1"))
                .bind(migration.version())
                .execute(&mut *tx)
                .await
                .map_db_err()?;

            tx.commit().await.map_db_err()?;
        }

        Ok(())
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, Error> {
        sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {MIGRATION_TABLE} WHERE version = ?1)"
        ))
        .bind(version)
        .fetch_one(&self.pool)
        .await
        .map_db_err()
    }

    pub async fn applied_versions(&self) -> Result<Vec<i64>, Error> {
        sqlx::query_scalar(&format!(
            "SELECT version FROM {MIGRATION_TABLE} ORDER BY version"
        ))
        .fetch_all(&self.pool)
        .await
        .map_db_err()
    }
}

pub struct CreateAccountsTable;

#[async_trait]
impl SqliteMigration for CreateAccountsTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateAccountsTable"
    }

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        // identity_key holds the value normalised by the field's comparison
        // rule; timestamps are unix milliseconds
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                identity_field TEXT NOT NULL,
                identity TEXT NOT NULL,
                identity_key TEXT NOT NULL,
                registration_token TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(identity_field, identity_key)
            );"#,
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS accounts")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

pub struct CreateRedemptionsTable;

#[async_trait]
impl SqliteMigration for CreateRedemptionsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateRedemptionsTable"
    }

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        // unix milliseconds, compared against the codec's millisecond expiry
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS magic_link_redemptions (
                token_hash TEXT PRIMARY KEY,
                redeemed_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );"#,
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS magic_link_redemptions")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

pub struct CreateRedemptionExpiryIndex;

#[async_trait]
impl SqliteMigration for CreateRedemptionExpiryIndex {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateRedemptionExpiryIndex"
    }

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_magic_link_redemptions_expires_at \
             ON magic_link_redemptions(expires_at)",
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP INDEX IF EXISTS idx_magic_link_redemptions_expires_at")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
