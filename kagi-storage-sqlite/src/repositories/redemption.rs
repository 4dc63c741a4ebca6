use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kagi_core::{
    Error,
    error::utilities::DatabaseResultExt,
    repositories::{RedemptionMarker, RedemptionRepository},
};
use sqlx::SqlitePool;

use super::from_timestamp;

/// Single-use markers in the `magic_link_redemptions` table
///
/// The primary key on `token_hash` is what makes marking atomic: of any number
/// of concurrent inserts for the same hash, exactly one affects a row.
pub struct SqliteRedemptionRepository {
    pool: SqlitePool,
}

impl SqliteRedemptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteRedemptionMarker {
    token_hash: String,
    redeemed_at: i64,
    expires_at: i64,
}

impl TryFrom<SqliteRedemptionMarker> for RedemptionMarker {
    type Error = Error;

    fn try_from(row: SqliteRedemptionMarker) -> Result<Self, Self::Error> {
        Ok(RedemptionMarker {
            token_hash: row.token_hash,
            redeemed_at: from_timestamp(row.redeemed_at)?,
            expires_at: from_timestamp(row.expires_at)?,
        })
    }
}

#[async_trait]
impl RedemptionRepository for SqliteRedemptionRepository {
    async fn mark_redeemed(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO magic_link_redemptions (token_hash, redeemed_at, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(token_hash) DO NOTHING
            "#,
        )
        .bind(token_hash)
        .bind(Utc::now().timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to mark token as redeemed")?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_marker(&self, token_hash: &str) -> Result<Option<RedemptionMarker>, Error> {
        let row = sqlx::query_as::<_, SqliteRedemptionMarker>(
            r#"
            SELECT token_hash, redeemed_at, expires_at
            FROM magic_link_redemptions
            WHERE token_hash = ?1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(RedemptionMarker::try_from).transpose()
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM magic_link_redemptions WHERE expires_at < ?1")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to clean up redemption markers")?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::debug!(removed, "Removed expired redemption markers");
        }

        Ok(removed)
    }
}
