use async_trait::async_trait;
use chrono::Utc;
use kagi_core::{
    Account, AccountId, Error, NewAccount,
    error::{StorageError, utilities::DatabaseResultExt},
    identity::IdentityField,
    repositories::AccountRepository,
};
use sqlx::SqlitePool;

use super::from_timestamp;

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteAccount {
    id: String,
    identity_field: String,
    identity: String,
    registration_token: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteAccount> for Account {
    type Error = Error;

    fn try_from(row: SqliteAccount) -> Result<Self, Self::Error> {
        let builder = Account::builder()
            .id(AccountId::from(row.id))
            .field(row.identity_field, row.identity)
            .created_at(from_timestamp(row.created_at)?)
            .updated_at(from_timestamp(row.updated_at)?);

        match row.registration_token {
            Some(token_hash) => builder.registration_token(token_hash).build(),
            None => builder.build(),
        }
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn find_by_identity(
        &self,
        field: &IdentityField,
        value: &str,
    ) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            SELECT id, identity_field, identity, registration_token, created_at, updated_at
            FROM accounts
            WHERE identity_field = ?1 AND identity_key = ?2
            "#,
        )
        .bind(&field.name)
        .bind(field.key(value))
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            SELECT id, identity_field, identity, registration_token, created_at, updated_at
            FROM accounts
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(Account::try_from).transpose()
    }

    async fn create(&self, field: &IdentityField, account: NewAccount) -> Result<Account, Error> {
        let now = Utc::now().timestamp_millis();

        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            INSERT INTO accounts (id, identity_field, identity, identity_key, registration_token, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, identity_field, identity, registration_token, created_at, updated_at
            "#,
        )
        .bind(account.id.as_str())
        .bind(&account.identity_field)
        .bind(&account.identity)
        .bind(field.key(&account.identity))
        .bind(account.registration_token.as_deref())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Storage(StorageError::Constraint(format!(
                    "An account with this {} already exists",
                    field.name
                )))
            }
            e => Error::Storage(StorageError::Database(e.to_string())),
        })?;

        tracing::debug!(account_id = %account.id, field = %field.name, "Created account");

        Account::try_from(row)
    }
}
