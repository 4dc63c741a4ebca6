use async_trait::async_trait;

use crate::{
    Error,
    account::{Account, AccountId, NewAccount},
    identity::IdentityField,
};

/// Account lookup and registration by identity value
///
/// Implementations must compare identity values with the field's
/// [`IdentityComparison`](crate::identity::IdentityComparison), normally by
/// storing and querying [`IdentityField::key`].
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Find the account whose `field` matches `value`
    async fn find_by_identity(
        &self,
        field: &IdentityField,
        value: &str,
    ) -> Result<Option<Account>, Error>;

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error>;

    /// Store `account`, indexed under `field`.
    ///
    /// Fails with [`StorageError::Constraint`](crate::error::StorageError::Constraint)
    /// when another account already holds a matching value.
    async fn create(&self, field: &IdentityField, account: NewAccount) -> Result<Account, Error>;

    /// Create an account with `field` set to `value`
    async fn create_with_identity(
        &self,
        field: &IdentityField,
        value: &str,
    ) -> Result<Account, Error> {
        self.create(field, NewAccount::new(field, value)).await
    }
}
