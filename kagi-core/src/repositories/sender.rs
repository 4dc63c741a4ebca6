use async_trait::async_trait;

use crate::{
    Error,
    account::Account,
    token::{IssuedToken, RequestContext},
};

/// Where a magic link goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// An existing account
    Account(Account),
    /// A bare identity value with no account yet
    Identity(String),
}

/// Delivers an issued token to the user, by email, SMS or otherwise
#[async_trait]
pub trait LinkSender: Send + Sync + 'static {
    async fn send(
        &self,
        destination: &Destination,
        token: &IssuedToken,
        context: &RequestContext,
    ) -> Result<(), Error>;
}
