//! Magic link redemption
//!
//! [`RedemptionEngine::redeem`] runs these steps in order and stops at the first failure:
//!
//! 1. Verify the token for purpose `magic_link` ([`Rejection::InvalidOrExpired`])
//! 2. Check the claimed action against the strategy ([`Rejection::WrongAction`])
//! 3. Under single use, atomically mark the token id as redeemed ([`Rejection::AlreadyUsed`]),
//!    then refuse the token if it expired while being marked ([`Rejection::InvalidOrExpired`])
//! 4. Resolve the claimed identity, registering a new account when allowed
//!    ([`Rejection::IdentityNotFound`])
//! 5. Check the resolved account against the token ([`Rejection::HijackPrevented`])
//!
//! The marker from step 3 is never removed, even when a later step fails. A
//! token whose resolution failed after marking stays unusable.
//!
//! # Hijack rules
//!
//! The resolved account must always hold an identity value matching the claim
//! under the field's comparison. With `prevent_hijacking` enabled:
//!
//! - a token issued for an account only signs in that same account id
//! - a token issued for a bare identity refuses an account created at or after
//!   the instant the token was issued, unless a redemption of this same token
//!   registered it (see [`Account::registration_token`])

use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error,
    account::{Account, NewAccount},
    codec::TokenCodec,
    crypto::{hash_token, token_fingerprint},
    error::{CodecError, Rejection, StorageError},
    repositories::{AccountRepository, RedemptionRepository},
    strategy::Strategy,
    token::{RequestContext, TokenPurpose, TokenSubject, VerifiedToken},
};

/// A successful redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub account: Account,
    /// Whether the account was created by this redemption
    pub registered: bool,
}

pub struct RedemptionEngine<A, R, C>
where
    A: AccountRepository,
    R: RedemptionRepository,
    C: TokenCodec,
{
    strategy: Arc<Strategy>,
    codec: Arc<C>,
    accounts: Arc<A>,
    redemptions: Arc<R>,
}

impl<A, R, C> RedemptionEngine<A, R, C>
where
    A: AccountRepository,
    R: RedemptionRepository,
    C: TokenCodec,
{
    pub fn new(
        strategy: Arc<Strategy>,
        codec: Arc<C>,
        accounts: Arc<A>,
        redemptions: Arc<R>,
    ) -> Self {
        Self {
            strategy,
            codec,
            accounts,
            redemptions,
        }
    }

    /// Redeem `token` and return the account it signs in.
    ///
    /// Semantic failures are `Error::Rejected`. Storage and codec outages are
    /// returned as their own retryable errors.
    pub async fn redeem(
        &self,
        token: &str,
        context: &RequestContext,
    ) -> Result<Redemption, Error> {
        let fingerprint = token_fingerprint(token);

        let verified = match self.codec.verify(token, TokenPurpose::MagicLink).await {
            Ok(verified) => verified,
            Err(CodecError::Unavailable(message)) => {
                tracing::error!(token = %fingerprint, error = %message, "Token codec unavailable");
                return Err(CodecError::Unavailable(message).into());
            }
            Err(e) => {
                tracing::debug!(token = %fingerprint, error = %e, "Token verification failed");
                return Err(self.reject(Rejection::InvalidOrExpired, &fingerprint));
            }
        };

        if verified.claims.action != self.strategy.sign_in_action_name() {
            tracing::debug!(
                token = %fingerprint,
                action = %verified.claims.action,
                expected = %self.strategy.sign_in_action_name(),
                "Token action mismatch"
            );
            return Err(self.reject(Rejection::WrongAction, &fingerprint));
        }

        if self.strategy.single_use() {
            let token_hash = hash_token(&verified.token_id);
            let newly_marked = self
                .redemptions
                .mark_redeemed(&token_hash, verified.expires_at)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        token = %fingerprint,
                        error = %e,
                        "Failed to mark token as redeemed"
                    );
                })?;

            if !newly_marked {
                return Err(self.reject(Rejection::AlreadyUsed, &fingerprint));
            }

            // Markers of expired tokens may be purged, so a mark placed after
            // expiry proves nothing about earlier redemptions.
            if Utc::now() > verified.expires_at {
                tracing::debug!(token = %fingerprint, "Token expired while being marked");
                return Err(self.reject(Rejection::InvalidOrExpired, &fingerprint));
            }
        }

        let (account, registered) = match self.resolve(&verified, &fingerprint).await? {
            Some(resolved) => resolved,
            None => return Err(self.reject(Rejection::IdentityNotFound, &fingerprint)),
        };

        if let Err(rejection) = self.check_hijacking(&verified, &account, registered) {
            return Err(self.reject(rejection, &fingerprint));
        }

        tracing::info!(
            strategy = %self.strategy.name(),
            token = %fingerprint,
            account_id = %account.id,
            registered,
            ip_address = ?context.ip_address,
            "Magic link redeemed"
        );

        Ok(Redemption {
            account,
            registered,
        })
    }

    /// Find the account for the claimed identity, creating it when registration
    /// is enabled. `None` means no account exists and none may be created.
    async fn resolve(
        &self,
        verified: &VerifiedToken,
        fingerprint: &str,
    ) -> Result<Option<(Account, bool)>, Error> {
        let field = self.strategy.identity_field();
        let identity = verified.claims.identity.as_str();

        if let Some(account) = self
            .accounts
            .find_by_identity(field, identity)
            .await
            .inspect_err(|e| {
                tracing::error!(token = %fingerprint, error = %e, "Failed to resolve identity");
            })?
        {
            return Ok(Some((account, false)));
        }

        if !self.strategy.registration_enabled() {
            return Ok(None);
        }

        let account = NewAccount::new(field, identity)
            .with_registration_token(hash_token(&verified.token_id));

        match self.accounts.create(field, account).await {
            Ok(account) => Ok(Some((account, true))),
            Err(Error::Storage(StorageError::Constraint(message))) => {
                // Lost a registration race; the winner's account goes through
                // the hijack rules like any other existing account.
                tracing::debug!(token = %fingerprint, "Concurrent registration, resolving again");
                match self.accounts.find_by_identity(field, identity).await? {
                    Some(account) => Ok(Some((account, false))),
                    None => Err(StorageError::Constraint(message).into()),
                }
            }
            Err(e) => {
                tracing::error!(token = %fingerprint, error = %e, "Failed to register account");
                Err(e)
            }
        }
    }

    fn check_hijacking(
        &self,
        verified: &VerifiedToken,
        account: &Account,
        registered: bool,
    ) -> Result<(), Rejection> {
        let field = self.strategy.identity_field();
        let claimed = verified.claims.identity.as_str();

        match account.identity(field) {
            Some(current) if field.matches(current, claimed) => {}
            _ => return Err(Rejection::HijackPrevented),
        }

        if !self.strategy.prevent_hijacking() {
            return Ok(());
        }

        match verified.claims.subject() {
            TokenSubject::Account(account_id) if account_id != account.id => {
                Err(Rejection::HijackPrevented)
            }
            TokenSubject::Account(_) => Ok(()),
            TokenSubject::Identity(_) if registered => Ok(()),
            TokenSubject::Identity(_)
                if account.registration_token.as_deref()
                    == Some(hash_token(&verified.token_id).as_str()) =>
            {
                Ok(())
            }
            TokenSubject::Identity(_) if account.created_at >= verified.issued_at => {
                Err(Rejection::HijackPrevented)
            }
            TokenSubject::Identity(_) => Ok(()),
        }
    }

    fn reject(&self, rejection: Rejection, fingerprint: &str) -> Error {
        match rejection {
            Rejection::AlreadyUsed | Rejection::HijackPrevented => tracing::warn!(
                strategy = %self.strategy.name(),
                token = %fingerprint,
                reason = rejection.as_str(),
                "Magic link rejected"
            ),
            _ => tracing::info!(
                strategy = %self.strategy.name(),
                token = %fingerprint,
                reason = rejection.as_str(),
                "Magic link rejected"
            ),
        }
        Error::Rejected(rejection)
    }
}
