use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    Error,
    codec::TokenCodec,
    crypto::token_fingerprint,
    events::{Event, EventBus},
    repositories::{AccountRepository, Destination, LinkSender, RedemptionRepository},
    services::{
        issuer::TokenIssuer,
        redemption::{Redemption, RedemptionEngine},
    },
    strategy::Strategy,
    token::{IssuedToken, RequestContext},
};

/// How long a marker outlives its token before cleanup may remove it
pub const MARKER_CLEANUP_GRACE: Duration = Duration::seconds(1);

/// What happened to a link request
///
/// Show the user the same response for every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A link was issued and handed to the sender
    Sent {
        /// Whether the identity belongs to an existing account
        existing_account: bool,
        expires_at: DateTime<Utc>,
    },
    /// The identity is unknown and registration is disabled, so nothing was sent
    Suppressed,
}

/// Request and sign-in flows for one magic link strategy
pub struct MagicLinkService<A, R, C, S>
where
    A: AccountRepository,
    R: RedemptionRepository,
    C: TokenCodec,
    S: LinkSender,
{
    strategy: Arc<Strategy>,
    accounts: Arc<A>,
    redemptions: Arc<R>,
    sender: Arc<S>,
    issuer: TokenIssuer<C>,
    engine: RedemptionEngine<A, R, C>,
    events: EventBus,
}

impl<A, R, C, S> MagicLinkService<A, R, C, S>
where
    A: AccountRepository,
    R: RedemptionRepository,
    C: TokenCodec,
    S: LinkSender,
{
    pub fn new(
        strategy: Arc<Strategy>,
        codec: Arc<C>,
        accounts: Arc<A>,
        redemptions: Arc<R>,
        sender: Arc<S>,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(strategy.clone(), codec.clone()),
            engine: RedemptionEngine::new(
                strategy.clone(),
                codec,
                accounts.clone(),
                redemptions.clone(),
            ),
            strategy,
            accounts,
            redemptions,
            sender,
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn issuer(&self) -> &TokenIssuer<C> {
        &self.issuer
    }

    pub fn engine(&self) -> &RedemptionEngine<A, R, C> {
        &self.engine
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Issue and send a sign-in link for `identity`.
    ///
    /// Known identities get an account-bound token. Unknown identities get an
    /// identity-bound token when registration is enabled and nothing otherwise.
    pub async fn request(
        &self,
        identity: &str,
        context: &RequestContext,
    ) -> Result<RequestOutcome, Error> {
        let field = self.strategy.identity_field();
        field.validate(identity)?;

        let account = self
            .accounts
            .find_by_identity(field, identity)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to look up identity"))?;

        self.events
            .publish(Event::MagicLinkRequested {
                identity: identity.to_string(),
                registered: account.is_some(),
                timestamp: Utc::now(),
            })
            .await;

        let existing_account = account.is_some();
        let (destination, token) = match account {
            Some(account) => {
                let token = self.issuer.issue_for_account(&account, context).await?;
                (Destination::Account(account), token)
            }
            None if self.strategy.registration_enabled() => {
                let token = self.issuer.issue_for_identity(identity, context).await?;
                (Destination::Identity(identity.to_string()), token)
            }
            None => {
                tracing::info!(
                    strategy = %self.strategy.name(),
                    "Magic link requested for unknown identity, nothing sent"
                );
                return Ok(RequestOutcome::Suppressed);
            }
        };

        self.sender
            .send(&destination, &token, context)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to send magic link"))?;

        self.events
            .publish(Event::MagicLinkSent {
                identity: identity.to_string(),
                token_fingerprint: token.fingerprint(),
                expires_at: token.expires_at,
            })
            .await;

        Ok(RequestOutcome::Sent {
            existing_account,
            expires_at: token.expires_at,
        })
    }

    /// Redeem `token`, publishing the outcome on the event bus
    pub async fn sign_in(
        &self,
        token: &str,
        context: &RequestContext,
    ) -> Result<Redemption, Error> {
        match self.engine.redeem(token, context).await {
            Ok(redemption) => {
                if redemption.registered {
                    self.events
                        .publish(Event::AccountRegistered(redemption.account.clone()))
                        .await;
                }
                self.events
                    .publish(Event::MagicLinkRedeemed {
                        account_id: redemption.account.id.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
                Ok(redemption)
            }
            Err(error) => {
                if let Some(reason) = error.rejection() {
                    self.events
                        .publish(Event::RedemptionRejected {
                            reason,
                            token_fingerprint: token_fingerprint(token),
                            timestamp: Utc::now(),
                        })
                        .await;
                }
                Err(error)
            }
        }
    }

    /// Link to `base_url` carrying the token in the strategy's token parameter.
    ///
    /// Codec tokens are URL-safe and appended as is. The parameter goes into
    /// the query, ahead of any `#fragment`.
    pub fn magic_link_url(&self, base_url: &str, token: &IssuedToken) -> String {
        let (base, fragment) = match base_url.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (base_url, None),
        };
        let separator = match base.split_once('?') {
            Some((_, "")) => "",
            Some(_) if base.ends_with('&') => "",
            Some(_) => "&",
            None => "?",
        };

        let mut url = format!(
            "{base}{separator}{}={}",
            self.strategy.token_param_name(),
            token.as_str()
        );
        if let Some(fragment) = fragment {
            url.push('#');
            url.push_str(fragment);
        }
        url
    }

    /// Remove single-use markers of tokens that expired more than
    /// [`MARKER_CLEANUP_GRACE`] ago
    pub async fn cleanup_expired_markers(&self) -> Result<u64, Error> {
        let removed = self
            .redemptions
            .cleanup_expired(Utc::now() - MARKER_CLEANUP_GRACE)
            .await?;
        tracing::debug!(removed, "Cleaned up expired redemption markers");
        Ok(removed)
    }
}
