use std::sync::Arc;

use crate::{
    Error,
    account::Account,
    codec::TokenCodec,
    error::{CodecError, ValidationError},
    strategy::Strategy,
    token::{IssuedToken, MagicLinkClaims, RequestContext, TokenPurpose},
    validation::validate_identity,
};

/// Builds sign-in claims and asks the codec for a token
///
/// The issuer never delivers tokens and never looks accounts up.
pub struct TokenIssuer<C: TokenCodec> {
    strategy: Arc<Strategy>,
    codec: Arc<C>,
}

impl<C: TokenCodec> TokenIssuer<C> {
    pub fn new(strategy: Arc<Strategy>, codec: Arc<C>) -> Self {
        Self { strategy, codec }
    }

    /// Issue a token bound to an existing account
    pub async fn issue_for_account(
        &self,
        account: &Account,
        context: &RequestContext,
    ) -> Result<IssuedToken, Error> {
        let field = self.strategy.identity_field();
        let identity = account.identity(field).ok_or_else(|| {
            ValidationError::InvalidField(format!(
                "Account {} has no '{}' value",
                account.id, field.name
            ))
        })?;

        let claims = MagicLinkClaims::for_account(
            self.strategy.sign_in_action_name(),
            identity,
            account.id.clone(),
        );

        self.issue(claims, context).await
    }

    /// Issue a token for a bare identity value. No account needs to exist.
    pub async fn issue_for_identity(
        &self,
        identity: &str,
        context: &RequestContext,
    ) -> Result<IssuedToken, Error> {
        validate_identity(identity)?;

        let claims = MagicLinkClaims::for_identity(self.strategy.sign_in_action_name(), identity);

        self.issue(claims, context).await
    }

    async fn issue(
        &self,
        claims: MagicLinkClaims,
        context: &RequestContext,
    ) -> Result<IssuedToken, Error> {
        let issued = self
            .codec
            .issue(&claims, TokenPurpose::MagicLink, self.strategy.token_lifetime())
            .await
            .map_err(|e| {
                tracing::error!(
                    strategy = %self.strategy.name(),
                    error = %e,
                    "Failed to issue magic link token"
                );
                match e {
                    CodecError::Unavailable(_) => Error::Codec(e),
                    other => Error::Issuance(other.to_string()),
                }
            })?;

        tracing::debug!(
            strategy = %self.strategy.name(),
            token = %issued.fingerprint(),
            account_bound = claims.account_id.is_some(),
            expires_at = %issued.expires_at,
            ip_address = ?context.ip_address,
            "Issued magic link token"
        );

        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{JwtCodecConfig, JwtTokenCodec},
        strategy::{ResourceSchema, StrategyConfig},
        token::TokenSubject,
    };
    use async_trait::async_trait;
    use chrono::Duration;

    fn strategy() -> Arc<Strategy> {
        Arc::new(
            StrategyConfig::builder("magic_link")
                .token_lifetime(Duration::minutes(15))
                .build()
                .validate(&ResourceSchema::new("user").unique_field("email"))
                .unwrap(),
        )
    }

    fn codec() -> Arc<JwtTokenCodec> {
        Arc::new(JwtTokenCodec::new(JwtCodecConfig::new_random_hs256()).unwrap())
    }

    struct BrokenCodec(fn() -> CodecError);

    #[async_trait]
    impl TokenCodec for BrokenCodec {
        async fn issue(
            &self,
            _claims: &MagicLinkClaims,
            _purpose: TokenPurpose,
            _lifetime: Duration,
        ) -> Result<IssuedToken, CodecError> {
            Err((self.0)())
        }

        async fn verify(
            &self,
            _token: &str,
            _purpose: TokenPurpose,
        ) -> Result<crate::token::VerifiedToken, CodecError> {
            Err(CodecError::Invalid("broken".to_string()))
        }
    }

    #[tokio::test]
    async fn test_issue_for_account() {
        let codec = codec();
        let issuer = TokenIssuer::new(strategy(), codec.clone());
        let account = Account::builder()
            .field("email", "alice@example.com")
            .build()
            .unwrap();

        let issued = issuer
            .issue_for_account(&account, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(issued.expires_at - issued.issued_at, Duration::minutes(15));

        let verified = codec
            .verify(issued.as_str(), TokenPurpose::MagicLink)
            .await
            .unwrap();
        assert_eq!(
            verified.claims,
            MagicLinkClaims::for_account(
                "sign_in_with_magic_link",
                "alice@example.com",
                account.id.clone()
            )
        );
        assert_eq!(verified.claims.subject(), TokenSubject::Account(account.id));
    }

    #[tokio::test]
    async fn test_issue_for_identity_without_account() {
        let codec = codec();
        let issuer = TokenIssuer::new(strategy(), codec.clone());

        let issued = issuer
            .issue_for_identity("new@example.com", &RequestContext::new())
            .await
            .unwrap();

        let verified = codec
            .verify(issued.as_str(), TokenPurpose::MagicLink)
            .await
            .unwrap();
        assert_eq!(verified.claims.identity, "new@example.com");
        assert_eq!(verified.claims.action, "sign_in_with_magic_link");
        assert_eq!(
            verified.claims.subject(),
            TokenSubject::Identity("new@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_issue_for_account_without_identity_value() {
        let issuer = TokenIssuer::new(strategy(), codec());
        let account = Account::builder()
            .field("username", "alice")
            .build()
            .unwrap();

        let result = issuer
            .issue_for_account(&account, &RequestContext::new())
            .await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidField(_)))
        ));
    }

    #[tokio::test]
    async fn test_issue_for_blank_identity() {
        let issuer = TokenIssuer::new(strategy(), codec());
        let result = issuer
            .issue_for_identity("  ", &RequestContext::new())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_signing_failure_is_an_issuance_error() {
        let issuer = TokenIssuer::new(
            strategy(),
            Arc::new(BrokenCodec(|| CodecError::Signing("bad key".to_string()))),
        );

        let result = issuer
            .issue_for_identity("a@x.com", &RequestContext::new())
            .await;
        let error = result.unwrap_err();
        assert!(matches!(error, Error::Issuance(_)));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn test_unavailable_codec_is_retryable() {
        let issuer = TokenIssuer::new(
            strategy(),
            Arc::new(BrokenCodec(|| CodecError::Unavailable("kms timeout".to_string()))),
        );

        let result = issuer
            .issue_for_identity("a@x.com", &RequestContext::new())
            .await;
        assert!(result.unwrap_err().is_retryable());
    }
}
