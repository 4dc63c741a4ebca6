//! Magic link scenarios shared by the storage backend tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use kagi::{
    Destination, Error, Event, EventHandler, IdentityField, InMemoryLinkSender, JwtCodecConfig,
    JwtTokenCodec, Kagi, KagiBuilder, Rejection, RepositoryProvider, RequestContext,
    RequestOutcome, StrategyConfig, TokenCodec,
};
use kagi_core::{
    MagicLinkClaims, TokenPurpose, TokenSubject, error::EventError,
    repositories::{AccountRepository, AccountRepositoryProvider},
};

const SECRET: &[u8] = b"kagi-integration-test-secret-0123456789";

pub fn codec_config() -> JwtCodecConfig {
    JwtCodecConfig::new_hs256(SECRET.to_vec())
}

pub fn strategy() -> StrategyConfig {
    StrategyConfig::builder("magic_link").build()
}

pub fn registering_strategy() -> StrategyConfig {
    StrategyConfig::builder("magic_link")
        .registration_enabled(true)
        .build()
}

pub struct Harness<R: RepositoryProvider> {
    pub kagi: Arc<Kagi<R, InMemoryLinkSender>>,
    pub repositories: Arc<R>,
    pub sender: Arc<InMemoryLinkSender>,
}

impl<R: RepositoryProvider> Harness<R> {
    pub async fn new(repositories: Arc<R>, strategy: StrategyConfig) -> Self {
        let _ = tracing_subscriber::fmt().try_init();

        let sender = Arc::new(InMemoryLinkSender::new());
        let kagi = KagiBuilder::new()
            .with_repositories(repositories.clone())
            .with_strategy(strategy)
            .with_codec(codec_config())
            .apply_migrations(true)
            .build(sender.clone())
            .await
            .expect("Failed to build kagi");

        Self {
            kagi: Arc::new(kagi),
            repositories,
            sender,
        }
    }

    pub async fn create_account(&self, email: &str) -> kagi::Account {
        self.repositories
            .account()
            .create_with_identity(&IdentityField::email(), email)
            .await
            .expect("Failed to create account")
    }

    pub async fn find_account(&self, email: &str) -> Option<kagi::Account> {
        self.repositories
            .account()
            .find_by_identity(&IdentityField::email(), email)
            .await
            .expect("Failed to look up account")
    }
}

fn assert_rejected(result: Result<kagi::Redemption, Error>, expected: Rejection) {
    let error = result.expect_err("redemption should be rejected");
    assert_eq!(error.rejection(), Some(expected), "unexpected error: {error}");
    assert_eq!(error.public_message(), "link invalid or expired");
    assert!(!error.is_retryable());
}

/// Requesting a link for an existing account and redeeming it twice succeeds once
pub async fn single_use_link<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories, strategy()).await;
    let account = harness.create_account("alice@example.com").await;
    let context = RequestContext::new().with_ip_address("127.0.0.1");

    let outcome = harness
        .kagi
        .request_magic_link("alice@example.com", &context)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        RequestOutcome::Sent {
            existing_account: true,
            ..
        }
    ));

    let link = harness.sender.last().expect("a link should have been sent");
    assert_eq!(link.destination, Destination::Account(account.clone()));
    assert_eq!(link.context.ip_address.as_deref(), Some("127.0.0.1"));

    let redemption = harness
        .kagi
        .sign_in_with_magic_link(link.token.as_str(), &context)
        .await
        .unwrap();
    assert_eq!(redemption.account.id, account.id);
    assert!(!redemption.registered);

    let again = harness
        .kagi
        .sign_in_with_magic_link(link.token.as_str(), &context)
        .await;
    assert_rejected(again, Rejection::AlreadyUsed);

    // The marker outlives the redemption until the token expires
    assert_eq!(harness.kagi.cleanup_expired_markers().await.unwrap(), 0);
}

/// A token verifies until its lifetime has passed and is rejected afterwards
pub async fn expired_link<R: RepositoryProvider>(repositories: Arc<R>) {
    let strategy = StrategyConfig::builder("magic_link")
        .token_lifetime(Duration::seconds(1))
        .build();
    let harness = Harness::new(repositories, strategy).await;
    let account = harness.create_account("bob@example.com").await;
    let context = RequestContext::new();

    let fresh = harness
        .kagi
        .issue_for_account(&account, &context)
        .await
        .unwrap();
    let stale = harness
        .kagi
        .issue_for_account(&account, &context)
        .await
        .unwrap();
    assert_eq!(stale.expires_at - stale.issued_at, Duration::seconds(1));

    harness
        .kagi
        .sign_in_with_magic_link(fresh.as_str(), &context)
        .await
        .unwrap();

    // Expiry is exact to the millisecond, not rounded to the next second
    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

    let result = harness
        .kagi
        .sign_in_with_magic_link(stale.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::InvalidOrExpired);
}

/// A token redeemed just before the end of its lifetime still signs in
pub async fn link_near_expiry<R: RepositoryProvider>(repositories: Arc<R>) {
    let strategy = StrategyConfig::builder("magic_link")
        .token_lifetime(Duration::seconds(2))
        .build();
    let harness = Harness::new(repositories, strategy).await;
    let account = harness.create_account("bob@example.com").await;
    let context = RequestContext::new();

    let token = harness
        .kagi
        .issue_for_account(&account, &context)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1700)).await;
    let redemption = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();
    assert_eq!(redemption.account.id, account.id);
}

/// Cleaning up markers while a redeemed token is still valid keeps it spent
pub async fn cleanup_keeps_live_markers<R: RepositoryProvider>(repositories: Arc<R>) {
    let strategy = StrategyConfig::builder("magic_link")
        .token_lifetime(Duration::seconds(1))
        .build();
    let harness = Harness::new(repositories, strategy).await;
    let account = harness.create_account("grace@example.com").await;
    let context = RequestContext::new();

    let token = harness
        .kagi
        .issue_for_account(&account, &context)
        .await
        .unwrap();
    harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();

    // Last moments of the token's lifetime
    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    assert_eq!(harness.kagi.cleanup_expired_markers().await.unwrap(), 0);
    let result = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::AlreadyUsed);

    // Past expiry and the cleanup grace period
    tokio::time::sleep(std::time::Duration::from_millis(1400)).await;
    assert_eq!(harness.kagi.cleanup_expired_markers().await.unwrap(), 1);
    let result = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::InvalidOrExpired);
}

/// Bare identity tokens need registration to be enabled
pub async fn unknown_identity_without_registration<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories, strategy()).await;
    let context = RequestContext::new();

    let outcome = harness
        .kagi
        .request_magic_link("ghost@example.com", &context)
        .await
        .unwrap();
    assert_eq!(outcome, RequestOutcome::Suppressed);
    assert!(harness.sender.sent().is_empty());

    let token = harness
        .kagi
        .issue_for_identity("ghost@example.com", &context)
        .await
        .unwrap();
    let result = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::IdentityNotFound);
    assert!(harness.find_account("ghost@example.com").await.is_none());
}

/// Redeeming a bare identity token registers exactly one account
pub async fn registration<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories, registering_strategy()).await;
    let context = RequestContext::new();

    let outcome = harness
        .kagi
        .request_magic_link("carol@example.com", &context)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        RequestOutcome::Sent {
            existing_account: false,
            ..
        }
    ));

    let link = harness.sender.last().unwrap();
    assert_eq!(
        link.destination,
        Destination::Identity("carol@example.com".to_string())
    );

    let redemption = harness
        .kagi
        .sign_in_with_magic_link(link.token.as_str(), &context)
        .await
        .unwrap();
    assert!(redemption.registered);
    assert_eq!(redemption.account.field("email"), Some("carol@example.com"));

    let stored = harness.find_account("carol@example.com").await.unwrap();
    assert_eq!(stored.id, redemption.account.id);
    assert_eq!(
        harness
            .kagi
            .get_account(&stored.id)
            .await
            .unwrap()
            .map(|a| a.id),
        Some(stored.id.clone())
    );

    // The next request finds the registered account
    let outcome = harness
        .kagi
        .request_magic_link("carol@example.com", &context)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        RequestOutcome::Sent {
            existing_account: true,
            ..
        }
    ));
}

/// A token minted for another sign-in action is refused
pub async fn wrong_action<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories.clone(), strategy()).await;
    let other = Harness::new(
        repositories,
        StrategyConfig::builder("magic_link")
            .sign_in_action_name("sign_in_with_admin_link")
            .request_action_name("request_admin_link")
            .build(),
    )
    .await;
    let account = harness.create_account("dave@example.com").await;
    let context = RequestContext::new();

    let token = other
        .kagi
        .issue_for_account(&account, &context)
        .await
        .unwrap();
    let result = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::WrongAction);

    other
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();
}

/// A bare identity token never signs in as an unrelated account
pub async fn unrelated_account_is_not_authenticated<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories, registering_strategy()).await;
    let context = RequestContext::new();

    let token = harness
        .kagi
        .issue_for_identity("a@x.com", &context)
        .await
        .unwrap();
    let unrelated = harness.create_account("b@x.com").await;

    let redemption = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();
    assert_ne!(redemption.account.id, unrelated.id);
    assert_eq!(redemption.account.field("email"), Some("a@x.com"));
    assert!(redemption.registered);
}

/// An account created for the identity after the link was issued is refused
pub async fn account_created_after_issuance<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories, registering_strategy()).await;
    let context = RequestContext::new();

    let token = harness
        .kagi
        .issue_for_identity("victim@x.com", &context)
        .await
        .unwrap();

    // Same second as issuance, but later
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let squatter = harness.create_account("victim@x.com").await;
    assert!(squatter.created_at > token.issued_at);

    let result = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::HijackPrevented);
}

/// A reusable bare identity link keeps signing in the account it registered
pub async fn reusable_registration_link<R: RepositoryProvider>(repositories: Arc<R>) {
    let strategy = StrategyConfig::builder("magic_link")
        .registration_enabled(true)
        .single_use(false)
        .build();
    let harness = Harness::new(repositories, strategy).await;
    let context = RequestContext::new();

    let token = harness
        .kagi
        .issue_for_identity("ivan@example.com", &context)
        .await
        .unwrap();
    let other = harness
        .kagi
        .issue_for_identity("ivan@example.com", &context)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let first = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();
    assert!(first.registered);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let second = harness
        .kagi
        .sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();
    assert!(!second.registered);
    assert_eq!(second.account.id, first.account.id);

    // A second link issued before the registration did not create the account
    let result = harness
        .kagi
        .sign_in_with_magic_link(other.as_str(), &context)
        .await;
    assert_rejected(result, Rejection::HijackPrevented);
}

/// N concurrent redemptions of one token produce one success
pub async fn concurrent_redemptions<R: RepositoryProvider>(repositories: Arc<R>) {
    const ATTEMPTS: usize = 16;

    let harness = Harness::new(repositories, strategy()).await;
    let account = harness.create_account("erin@example.com").await;
    let token = harness
        .kagi
        .issue_for_account(&account, &RequestContext::new())
        .await
        .unwrap();

    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let kagi = harness.kagi.clone();
            let token = token.clone();
            tokio::spawn(async move {
                kagi.sign_in_with_magic_link(token.as_str(), &RequestContext::new())
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(redemption) => {
                assert_eq!(redemption.account.id, account.id);
                successes += 1;
            }
            Err(error) => {
                assert_eq!(error.rejection(), Some(Rejection::AlreadyUsed));
                already_used += 1;
            }
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_used, ATTEMPTS - 1);
}

/// Claims given to the issuer come back unchanged from the codec
pub async fn claims_round_trip<R: RepositoryProvider>(repositories: Arc<R>) {
    let harness = Harness::new(repositories, strategy()).await;
    let account = harness.create_account("Frank@Example.com").await;

    let token = harness
        .kagi
        .issue_for_account(&account, &RequestContext::new())
        .await
        .unwrap();

    let codec = JwtTokenCodec::new(codec_config()).unwrap();
    let verified = codec
        .verify(token.as_str(), TokenPurpose::MagicLink)
        .await
        .unwrap();

    assert_eq!(
        verified.claims,
        MagicLinkClaims::for_account(
            harness.kagi.strategy().sign_in_action_name(),
            "Frank@Example.com",
            account.id.clone()
        )
    );
    assert_eq!(verified.claims.subject(), TokenSubject::Account(account.id));
    assert_eq!(verified.token_id, token.token_id);
    assert_eq!(verified.expires_at, token.expires_at);

    let url = harness
        .kagi
        .magic_link_url("https://app.example.com/auth", &token);
    assert_eq!(
        url,
        format!("https://app.example.com/auth?token={}", token.as_str())
    );
    assert_eq!(
        harness
            .kagi
            .magic_link_url("https://app.example.com/#/auth", &token),
        format!("https://app.example.com/?token={}#/auth", token.as_str())
    );
}

#[derive(Default)]
pub struct RecordingHandler {
    names: Mutex<Vec<&'static str>>,
}

impl RecordingHandler {
    pub fn names(&self) -> Vec<&'static str> {
        self.names
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
        if let Ok(mut names) = self.names.lock() {
            names.push(event.name());
        }
        Ok(())
    }
}

/// Telemetry events follow a request, a registration and a replay
pub async fn telemetry_events<R: RepositoryProvider>(repositories: Arc<R>) {
    let _ = tracing_subscriber::fmt().try_init();

    let handler = Arc::new(RecordingHandler::default());
    let sender = Arc::new(InMemoryLinkSender::new());
    let kagi = KagiBuilder::new()
        .with_repositories(repositories)
        .with_strategy(registering_strategy())
        .with_codec(codec_config())
        .with_event_handler(handler.clone())
        .apply_migrations(true)
        .build(sender.clone())
        .await
        .unwrap();
    let context = RequestContext::new();

    kagi.request_magic_link("grace@example.com", &context)
        .await
        .unwrap();
    let token = sender.last().unwrap().token;
    kagi.sign_in_with_magic_link(token.as_str(), &context)
        .await
        .unwrap();
    let _ = kagi.sign_in_with_magic_link(token.as_str(), &context).await;

    assert_eq!(
        handler.names(),
        vec![
            "magic_link_requested",
            "magic_link_sent",
            "account_registered",
            "magic_link_redeemed",
            "redemption_rejected",
        ]
    );
}
