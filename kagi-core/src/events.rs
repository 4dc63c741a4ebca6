//! Telemetry events
//!
//! The magic link service reports what happened to an [`EventBus`]. Handlers
//! receive every event in registration order. A failing handler never changes
//! the outcome of a request or sign-in; the service logs the error and moves on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    account::{Account, AccountId},
    error::{EventError, Rejection},
};

#[derive(Debug, Clone)]
pub enum Event {
    /// A link was requested. `registered` is whether an account already exists.
    MagicLinkRequested {
        identity: String,
        registered: bool,
        timestamp: DateTime<Utc>,
    },

    /// A link was handed to the [`LinkSender`](crate::repositories::LinkSender)
    MagicLinkSent {
        identity: String,
        token_fingerprint: String,
        expires_at: DateTime<Utc>,
    },

    /// A token was redeemed and the account signed in
    MagicLinkRedeemed {
        account_id: AccountId,
        timestamp: DateTime<Utc>,
    },

    /// An account was created by redeeming a link for an unknown identity
    AccountRegistered(Account),

    /// A redemption was refused. `reason` is for telemetry only.
    RedemptionRejected {
        reason: Rejection,
        token_fingerprint: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::MagicLinkRequested { .. } => "magic_link_requested",
            Event::MagicLinkSent { .. } => "magic_link_sent",
            Event::MagicLinkRedeemed { .. } => "magic_link_redeemed",
            Event::AccountRegistered(_) => "account_registered",
            Event::RedemptionRejected { .. } => "redemption_rejected",
        }
    }
}

/// A trait for handling events emitted by the event bus
///
/// # Examples
///
/// ```
/// use kagi_core::error::EventError;
/// use kagi_core::events::{Event, EventHandler};
/// use async_trait::async_trait;
///
/// struct AuditLog;
///
/// #[async_trait]
/// impl EventHandler for AuditLog {
///     async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
///         println!("{}", event.name());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Deliver `event` to every handler, stopping at the first error
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }

    /// Deliver `event` to every handler, logging failures instead of returning them
    pub async fn publish(&self, event: Event) {
        for handler in self.handlers.read().await.iter() {
            if let Err(error) = handler.handle_event(&event).await {
                tracing::warn!(event = event.name(), error = %error, "Event handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle_event(&self, _event: &Event) -> Result<(), EventError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle_event(&self, _event: &Event) -> Result<(), EventError> {
            Err(EventError::HandlerError("audit sink offline".into()))
        }
    }

    fn redeemed() -> Event {
        Event::MagicLinkRedeemed {
            account_id: AccountId::new("acct_test"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_empty() {
        let event_bus = EventBus::default();
        event_bus.emit(&redeemed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_event_bus_multiple_handlers() {
        let event_bus = EventBus::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        event_bus
            .register(Arc::new(CountingHandler {
                count: first.clone(),
            }))
            .await;
        event_bus
            .register(Arc::new(CountingHandler {
                count: second.clone(),
            }))
            .await;

        event_bus.emit(&redeemed()).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_propagates_handler_error() {
        let event_bus = EventBus::default();
        event_bus.register(Arc::new(FailingHandler)).await;

        let result = event_bus.emit(&redeemed()).await;
        assert!(matches!(result, Err(EventError::HandlerError(_))));
    }

    #[tokio::test]
    async fn test_publish_swallows_handler_error() {
        let event_bus = EventBus::default();
        let count = Arc::new(AtomicUsize::new(0));

        event_bus.register(Arc::new(FailingHandler)).await;
        event_bus
            .register(Arc::new(CountingHandler {
                count: count.clone(),
            }))
            .await;

        event_bus
            .publish(Event::RedemptionRejected {
                reason: Rejection::AlreadyUsed,
                token_fingerprint: "abc123".to_string(),
                timestamp: Utc::now(),
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(redeemed().name(), "magic_link_redeemed");
        let account = Account::builder()
            .field("email", "a@x.com")
            .build()
            .unwrap();
        assert_eq!(Event::AccountRegistered(account).name(), "account_registered");
    }
}
