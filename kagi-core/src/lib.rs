//! Core of the kagi magic link library
//!
//! This crate holds the token lifecycle: the validated [`Strategy`], the
//! [`TokenIssuer`] that binds a token to an account or a bare identity, and the
//! [`RedemptionEngine`] that verifies, marks and resolves presented tokens.
//!
//! Accounts, single-use markers and link delivery are collaborators described
//! by the traits in [`repositories`]. In-memory implementations live in
//! [`repositories::memory`]; SQL backends live in their own crates.
//!
//! Applications normally use the `kagi` crate, which re-exports this one.
pub mod account;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod events;
pub mod id;
pub mod identity;
pub mod repositories;
pub mod services;
pub mod strategy;
pub mod token;
pub mod validation;

pub use account::{Account, AccountId, NewAccount};
pub use codec::{JwtCodecConfig, JwtTokenCodec, TokenCodec};
pub use error::{Error, Rejection};
pub use events::{Event, EventBus, EventHandler};
pub use identity::{IdentityComparison, IdentityField, IdentityKind};
pub use services::{
    MagicLinkService, Redemption, RedemptionEngine, RequestOutcome, TokenIssuer,
};
pub use strategy::{ResourceSchema, Strategy, StrategyConfig};
pub use token::{
    IssuedToken, MagicLinkClaims, RequestContext, TokenPurpose, TokenSubject, VerifiedToken,
};
