//! Magic link services
//!
//! [`TokenIssuer`] and [`RedemptionEngine`] are the two halves of the token
//! lifecycle. [`MagicLinkService`] wires them to a resolver and a link sender.

pub mod issuer;
pub mod magic_link;
pub mod redemption;

pub use issuer::TokenIssuer;
pub use magic_link::{MagicLinkService, RequestOutcome};
pub use redemption::{Redemption, RedemptionEngine};
