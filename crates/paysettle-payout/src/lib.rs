//! # paysettle-payout
//!
//! Outbound payouts. The [`PayoutDispatcher`] resolves the payee's
//! withdrawal method, picks the [`RailAdapter`] registered for its kind,
//! converts the amount for regional rails and waits at most the configured
//! upstream timeout for the provider's confirmation.
//!
//! Ledger effects are the caller's job: reserve before calling
//! [`PayoutDispatcher::payout`], then finalize or reverse.

pub mod dispatcher;
pub mod rails;

pub use dispatcher::{PayoutDispatcher, PayoutOrder, RailRegistry};
pub use rails::{
    CryptoRail, FailingRail, PayoutReceipt, PayoutRequest, RailAdapter, SimulatedRail,
    provider_prefix,
};
