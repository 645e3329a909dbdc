//! Application layer orchestrating checkout, settlement and wallet flows.
//!
//! This module defines the `Marketplace` service, the primary entry point for
//! every operation. Its methods are grouped by flow: pricing an order,
//! confirming a payment, moving a booking through its lifecycle and managing
//! wallets. State is only shared through the stores, so the service can be
//! driven from many `tokio` tasks at once.

pub mod bookings;
pub mod confirmation;
pub mod marketplace;
pub mod settlement;
pub mod wallet;

pub use confirmation::{ConfirmPayment, Confirmation};
pub use marketplace::{Marketplace, DEFAULT_CURRENCY};
pub use settlement::{CreateOrder, OrderQuote};
pub use wallet::{ConfirmTopup, NewUser, TopupQuote, TopupReceipt, WalletSummary};
