//! Domain types and the pure pricing rules of the marketplace.
//!
//! Nothing in here performs I/O; storage and the payment gateway are reached
//! through the traits in [`ports`].

pub mod allocator;
pub mod booking;
pub mod coupon;
pub mod money;
pub mod ports;
pub mod user;
pub mod wallet;
