use crate::domain::booking::BookingStatus;
use crate::domain::coupon::CouponRejection;
use crate::domain::money::Money;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Product,
    Booking,
    Coupon,
    Offer,
    Topup,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Product => "product",
            Entity::Booking => "booking",
            Entity::Coupon => "coupon",
            Entity::Offer => "offer",
            Entity::Topup => "topup",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("{0} not found: {1}")]
    NotFound(Entity, String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Payment verification failed")]
    PaymentVerificationFailed,
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },
    #[error("Coupon rejected: {0}")]
    CouponRejected(CouponRejection),
    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("Review reward already paid for booking {0}")]
    AlreadyRewarded(String),
    #[error("Confirmation already in progress for booking {0}")]
    ConfirmationInProgress(String),
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),
    #[error("Payment gateway error: {0}")]
    GatewayError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    /// Stable machine-readable reason code, paired with the `Display` message
    /// when a failure is reported to a user.
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::NotFound(..) => "not_found",
            SettlementError::Forbidden(_) => "forbidden",
            SettlementError::ValidationError(_) => "validation_failed",
            SettlementError::PaymentVerificationFailed => "payment_verification_failed",
            SettlementError::InsufficientFunds { .. } => "insufficient_funds",
            SettlementError::CouponRejected(reason) => reason.code(),
            SettlementError::InvalidTransition { .. } => "invalid_transition",
            SettlementError::AlreadyRewarded(_) => "already_rewarded",
            SettlementError::ConfirmationInProgress(_) => "confirmation_in_progress",
            SettlementError::Conflict(_) => "conflict",
            SettlementError::GatewayError(_) => "gateway_error",
            SettlementError::InternalError(_) => "internal_error",
        }
    }

    pub(crate) fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        SettlementError::NotFound(entity, id.into())
    }
}

impl From<std::io::Error> for SettlementError {
    fn from(err: std::io::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

impl From<csv::Error> for SettlementError {
    fn from(err: csv::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(err: serde_json::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for SettlementError {
    fn from(err: rocksdb::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(SettlementError::PaymentVerificationFailed.code(), "payment_verification_failed");
        assert_eq!(
            SettlementError::not_found(Entity::Booking, "b-1").code(),
            "not_found"
        );
        let err = SettlementError::CouponRejected(CouponRejection::BelowMinimum {
            shortfall: Money::new(5_000),
        });
        assert_eq!(err.code(), "cart_below_minimum");
    }

    #[test]
    fn test_messages_carry_context() {
        let err = SettlementError::not_found(Entity::Product, "p-9");
        assert_eq!(err.to_string(), "product not found: p-9");

        let err = SettlementError::InsufficientFunds {
            required: Money::new(15_000),
            available: Money::new(9_950),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: required ₹150.00, available ₹99.50"
        );
    }
}
