use super::money::Money;
use super::wallet::WalletPolicy;
use crate::error::SettlementError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    OnTheWay,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Position along the fulfilment path. `Cancelled` sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            BookingStatus::Pending => Some(0),
            BookingStatus::Accepted => Some(1),
            BookingStatus::OnTheWay => Some(2),
            BookingStatus::InProgress => Some(3),
            BookingStatus::Completed => Some(4),
            BookingStatus::Cancelled => None,
        }
    }

    /// True once payment has been confirmed and the booking not cancelled.
    pub fn is_confirmed(&self) -> bool {
        self.rank().is_some_and(|rank| rank >= 1)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::OnTheWay => "on_the_way",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Money,
}

impl Product {
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.price.is_zero() {
            return Err(SettlementError::ValidationError(format!(
                "Product {} must have a positive price",
                self.id
            )));
        }
        self.price.ensure_recordable("Product price")
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Professional {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Login account of the professional, when they have one.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Seconds a confirmation may hold a booking before an idle claim expires.
pub const CLAIM_LEASE_SECS: i64 = 120;

/// Marks a booking as being confirmed by the holder of `token`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ConfirmationClaim {
    pub token: String,
    pub claimed_at: DateTime<Utc>,
    /// Set before the holder touches balances or coupons. From then on only
    /// the holder may release the claim.
    #[serde(default)]
    pub effects_started: bool,
}

impl ConfirmationClaim {
    pub fn new(token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            claimed_at: now,
            effects_started: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.claimed_at > Duration::seconds(CLAIM_LEASE_SECS)
    }

    /// An expired claim whose holder never applied anything can be dropped.
    pub fn is_abandoned(&self, now: DateTime<Utc>) -> bool {
        !self.effects_started && self.is_expired(now)
    }
}

/// One purchase of a product by a customer.
///
/// `wallet_used` is the quoted wallet contribution across both pools. It is
/// only debited when the booking is confirmed and is the authoritative value
/// the debit is derived from, split under the `wallet_policy` the quote
/// was computed with.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub address: String,
    /// Full cart value.
    pub amount: Money,
    pub discount_amount: Money,
    pub wallet_used: Money,
    #[serde(default)]
    pub wallet_policy: WalletPolicy,
    pub payable_amount: Money,
    pub coupon_code: Option<String>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    /// Set while a confirmation holds the booking; cleared if it rolls back.
    #[serde(default)]
    pub confirmation_claim: Option<ConfirmationClaim>,
    pub professional_id: Option<String>,
    pub status: BookingStatus,
    #[serde(default)]
    pub review_given: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl Booking {
    /// True while a confirmation holds a claim that is not abandoned.
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.confirmation_claim
            .as_ref()
            .is_some_and(|claim| !claim.is_abandoned(now))
    }

    pub fn is_claimed_by(&self, token: &str) -> bool {
        self.confirmation_claim
            .as_ref()
            .is_some_and(|claim| claim.token == token)
    }

    /// Moves the booking along its lifecycle on behalf of staff.
    ///
    /// Returns `Ok(false)` when `to` is already the current status. Entering
    /// `accepted` is reserved for payment confirmation.
    pub fn transition(&mut self, to: BookingStatus, now: DateTime<Utc>) -> Result<bool, SettlementError> {
        let from = self.status;
        if from == to {
            return Ok(false);
        }

        let allowed = match (from.rank(), to.rank()) {
            _ if from.is_terminal() => false,
            (_, None) => true,
            (Some(0), _) => false,
            (Some(current), Some(next)) => next > current && to != BookingStatus::Accepted,
            (None, _) => false,
        };
        if !allowed {
            return Err(SettlementError::InvalidTransition { from, to });
        }

        self.status = to;
        match to {
            BookingStatus::InProgress => {
                self.started_at.get_or_insert(now);
            }
            BookingStatus::Completed => {
                self.completed_at.get_or_insert(now);
            }
            _ => {}
        }
        Ok(true)
    }
}
