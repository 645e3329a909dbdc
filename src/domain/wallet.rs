use super::money::{Money, Percentage};
use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
    Topup,
    Cashback,
    WelcomeBonus,
    ReviewReward,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
            TransactionKind::Topup => "topup",
            TransactionKind::Cashback => "cashback",
            TransactionKind::WelcomeBonus => "welcome_bonus",
            TransactionKind::ReviewReward => "review_reward",
        };
        f.write_str(name)
    }
}

/// One immutable entry in a user's wallet ledger.
///
/// `amount` is the signed movement across both pools and `locked_amount` is
/// the part of it that touched the locked pool. Summing
/// `amount - locked_amount` over a user's entries yields the spendable
/// balance; summing `locked_amount` yields the locked balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    #[serde(default)]
    pub locked_amount: i64,
    pub balance_after: Money,
    pub locked_balance_after: Money,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn spendable_amount(&self) -> i64 {
        self.amount - self.locked_amount
    }
}

/// The parts of [`WalletConfig`] the allocator needs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct WalletPolicy {
    pub min_cart_for_locked: Money,
    pub max_locked_per_order: Money,
}

impl Default for WalletPolicy {
    fn default() -> Self {
        WalletConfig::default().policy()
    }
}

/// Singleton wallet policy. A missing record means "use the defaults".
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletConfig {
    pub welcome_bonus_enabled: bool,
    pub welcome_bonus_amount: Money,
    pub min_cart_for_locked: Money,
    pub max_locked_per_order: Money,
    pub review_reward_amount: Money,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            welcome_bonus_enabled: true,
            welcome_bonus_amount: Money::new(10_000),
            min_cart_for_locked: Money::new(20_000),
            max_locked_per_order: Money::new(10_000),
            review_reward_amount: Money::new(5_000),
        }
    }
}

impl WalletConfig {
    pub fn policy(&self) -> WalletPolicy {
        WalletPolicy {
            min_cart_for_locked: self.min_cart_for_locked,
            max_locked_per_order: self.max_locked_per_order,
        }
    }

    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.welcome_bonus_enabled && self.welcome_bonus_amount.is_zero() {
            return Err(SettlementError::ValidationError(
                "Welcome bonus is enabled but its amount is zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A top-up promotion: pay `amount`, receive a capped percentage back.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletOffer {
    pub id: String,
    pub amount: Money,
    pub cashback_percentage: Percentage,
    pub max_cashback: Money,
}

impl WalletOffer {
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.amount.is_zero() {
            return Err(SettlementError::ValidationError(
                "Offer amount must be positive".to_string(),
            ));
        }
        self.amount.ensure_recordable("Offer amount")?;
        self.max_cashback.ensure_recordable("Offer cashback cap")
    }

    pub fn cashback(&self) -> Money {
        self.cashback_percentage.of(self.amount).min(self.max_cashback)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TopupStatus {
    Pending,
    Completed,
}

/// A wallet top-up awaiting (or past) gateway payment, keyed by gateway order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Topup {
    pub gateway_order_id: String,
    pub user_id: String,
    pub offer_id: String,
    pub amount: Money,
    pub cashback: Money,
    pub status: TopupStatus,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_offer_cashback_is_capped() {
        let offer = WalletOffer {
            id: "o-1".to_string(),
            amount: Money::new(200_000),
            cashback_percentage: Percentage::new(dec!(10)).unwrap(),
            max_cashback: Money::new(15_000),
        };
        assert_eq!(offer.cashback(), Money::new(15_000));

        let offer = WalletOffer {
            amount: Money::new(50_000),
            ..offer
        };
        assert_eq!(offer.cashback(), Money::new(5_000));
    }

    #[test]
    fn test_offer_amount_must_be_recordable() {
        let offer = WalletOffer {
            id: "o-big".to_string(),
            amount: Money::new(u64::MAX),
            cashback_percentage: Percentage::new(dec!(1)).unwrap(),
            max_cashback: Money::ZERO,
        };
        assert!(matches!(
            offer.validate(),
            Err(SettlementError::ValidationError(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = WalletConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy().max_locked_per_order, Money::new(10_000));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&TransactionKind::WelcomeBonus).unwrap();
        assert_eq!(json, "\"welcome_bonus\"");
        assert_eq!(TransactionKind::ReviewReward.to_string(), "review_reward");
    }
}
