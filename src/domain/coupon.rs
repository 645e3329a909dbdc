use super::money::{Money, Percentage};
use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DiscountPolicy {
    /// A fixed amount off. Not capped at the cart value here.
    Flat { amount: Money },
    /// A share of the cart value, optionally capped.
    Percentage {
        rate: Percentage,
        #[serde(default)]
        max_discount: Option<Money>,
    },
}

impl DiscountPolicy {
    pub fn validate(&self) -> Result<(), SettlementError> {
        match self {
            DiscountPolicy::Flat { amount } if amount.is_zero() => Err(
                SettlementError::ValidationError("Flat discount must be positive".to_string()),
            ),
            DiscountPolicy::Percentage { rate, .. } if rate.value().is_zero() => Err(
                SettlementError::ValidationError("Discount rate must be positive".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn discount_for(&self, cart_value: Money) -> Money {
        match self {
            DiscountPolicy::Flat { amount } => *amount,
            DiscountPolicy::Percentage { rate, max_discount } => {
                let discount = rate.of(cart_value);
                match max_discount {
                    Some(cap) => discount.min(*cap),
                    None => discount,
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Coupon {
    /// Unique, case-sensitive.
    pub code: String,
    pub discount: DiscountPolicy,
    #[serde(default)]
    pub min_cart_value: Money,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    pub active: bool,
}

impl Coupon {
    pub fn new(code: impl Into<String>, discount: DiscountPolicy) -> Self {
        Self {
            code: code.into(),
            discount,
            min_cart_value: Money::ZERO,
            expiry: None,
            usage_limit: None,
            used_count: 0,
            active: true,
        }
    }

    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.code.trim().is_empty() {
            return Err(SettlementError::ValidationError(
                "Coupon code must not be empty".to_string(),
            ));
        }
        self.discount.validate()
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.used_count >= limit)
    }

    /// Quotes the discount this coupon grants on `cart_value` at `now`.
    ///
    /// Pure: usage is only counted when a booking paid with the coupon is
    /// confirmed.
    pub fn evaluate(&self, cart_value: Money, now: DateTime<Utc>) -> Result<Money, CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if self.expiry.is_some_and(|expiry| now > expiry) {
            return Err(CouponRejection::Expired);
        }
        if self.is_exhausted() {
            return Err(CouponRejection::UsageLimitReached);
        }
        if cart_value < self.min_cart_value {
            return Err(CouponRejection::BelowMinimum {
                shortfall: self.min_cart_value.saturating_sub(cart_value),
            });
        }
        Ok(self.discount.discount_for(cart_value))
    }
}

#[derive(Debug, Serialize, PartialEq, Clone, Copy)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    UsageLimitReached,
    BelowMinimum { shortfall: Money },
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "coupon_not_found",
            CouponRejection::Inactive => "coupon_inactive",
            CouponRejection::Expired => "coupon_expired",
            CouponRejection::UsageLimitReached => "coupon_usage_limit_reached",
            CouponRejection::BelowMinimum { .. } => "cart_below_minimum",
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponRejection::NotFound => f.write_str("coupon code not recognised"),
            CouponRejection::Inactive => f.write_str("coupon is no longer active"),
            CouponRejection::Expired => f.write_str("coupon has expired"),
            CouponRejection::UsageLimitReached => f.write_str("coupon usage limit reached"),
            CouponRejection::BelowMinimum { shortfall } => {
                write!(f, "add {shortfall} more to use this coupon")
            }
        }
    }
}

/// What checkout did with a coupon code.
///
/// A rejected coupon does not block the order; it is carried as `Skipped` so
/// the caller can tell the customer why no discount was applied.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CouponOutcome {
    Applied { code: String, discount: Money },
    Skipped { code: String, reason: CouponRejection },
}

impl CouponOutcome {
    pub fn discount(&self) -> Money {
        match self {
            CouponOutcome::Applied { discount, .. } => *discount,
            CouponOutcome::Skipped { .. } => Money::ZERO,
        }
    }

    pub fn applied_code(&self) -> Option<&str> {
        match self {
            CouponOutcome::Applied { code, .. } => Some(code),
            CouponOutcome::Skipped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn flat(code: &str, amount: u64) -> Coupon {
        Coupon::new(
            code,
            DiscountPolicy::Flat {
                amount: Money::new(amount),
            },
        )
    }

    fn percent(code: &str, rate: rust_decimal::Decimal, cap: Option<u64>) -> Coupon {
        Coupon::new(
            code,
            DiscountPolicy::Percentage {
                rate: Percentage::new(rate).unwrap(),
                max_discount: cap.map(Money::new),
            },
        )
    }

    #[test]
    fn test_flat_discount_within_cart() {
        let coupon = flat("FLAT200", 20_000);
        let discount = coupon.evaluate(Money::new(199_900), Utc::now()).unwrap();
        assert_eq!(discount, Money::new(20_000));
    }

    #[test]
    fn test_flat_discount_is_not_capped_at_cart_value() {
        // Capping to the cart value is left to checkout.
        let coupon = flat("FLAT500", 50_000);
        let discount = coupon.evaluate(Money::new(30_000), Utc::now()).unwrap();
        assert_eq!(discount, Money::new(50_000));
    }

    #[test]
    fn test_percentage_discount_floors_and_caps() {
        let uncapped = percent("TEN", dec!(10), None);
        assert_eq!(
            uncapped.evaluate(Money::new(49_999), Utc::now()).unwrap(),
            Money::new(4_999)
        );

        let capped = percent("TENCAP", dec!(10), Some(3_000));
        assert_eq!(
            capped.evaluate(Money::new(49_999), Utc::now()).unwrap(),
            Money::new(3_000)
        );
        assert_eq!(
            capped.evaluate(Money::new(20_000), Utc::now()).unwrap(),
            Money::new(2_000)
        );
    }

    #[test]
    fn test_rejections_in_order() {
        let now = Utc::now();

        let mut coupon = flat("OFF", 1_000);
        coupon.active = false;
        coupon.expiry = Some(now - Duration::days(1));
        assert_eq!(
            coupon.evaluate(Money::new(10_000), now),
            Err(CouponRejection::Inactive)
        );

        coupon.active = true;
        assert_eq!(
            coupon.evaluate(Money::new(10_000), now),
            Err(CouponRejection::Expired)
        );

        coupon.expiry = Some(now + Duration::days(1));
        coupon.usage_limit = Some(3);
        coupon.used_count = 3;
        assert_eq!(
            coupon.evaluate(Money::new(10_000), now),
            Err(CouponRejection::UsageLimitReached)
        );

        coupon.used_count = 2;
        coupon.min_cart_value = Money::new(50_000);
        assert_eq!(
            coupon.evaluate(Money::new(40_000), now),
            Err(CouponRejection::BelowMinimum {
                shortfall: Money::new(10_000)
            })
        );
        assert_eq!(
            coupon.evaluate(Money::new(50_000), now),
            Ok(Money::new(1_000))
        );
    }

    #[test]
    fn test_shortfall_message() {
        let reason = CouponRejection::BelowMinimum {
            shortfall: Money::new(10_050),
        };
        assert_eq!(reason.to_string(), "add ₹100.50 more to use this coupon");
    }

    #[test]
    fn test_policy_validation() {
        assert!(flat("ZERO", 0).validate().is_err());
        assert!(percent("NONE", dec!(0), None).validate().is_err());
        assert!(flat("", 100).validate().is_err());
        assert!(percent("OK", dec!(5), Some(100)).validate().is_ok());
    }

    #[test]
    fn test_policy_deserialization() {
        let json = r#"{"code":"SPA15","discount":{"percentage":{"rate":15,"max_discount":15000}},"min_cart_value":50000,"active":true}"#;
        let coupon: Coupon = serde_json::from_str(json).unwrap();
        assert_eq!(coupon.used_count, 0);
        assert_eq!(coupon.usage_limit, None);
        assert_eq!(
            coupon.evaluate(Money::new(199_900), Utc::now()).unwrap(),
            Money::new(15_000)
        );
    }
}
