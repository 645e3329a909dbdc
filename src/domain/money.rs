use crate::error::SettlementError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// A non-negative amount of money in minor currency units (paise).
///
/// There is no fractional unit below one paisa; every discount, cashback and
/// wallet movement is rounded down to a whole `Money` value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Self = Self(0);
    /// Largest amount the signed ledger can record.
    pub const MAX: Self = Self(i64::MAX as u64);

    pub const fn new(paise: u64) -> Self {
        Self(paise)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Sum that stays within [`Money::MAX`].
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_add(rhs.0)
            .filter(|sum| *sum <= Self::MAX.0)
            .map(Self)
    }

    /// Rejects amounts the ledger cannot record.
    pub fn ensure_recordable(&self, what: &str) -> Result<(), SettlementError> {
        if *self > Self::MAX {
            return Err(SettlementError::ValidationError(format!(
                "{what} exceeds the largest recordable amount"
            )));
        }
        Ok(())
    }

    /// Signed view used by ledger entries. Every stored balance is at most
    /// [`Money::MAX`], so the conversion is exact for them.
    pub fn signed(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl From<u64> for Money {
    fn from(paise: u64) -> Self {
        Self(paise)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// A percentage rate between 0 and 100 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, SettlementError> {
        if value >= Decimal::ZERO && value <= Decimal::ONE_HUNDRED {
            Ok(Self(value))
        } else {
            Err(SettlementError::ValidationError(format!(
                "Percentage must be between 0 and 100, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// `floor(base * rate / 100)`.
    pub fn of(&self, base: Money) -> Money {
        let raw = Decimal::from(base.value()) * self.0 / Decimal::ONE_HUNDRED;
        Money::new(raw.floor().to_u64().unwrap_or(0))
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = SettlementError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(rate: Percentage) -> Self {
        rate.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(1_000);
        let b = Money::new(250);
        assert_eq!(a + b, Money::new(1_250));
        assert_eq!(a.saturating_sub(b), Money::new(750));
        assert_eq!(b.saturating_sub(a), Money::ZERO);
        assert_eq!(b.checked_sub(a), None);
        assert_eq!([a, b, b].into_iter().sum::<Money>(), Money::new(1_500));
    }

    #[test]
    fn test_checked_add_stops_at_ledger_limit() {
        assert_eq!(
            Money::new(1).checked_add(Money::new(2)),
            Some(Money::new(3))
        );
        assert_eq!(Money::MAX.checked_add(Money::new(1)), None);
        assert_eq!(Money::new(u64::MAX).checked_add(Money::new(1)), None);
        assert_eq!(Money::MAX.signed(), i64::MAX);
        assert!(Money::MAX.ensure_recordable("credit").is_ok());
        assert!(matches!(
            Money::new(u64::MAX).ensure_recordable("credit"),
            Err(SettlementError::ValidationError(_))
        ));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(199_900).to_string(), "₹1999.00");
        assert_eq!(Money::new(5).to_string(), "₹0.05");
    }

    #[test]
    fn test_percentage_validation() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(matches!(
            Percentage::new(dec!(-1)),
            Err(SettlementError::ValidationError(_))
        ));
        assert!(matches!(
            Percentage::new(dec!(100.5)),
            Err(SettlementError::ValidationError(_))
        ));
    }

    #[test]
    fn test_percentage_floors() {
        let rate = Percentage::new(dec!(15)).unwrap();
        // 15% of 999 = 149.85
        assert_eq!(rate.of(Money::new(999)), Money::new(149));

        let rate = Percentage::new(dec!(12.5)).unwrap();
        assert_eq!(rate.of(Money::new(10_001)), Money::new(1_250));
    }

    #[test]
    fn test_percentage_deserializes_from_number() {
        let rate: Percentage = serde_json::from_str("10").unwrap();
        assert_eq!(rate.value(), dec!(10));
        assert!(serde_json::from_str::<Percentage>("150").is_err());
    }
}
