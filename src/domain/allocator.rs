//! Splits an amount owed between the two wallet pools.
//!
//! Locked (promotional) credit is always tried first; spendable credit
//! covers whatever is left.

use super::money::Money;
use super::wallet::WalletPolicy;
use serde::Serialize;

/// Balances read from the user at quote time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletBalances {
    pub spendable: Money,
    pub locked: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Allocation {
    pub locked_used: Money,
    pub spendable_used: Money,
    pub remaining_due: Money,
}

impl Allocation {
    pub fn wallet_used(&self) -> Money {
        self.locked_used + self.spendable_used
    }
}

/// Quotes how much of `owed` the wallet covers.
///
/// `cart_value` is the gross cart value before any discount; it alone decides
/// whether locked credit is eligible.
pub fn allocate(
    balances: WalletBalances,
    policy: &WalletPolicy,
    cart_value: Money,
    owed: Money,
    use_wallet: bool,
) -> Allocation {
    if !use_wallet {
        return Allocation {
            remaining_due: owed,
            ..Allocation::default()
        };
    }

    let locked_used = if !balances.locked.is_zero() && cart_value >= policy.min_cart_for_locked {
        balances
            .locked
            .min(policy.max_locked_per_order)
            .min(owed)
    } else {
        Money::ZERO
    };

    let after_locked = owed.saturating_sub(locked_used);
    let spendable_used = balances.spendable.min(after_locked);

    Allocation {
        locked_used,
        spendable_used,
        remaining_due: after_locked.saturating_sub(spendable_used),
    }
}

/// Decomposes a booking's recorded `wallet_used` into the debit per pool.
///
/// Used at confirmation time instead of re-running [`allocate`], so the debit
/// always matches the amount quoted to the customer even if balances drifted.
/// Locked credit follows the same eligibility rules as the quote: below
/// `min_cart_for_locked` the whole amount comes from the spendable pool, even
/// though `min(locked_balance, max_locked_per_order, wallet_used)` alone would
/// take some locked credit. Pass the policy the quote was computed with.
/// Whether the spendable part is actually available is for the debit to check.
pub fn split_recorded(
    wallet_used: Money,
    locked_balance: Money,
    policy: &WalletPolicy,
    cart_value: Money,
) -> Allocation {
    let locked_used = if cart_value >= policy.min_cart_for_locked {
        locked_balance
            .min(policy.max_locked_per_order)
            .min(wallet_used)
    } else {
        Money::ZERO
    };
    Allocation {
        locked_used,
        spendable_used: wallet_used.saturating_sub(locked_used),
        remaining_due: Money::ZERO,
    }
}
