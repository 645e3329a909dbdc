use super::money::Money;
use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Professional,
    Admin,
}

impl Role {
    /// Professionals and admins may move bookings along and confirm rewards.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Professional | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Customer => "customer",
            Role::Professional => "professional",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// An authenticated identity handed to the core by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn require_admin(&self) -> Result<(), SettlementError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(SettlementError::Forbidden(format!(
                "{} {} is not an admin",
                self.role, self.user_id
            )))
        }
    }

    pub fn require_staff(&self) -> Result<(), SettlementError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(SettlementError::Forbidden(format!(
                "{} {} cannot manage bookings",
                self.role, self.user_id
            )))
        }
    }
}

/// A marketplace user together with both wallet pools.
///
/// `version` is bumped by the store on every balance write and is the
/// token for optimistic compare-and-swap updates.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Freely usable credit: top-ups, cashback, rewards.
    pub spendable_balance: Money,
    /// Promotional credit, redeemable only under the wallet policy.
    pub locked_balance: Money,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            role,
            spendable_balance: Money::ZERO,
            locked_balance: Money::ZERO,
            version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn caller(&self) -> Caller {
        Caller::new(self.id.clone(), self.role)
    }

    /// Removes funds from both pools, failing closed if either pool is short.
    pub fn debit(&mut self, locked: Money, spendable: Money) -> Result<(), SettlementError> {
        let new_locked =
            self.locked_balance
                .checked_sub(locked)
                .ok_or(SettlementError::InsufficientFunds {
                    required: locked,
                    available: self.locked_balance,
                })?;
        let new_spendable = self.spendable_balance.checked_sub(spendable).ok_or(
            SettlementError::InsufficientFunds {
                required: spendable,
                available: self.spendable_balance,
            },
        )?;
        self.locked_balance = new_locked;
        self.spendable_balance = new_spendable;
        Ok(())
    }

    /// Adds funds to both pools, refusing balances the ledger cannot record.
    pub fn credit(&mut self, locked: Money, spendable: Money) -> Result<(), SettlementError> {
        let overflow = || {
            SettlementError::ValidationError(format!(
                "credit would push the wallet of {} past the largest recordable balance",
                self.id
            ))
        };
        let new_locked = self.locked_balance.checked_add(locked).ok_or_else(overflow)?;
        let new_spendable = self
            .spendable_balance
            .checked_add(spendable)
            .ok_or_else(overflow)?;
        self.locked_balance = new_locked;
        self.spendable_balance = new_spendable;
        Ok(())
    }
}
