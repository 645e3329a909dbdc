use crate::domain::money::Money;
use crate::domain::user::User;
use crate::domain::wallet::{TransactionKind, WalletTransaction};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Final balances of one user. Amounts are in paise.
#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    user: &'a str,
    spendable: Money,
    locked: Money,
    transactions: usize,
}

#[derive(Debug, Serialize)]
struct LedgerRow<'a> {
    user: &'a str,
    id: &'a str,
    kind: TransactionKind,
    amount: i64,
    locked_amount: i64,
    balance_after: Money,
    locked_balance_after: Money,
    reference: Option<&'a str>,
    description: &'a str,
    created_at: String,
}

/// Writes the final marketplace state as CSV.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// One row per user, ordered by user id.
    pub fn write_balances(&mut self, mut users: Vec<(User, usize)>) -> Result<()> {
        users.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        for (user, transactions) in &users {
            self.writer.serialize(BalanceRow {
                user: &user.id,
                spendable: user.spendable_balance,
                locked: user.locked_balance,
                transactions: *transactions,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Every ledger entry, grouped by user in id order, oldest first.
    pub fn write_ledger(&mut self, mut entries: Vec<(String, Vec<WalletTransaction>)>) -> Result<()> {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (user_id, history) in &entries {
            for tx in history {
                self.writer.serialize(LedgerRow {
                    user: user_id,
                    id: &tx.id,
                    kind: tx.kind,
                    amount: tx.amount,
                    locked_amount: tx.locked_amount,
                    balance_after: tx.balance_after,
                    locked_balance_after: tx.locked_balance_after,
                    reference: tx.reference.as_deref(),
                    description: &tx.description,
                    created_at: tx.created_at.to_rfc3339(),
                })?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}
