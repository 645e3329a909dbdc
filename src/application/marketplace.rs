use crate::domain::booking::Booking;
use crate::domain::money::Money;
use crate::domain::ports::{PaymentGateway, PaymentGatewayBox, Stores};
use crate::domain::user::{Caller, Role, User};
use crate::domain::wallet::{TransactionKind, WalletConfig, WalletTransaction};
use crate::error::{Entity, Result, SettlementError};
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "INR";

/// Upper bound on optimistic retries before a write gives up with `Conflict`.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 16;

/// The settlement core of the booking marketplace.
///
/// `Marketplace` owns the storage backends and the payment gateway. Every
/// operation is a short async task; the only state shared between tasks lives
/// in the stores and is written through compare-and-swap or conditional
/// updates, so a `Marketplace` can be wrapped in an `Arc` and driven from many
/// tasks at once.
pub struct Marketplace {
    pub(crate) stores: Stores,
    pub(crate) gateway: PaymentGatewayBox,
    pub(crate) currency: String,
}

/// A wallet movement about to be written to the ledger.
pub(crate) struct LedgerEntry {
    pub kind: TransactionKind,
    pub amount: i64,
    pub locked_amount: i64,
    pub description: String,
    pub reference: Option<String>,
}

impl Marketplace {
    /// Creates a new `Marketplace` charging in [`DEFAULT_CURRENCY`].
    ///
    /// # Arguments
    ///
    /// * `stores` - The storage backends for every collection.
    /// * `gateway` - The payment gateway used for hosted checkouts.
    pub fn new(stores: Stores, gateway: PaymentGatewayBox) -> Self {
        Self {
            stores,
            gateway,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.gateway.as_ref()
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Reads the wallet policy, persisting the defaults the first time.
    pub async fn wallet_config(&self) -> Result<WalletConfig> {
        if let Some(config) = self.stores.wallet.wallet_config().await? {
            return Ok(config);
        }
        let config = self
            .stores
            .wallet
            .init_wallet_config(WalletConfig::default())
            .await?;
        info!("no wallet config found, persisted defaults");
        Ok(config)
    }

    pub async fn update_wallet_config(&self, caller: &Caller, config: WalletConfig) -> Result<()> {
        caller.require_admin()?;
        config.validate()?;
        self.stores.wallet.put_wallet_config(config).await?;
        info!(admin = %caller.user_id, "wallet config updated");
        Ok(())
    }

    pub async fn user(&self, user_id: &str) -> Result<User> {
        self.stores
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| SettlementError::not_found(Entity::User, user_id))
    }

    pub async fn booking(&self, booking_id: &str) -> Result<Booking> {
        self.stores
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| SettlementError::not_found(Entity::Booking, booking_id))
    }

    /// Rejects callers acting on a booking that is not theirs, unless admin.
    pub(crate) fn ensure_owner(caller: &Caller, booking: &Booking) -> Result<()> {
        if caller.role == Role::Admin || caller.user_id == booking.user_id {
            Ok(())
        } else {
            Err(SettlementError::Forbidden(format!(
                "booking {} belongs to another user",
                booking.id
            )))
        }
    }

    /// Applies `change` to a user's balances with optimistic retries.
    ///
    /// `change` runs against a fresh read on every attempt; an error from it
    /// aborts without writing.
    pub(crate) async fn update_balances<T, F>(&self, user_id: &str, mut change: F) -> Result<(User, T)>
    where
        F: FnMut(&mut User) -> Result<T> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.user(user_id).await?;
            let mut updated = current.clone();
            let outcome = change(&mut updated)?;
            if self
                .stores
                .users
                .compare_and_swap(&updated, current.version)
                .await?
            {
                updated.version = current.version + 1;
                return Ok((updated, outcome));
            }
            debug!(user_id, attempt, "balance version moved, retrying");
        }
        Err(SettlementError::Conflict(format!(
            "balances of user {user_id} kept changing"
        )))
    }

    /// Same as [`Self::update_balances`], for bookings.
    pub(crate) async fn update_booking<T, F>(
        &self,
        booking_id: &str,
        mut change: F,
    ) -> Result<(Booking, T)>
    where
        F: FnMut(&mut Booking) -> Result<T> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.booking(booking_id).await?;
            let mut updated = current.clone();
            let outcome = change(&mut updated)?;
            if self
                .stores
                .bookings
                .compare_and_swap(&updated, current.version)
                .await?
            {
                updated.version = current.version + 1;
                return Ok((updated, outcome));
            }
            debug!(booking_id, attempt, "booking version moved, retrying");
        }
        Err(SettlementError::Conflict(format!(
            "booking {booking_id} kept changing"
        )))
    }

    /// Credits both pools of a user and records the movement as one entry.
    ///
    /// If the ledger append fails the credit is taken back, so a balance
    /// never moves without its entry.
    pub(crate) async fn credit_recorded(
        &self,
        user_id: &str,
        locked: Money,
        spendable: Money,
        kind: TransactionKind,
        description: String,
        reference: Option<String>,
    ) -> Result<(User, WalletTransaction)> {
        let total = locked
            .checked_add(spendable)
            .ok_or_else(|| SettlementError::ValidationError("credit is too large".to_string()))?;
        let (user, ()) = self
            .update_balances(user_id, |user| user.credit(locked, spendable))
            .await?;
        let entry = LedgerEntry {
            kind,
            amount: total.signed(),
            locked_amount: locked.signed(),
            description,
            reference,
        };
        match self.record(&user, entry).await {
            Ok(tx) => Ok((user, tx)),
            Err(err) => {
                warn!(user_id, kind = %kind, error = %err, "ledger append failed, taking the credit back");
                let undone = self
                    .update_balances(user_id, |user| user.debit(locked, spendable))
                    .await;
                if let Err(undo_err) = undone {
                    error!(
                        user_id,
                        locked = locked.value(),
                        spendable = spendable.value(),
                        error = %undo_err,
                        "credit has no ledger entry and could not be taken back"
                    );
                }
                Err(err)
            }
        }
    }

    /// Appends a ledger entry, snapshotting the balances of `user`.
    pub(crate) async fn record(&self, user: &User, entry: LedgerEntry) -> Result<WalletTransaction> {
        let tx = WalletTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            kind: entry.kind,
            amount: entry.amount,
            locked_amount: entry.locked_amount,
            balance_after: user.spendable_balance,
            locked_balance_after: user.locked_balance,
            description: entry.description,
            reference: entry.reference,
            created_at: Utc::now(),
        };
        self.stores.ledger.append(tx.clone()).await?;
        debug!(user_id = %tx.user_id, kind = %tx.kind, amount = tx.amount, "ledger entry appended");
        Ok(tx)
    }
}
