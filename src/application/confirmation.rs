use super::marketplace::{LedgerEntry, Marketplace, MAX_CAS_ATTEMPTS};
use crate::domain::allocator::{split_recorded, Allocation};
use crate::domain::booking::{Booking, BookingStatus, ConfirmationClaim};
use crate::domain::money::Money;
use crate::domain::user::Caller;
use crate::domain::wallet::TransactionKind;
use crate::error::{Result, SettlementError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The values the hosted checkout hands back after a captured payment.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPayment {
    pub booking_id: String,
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub booking_id: String,
    pub status: BookingStatus,
    pub professional_id: Option<String>,
    pub payment_id: Option<String>,
    pub locked_debited: Money,
    pub spendable_debited: Money,
    /// False when the coupon had run out by the time the payment landed.
    pub coupon_counted: bool,
    /// True when an earlier confirmation already settled the booking.
    pub already_confirmed: bool,
}

impl Confirmation {
    fn already_confirmed(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            status: booking.status,
            professional_id: booking.professional_id.clone(),
            payment_id: booking.gateway_payment_id.clone(),
            locked_debited: Money::ZERO,
            spendable_debited: Money::ZERO,
            coupon_counted: false,
            already_confirmed: true,
        }
    }
}

enum Claim {
    Held(Booking),
    AlreadyConfirmed(Booking),
    Busy,
}

/// Side effects committed so far, undone if the confirmation fails.
#[derive(Default)]
struct Applied {
    debit: Option<Allocation>,
    ledger_written: bool,
    coupon: Option<String>,
}

impl Marketplace {
    /// Settles a booking after the gateway reports a captured payment.
    ///
    /// The signature is checked before anything is read. Confirming an
    /// already confirmed booking succeeds without side effects, so clients
    /// may retry freely. Concurrent confirmations of one booking are
    /// serialised through a claim on the booking; the loser gets
    /// `ConfirmationInProgress`. The wallet is split under the policy the
    /// booking was quoted with, not the one configured now.
    pub async fn confirm_payment(&self, caller: &Caller, request: ConfirmPayment) -> Result<Confirmation> {
        if !self.gateway.verify_signature(
            &request.gateway_order_id,
            &request.payment_id,
            &request.signature,
        ) {
            warn!(
                booking_id = %request.booking_id,
                gateway_order_id = %request.gateway_order_id,
                "payment signature rejected"
            );
            return Err(SettlementError::PaymentVerificationFailed);
        }

        let booking = self.booking(&request.booking_id).await?;
        if booking.gateway_order_id.as_deref() != Some(request.gateway_order_id.as_str()) {
            warn!(
                booking_id = %booking.id,
                gateway_order_id = %request.gateway_order_id,
                "payment belongs to another gateway order"
            );
            return Err(SettlementError::PaymentVerificationFailed);
        }
        self.settle(caller, booking, Some(request.payment_id)).await
    }

    /// Settles a booking whose wallet and discount cover the whole cart.
    pub async fn confirm_wallet_payment(&self, caller: &Caller, booking_id: &str) -> Result<Confirmation> {
        let booking = self.booking(booking_id).await?;
        if !booking.payable_amount.is_zero() || booking.gateway_order_id.is_some() {
            return Err(SettlementError::ValidationError(format!(
                "Booking {} still has {} to pay through the gateway",
                booking.id, booking.payable_amount
            )));
        }
        self.settle(caller, booking, None).await
    }

    async fn settle(
        &self,
        caller: &Caller,
        booking: Booking,
        payment_id: Option<String>,
    ) -> Result<Confirmation> {
        Self::ensure_owner(caller, &booking)?;
        if booking.status.is_confirmed() {
            info!(booking_id = %booking.id, "booking already confirmed");
            return Ok(Confirmation::already_confirmed(&booking));
        }

        let token = Uuid::new_v4().to_string();
        let booking = match self.claim(&booking.id, &token).await? {
            Claim::Held(booking) => booking,
            Claim::AlreadyConfirmed(booking) => {
                info!(booking_id = %booking.id, "booking already confirmed");
                return Ok(Confirmation::already_confirmed(&booking));
            }
            Claim::Busy => {
                warn!(booking_id = %booking.id, "confirmation already in flight");
                return Err(SettlementError::ConfirmationInProgress(booking.id));
            }
        };

        let mut applied = Applied::default();
        match self.commit(&booking, &token, payment_id, &mut applied).await {
            Ok(confirmation) => Ok(confirmation),
            Err(err) => {
                warn!(booking_id = %booking.id, error = %err, "confirmation failed, rolling back");
                self.roll_back(&booking, &token, &applied).await;
                Err(err)
            }
        }
    }

    /// Marks the booking as held by `token` while it is pending and unclaimed.
    ///
    /// An abandoned claim is taken over. An expired claim whose holder
    /// already applied effects stays in place until it is reconciled.
    async fn claim(&self, booking_id: &str, token: &str) -> Result<Claim> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.booking(booking_id).await?;
            if current.status.is_confirmed() {
                return Ok(Claim::AlreadyConfirmed(current));
            }
            if current.status != BookingStatus::Pending {
                return Err(SettlementError::InvalidTransition {
                    from: current.status,
                    to: BookingStatus::Accepted,
                });
            }
            let now = Utc::now();
            if let Some(held) = &current.confirmation_claim {
                if !held.is_abandoned(now) {
                    if held.is_expired(now) {
                        warn!(
                            booking_id,
                            claimed_at = %held.claimed_at,
                            "expired confirmation claim has applied effects, needs reconciliation"
                        );
                    }
                    return Ok(Claim::Busy);
                }
                warn!(booking_id, claimed_at = %held.claimed_at, "taking over abandoned confirmation claim");
            }

            let mut claimed = current.clone();
            claimed.confirmation_claim = Some(ConfirmationClaim::new(token, now));
            if self
                .stores
                .bookings
                .compare_and_swap(&claimed, current.version)
                .await?
            {
                claimed.version = current.version + 1;
                return Ok(Claim::Held(claimed));
            }
            // lost the race, the next read shows who won
        }
        Err(SettlementError::Conflict(format!(
            "booking {booking_id} kept changing"
        )))
    }

    fn ensure_claimed(booking: &Booking, token: &str) -> Result<()> {
        if booking.is_claimed_by(token) {
            Ok(())
        } else {
            Err(SettlementError::Conflict(format!(
                "booking {} lost its confirmation claim",
                booking.id
            )))
        }
    }

    async fn commit(
        &self,
        booking: &Booking,
        token: &str,
        payment_id: Option<String>,
        applied: &mut Applied,
    ) -> Result<Confirmation> {
        if !booking.wallet_used.is_zero() || booking.coupon_code.is_some() {
            self.update_booking(&booking.id, |current| {
                Self::ensure_claimed(current, token)?;
                if let Some(claim) = current.confirmation_claim.as_mut() {
                    claim.effects_started = true;
                }
                Ok(())
            })
            .await?;
        }

        let mut debit = Allocation::default();
        if !booking.wallet_used.is_zero() {
            let wallet_used = booking.wallet_used;
            let cart_value = booking.amount;
            let policy = booking.wallet_policy;
            let (user, split) = self
                .update_balances(&booking.user_id, |user| {
                    let split =
                        split_recorded(wallet_used, user.locked_balance, &policy, cart_value);
                    user.debit(split.locked_used, split.spendable_used)?;
                    Ok(split)
                })
                .await?;
            applied.debit = Some(split);
            debit = split;

            self.record(
                &user,
                LedgerEntry {
                    kind: TransactionKind::Debit,
                    amount: -wallet_used.signed(),
                    locked_amount: -split.locked_used.signed(),
                    description: format!("Payment for booking {}", booking.id),
                    reference: Some(booking.id.clone()),
                },
            )
            .await?;
            applied.ledger_written = true;
        }

        let mut coupon_counted = false;
        if let Some(code) = &booking.coupon_code {
            coupon_counted = self.stores.coupons.record_redemption(code).await?;
            if coupon_counted {
                applied.coupon = Some(code.clone());
            } else {
                warn!(
                    booking_id = %booking.id,
                    code = %code,
                    "coupon usage limit reached before confirmation, redemption not counted"
                );
            }
        }

        let professional_id = match self.stores.catalog.first_active_professional().await? {
            Some(professional) => Some(professional.id),
            None => {
                warn!(booking_id = %booking.id, "no active professional to assign");
                None
            }
        };

        let now = Utc::now();
        let (confirmed, ()) = self
            .update_booking(&booking.id, |current| {
                Self::ensure_claimed(current, token)?;
                current.status = BookingStatus::Accepted;
                current.gateway_payment_id = payment_id.clone();
                current.professional_id = professional_id.clone();
                current.confirmed_at = Some(now);
                current.confirmation_claim = None;
                Ok(())
            })
            .await?;

        info!(
            booking_id = %confirmed.id,
            user_id = %confirmed.user_id,
            locked = debit.locked_used.value(),
            spendable = debit.spendable_used.value(),
            professional_id = confirmed.professional_id.as_deref().unwrap_or("-"),
            "booking confirmed"
        );

        Ok(Confirmation {
            booking_id: confirmed.id,
            status: confirmed.status,
            professional_id: confirmed.professional_id,
            payment_id: confirmed.gateway_payment_id,
            locked_debited: debit.locked_used,
            spendable_debited: debit.spendable_used,
            coupon_counted,
            already_confirmed: false,
        })
    }

    /// Undoes whatever `commit` managed to apply and releases the claim.
    ///
    /// Best effort: a failing step is logged and the remaining steps still
    /// run. If anything could not be undone the claim is kept, so no retry
    /// can debit the wallet a second time before the booking is reconciled.
    async fn roll_back(&self, booking: &Booking, token: &str, applied: &Applied) {
        let mut undone = true;
        if let Some(code) = &applied.coupon {
            if let Err(err) = self.stores.coupons.release_redemption(code).await {
                error!(booking_id = %booking.id, code = %code, error = %err, "failed to release coupon redemption");
                undone = false;
            }
        }

        if let Some(split) = applied.debit {
            let refunded = if applied.ledger_written {
                self.credit_recorded(
                    &booking.user_id,
                    split.locked_used,
                    split.spendable_used,
                    TransactionKind::Credit,
                    format!("Reversal of payment for booking {}", booking.id),
                    Some(booking.id.clone()),
                )
                .await
                .map(|_| ())
            } else {
                self.update_balances(&booking.user_id, |user| {
                    user.credit(split.locked_used, split.spendable_used)
                })
                .await
                .map(|_| ())
            };
            if let Err(err) = refunded {
                error!(
                    booking_id = %booking.id,
                    user_id = %booking.user_id,
                    locked = split.locked_used.value(),
                    spendable = split.spendable_used.value(),
                    error = %err,
                    "failed to refund wallet debit"
                );
                undone = false;
            }
        }

        if !undone {
            error!(booking_id = %booking.id, "confirmation left claimed for reconciliation");
            return;
        }
        let released = self
            .update_booking(&booking.id, |current| {
                if current.is_claimed_by(token) {
                    current.confirmation_claim = None;
                }
                Ok(())
            })
            .await;
        if let Err(err) = released {
            error!(booking_id = %booking.id, error = %err, "failed to release confirmation claim");
        }
    }
}
