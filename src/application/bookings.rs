use super::marketplace::Marketplace;
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::money::Money;
use crate::domain::user::{Caller, Role};
use crate::domain::wallet::{TransactionKind, WalletTransaction};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use tracing::{error, info, warn};

impl Marketplace {
    /// Moves a confirmed booking along its fulfilment path.
    ///
    /// Re-setting the current status succeeds and keeps the first timestamp.
    /// A claim abandoned by a confirmation that never applied anything does
    /// not block the update and is dropped with it.
    pub async fn update_booking_status(
        &self,
        caller: &Caller,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<Booking> {
        caller.require_staff()?;
        let now = Utc::now();
        let (booking, changed) = self
            .update_booking(booking_id, |booking| {
                if booking.is_held(now) {
                    return Err(SettlementError::ConfirmationInProgress(booking.id.clone()));
                }
                if booking.confirmation_claim.take().is_some() {
                    warn!(booking_id = %booking.id, "dropping abandoned confirmation claim");
                }
                booking.transition(status, now)
            })
            .await?;
        if changed {
            info!(booking_id, status = %status, by = %caller.user_id, "booking status updated");
        }
        Ok(booking)
    }

    /// Pays the review reward for a completed booking, at most once.
    pub async fn reward_review(&self, caller: &Caller, booking_id: &str) -> Result<WalletTransaction> {
        caller.require_staff()?;
        let reward = self.wallet_config().await?.review_reward_amount;
        if reward.is_zero() {
            return Err(SettlementError::ValidationError(
                "Review rewards are disabled".to_string(),
            ));
        }

        let (booking, ()) = self
            .update_booking(booking_id, |booking| {
                if booking.review_given {
                    return Err(SettlementError::AlreadyRewarded(booking.id.clone()));
                }
                if booking.status != BookingStatus::Completed {
                    return Err(SettlementError::ValidationError(format!(
                        "Booking {} is {}, only completed bookings earn a review reward",
                        booking.id, booking.status
                    )));
                }
                booking.review_given = true;
                Ok(())
            })
            .await?;

        let credited = self
            .credit_recorded(
                &booking.user_id,
                Money::ZERO,
                reward,
                TransactionKind::ReviewReward,
                format!("Review reward for booking {}", booking.id),
                Some(booking.id.clone()),
            )
            .await;
        let (user, tx) = match credited {
            Ok(credited) => credited,
            Err(err) => {
                error!(booking_id, error = %err, "review reward not paid, clearing flag");
                let cleared = self
                    .update_booking(booking_id, |booking| {
                        booking.review_given = false;
                        Ok(())
                    })
                    .await;
                if let Err(clear_err) = cleared {
                    error!(booking_id, error = %clear_err, "failed to clear review flag");
                }
                return Err(err);
            }
        };
        info!(booking_id, user_id = %user.id, amount = reward.value(), "review reward paid");
        Ok(tx)
    }

    /// Bookings visible to the caller, newest first.
    ///
    /// Customers see their own, professionals the ones assigned to them and
    /// admins everything.
    pub async fn bookings_for(&self, caller: &Caller) -> Result<Vec<Booking>> {
        let all = self.stores.bookings.all_bookings().await?;
        let mut visible: Vec<Booking> = match caller.role {
            Role::Admin => all,
            Role::Customer => all
                .into_iter()
                .filter(|booking| booking.user_id == caller.user_id)
                .collect(),
            Role::Professional => {
                match self
                    .stores
                    .catalog
                    .professional_for_user(&caller.user_id)
                    .await?
                {
                    Some(professional) => all
                        .into_iter()
                        .filter(|booking| {
                            booking.professional_id.as_deref() == Some(professional.id.as_str())
                        })
                        .collect(),
                    None => Vec::new(),
                }
            }
        };
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(visible)
    }
}
