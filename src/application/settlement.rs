use super::marketplace::Marketplace;
use crate::domain::allocator::{allocate, Allocation, WalletBalances};
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::coupon::{CouponOutcome, CouponRejection};
use crate::domain::money::Money;
use crate::domain::user::Caller;
use crate::error::{Entity, Result, SettlementError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// A customer's checkout request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub product_id: String,
    pub address: String,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub use_wallet: bool,
}

/// What the customer has to pay, and where.
#[derive(Debug, Clone, Serialize)]
pub struct OrderQuote {
    pub booking_id: String,
    /// Absent when the wallet and discount cover the whole cart.
    pub gateway_order_id: Option<String>,
    pub gateway_key_id: String,
    pub currency: String,
    pub cart_value: Money,
    pub discount_amount: Money,
    pub wallet_used: Money,
    pub allocation: Allocation,
    pub payable_amount: Money,
    pub coupon: Option<CouponOutcome>,
}

impl Marketplace {
    /// Previews a coupon against a cart value without reserving a use.
    pub async fn validate_coupon(&self, code: &str, cart_value: Money) -> Result<Money> {
        if cart_value.is_zero() {
            return Err(SettlementError::ValidationError(
                "Cart value must be positive".to_string(),
            ));
        }
        self.quote_coupon(code, cart_value)
            .await?
            .map_err(SettlementError::CouponRejected)
    }

    async fn quote_coupon(
        &self,
        code: &str,
        cart_value: Money,
    ) -> Result<std::result::Result<Money, CouponRejection>> {
        let Some(coupon) = self.stores.coupons.get(code).await? else {
            return Ok(Err(CouponRejection::NotFound));
        };
        Ok(coupon.evaluate(cart_value, Utc::now()))
    }

    /// Prices a checkout and records it as a pending booking.
    ///
    /// Nothing is debited or counted here: the wallet contribution and the
    /// coupon are settled only when the payment is confirmed. A coupon that
    /// does not apply is reported in the quote and the order proceeds at full
    /// price.
    pub async fn create_order(&self, caller: &Caller, request: CreateOrder) -> Result<OrderQuote> {
        if request.address.trim().is_empty() {
            return Err(SettlementError::ValidationError(
                "Service address must not be empty".to_string(),
            ));
        }
        let product = self
            .stores
            .catalog
            .get_product(&request.product_id)
            .await?
            .ok_or_else(|| SettlementError::not_found(Entity::Product, &request.product_id))?;
        let user = self.user(&caller.user_id).await?;
        let cart_value = product.price;

        let coupon = match request.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(match self.quote_coupon(code, cart_value).await? {
                Ok(discount) => CouponOutcome::Applied {
                    code: code.to_string(),
                    discount: discount.min(cart_value),
                },
                Err(reason) => {
                    info!(code, reason = reason.code(), "coupon not applied");
                    CouponOutcome::Skipped {
                        code: code.to_string(),
                        reason,
                    }
                }
            }),
            _ => None,
        };
        let discount_amount = coupon.as_ref().map_or(Money::ZERO, CouponOutcome::discount);
        let owed = cart_value.saturating_sub(discount_amount);

        let policy = self.wallet_config().await?.policy();
        let balances = WalletBalances {
            spendable: user.spendable_balance,
            locked: user.locked_balance,
        };
        let allocation = allocate(balances, &policy, cart_value, owed, request.use_wallet);

        let gateway_order = if allocation.remaining_due.is_zero() {
            None
        } else {
            Some(
                self.gateway
                    .create_order(allocation.remaining_due, &self.currency)
                    .await?,
            )
        };

        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            product_id: product.id.clone(),
            address: request.address.trim().to_string(),
            amount: cart_value,
            discount_amount,
            wallet_used: allocation.wallet_used(),
            wallet_policy: policy,
            payable_amount: allocation.remaining_due,
            coupon_code: coupon
                .as_ref()
                .and_then(CouponOutcome::applied_code)
                .map(str::to_string),
            gateway_order_id: gateway_order.as_ref().map(|order| order.id.clone()),
            gateway_payment_id: None,
            confirmation_claim: None,
            professional_id: None,
            status: BookingStatus::Pending,
            review_given: false,
            created_at: Utc::now(),
            confirmed_at: None,
            started_at: None,
            completed_at: None,
            version: 0,
        };
        if let Err(err) = self.stores.bookings.insert(booking.clone()).await {
            if let Some(order) = &gateway_order {
                warn!(gateway_order_id = %order.id, error = %err, "booking not stored, gateway order left unused");
            }
            return Err(err);
        }

        info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            cart = cart_value.value(),
            discount = discount_amount.value(),
            wallet = booking.wallet_used.value(),
            payable = booking.payable_amount.value(),
            "order created"
        );

        Ok(OrderQuote {
            booking_id: booking.id,
            gateway_order_id: booking.gateway_order_id,
            gateway_key_id: self.gateway.key_id().to_string(),
            currency: self.currency.clone(),
            cart_value,
            discount_amount,
            wallet_used: booking.wallet_used,
            allocation,
            payable_amount: booking.payable_amount,
            coupon,
        })
    }
}
