use super::command_reader::Command;
use crate::application::{ConfirmPayment, ConfirmTopup, CreateOrder, Marketplace, NewUser};
use crate::domain::booking::{Product, Professional};
use crate::domain::user::{Caller, Role};
use crate::error::{Entity, Result, SettlementError};
use crate::infrastructure::gateway::HmacGateway;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

/// Identity used for seeding commands that need admin rights.
pub const SEED_ADMIN: &str = "system";

#[derive(Debug, Clone)]
struct BookingRef {
    id: String,
    user_id: String,
    gateway_order_id: Option<String>,
}

#[derive(Debug, Clone)]
struct TopupRef {
    gateway_order_id: String,
    user_id: String,
}

/// Applies script commands to a [`Marketplace`], one at a time.
pub struct ScriptRunner {
    marketplace: Marketplace,
    signer: Option<HmacGateway>,
    bookings: HashMap<String, BookingRef>,
    topups: HashMap<String, TopupRef>,
}

impl ScriptRunner {
    pub fn new(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            signer: None,
            bookings: HashMap::new(),
            topups: HashMap::new(),
        }
    }

    /// Lets the runner sign payments that arrive without a signature.
    pub fn with_signer(mut self, signer: HmacGateway) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn marketplace(&self) -> &Marketplace {
        &self.marketplace
    }

    pub fn into_marketplace(self) -> Marketplace {
        self.marketplace
    }

    async fn caller(&self, user_id: &str) -> Result<Caller> {
        Ok(self.marketplace.user(user_id).await?.caller())
    }

    fn booking(&self, alias: &str) -> Result<&BookingRef> {
        self.bookings
            .get(alias)
            .ok_or_else(|| SettlementError::not_found(Entity::Booking, alias))
    }

    fn signature(&self, given: Option<String>, order_id: &str, payment_id: &str) -> Result<String> {
        match (given, &self.signer) {
            (Some(signature), _) => Ok(signature),
            (None, Some(signer)) => signer.sign(order_id, payment_id),
            (None, None) => Err(SettlementError::ValidationError(
                "payment has no signature and no signing key is configured".to_string(),
            )),
        }
    }

    /// Applies one command.
    pub async fn apply(&mut self, command: Command) -> Result<()> {
        let admin = Caller::new(SEED_ADMIN, Role::Admin);
        let market = &self.marketplace;
        match command {
            Command::RegisterUser {
                id,
                email,
                name,
                role,
            } => {
                market
                    .register_user(NewUser {
                        email: email.unwrap_or_else(|| format!("{id}@example.com")),
                        name: name.unwrap_or_else(|| id.clone()),
                        id,
                        role,
                    })
                    .await?;
            }
            Command::AddProduct { id, name, price } => {
                market
                    .add_product(&admin, Product { id, name, price })
                    .await?;
            }
            Command::AddProfessional {
                id,
                name,
                active,
                user_id,
            } => {
                market
                    .add_professional(
                        &admin,
                        Professional {
                            id,
                            name,
                            active,
                            user_id,
                            created_at: Utc::now(),
                        },
                    )
                    .await?;
            }
            Command::CreateCoupon(coupon) => market.create_coupon(&admin, coupon).await?,
            Command::CreateOffer(offer) => market.create_offer(&admin, offer).await?,
            Command::SetWalletConfig(config) => market.update_wallet_config(&admin, config).await?,
            Command::CreateOrder {
                user,
                booking,
                product_id,
                address,
                coupon_code,
                use_wallet,
            } => {
                if self.bookings.contains_key(&booking) {
                    return Err(SettlementError::ValidationError(format!(
                        "booking alias {booking} is already in use"
                    )));
                }
                let caller = self.caller(&user).await?;
                let quote = market
                    .create_order(
                        &caller,
                        CreateOrder {
                            product_id,
                            address,
                            coupon_code,
                            use_wallet,
                        },
                    )
                    .await?;
                info!(alias = %booking, booking_id = %quote.booking_id, payable = quote.payable_amount.value(), "order opened");
                self.bookings.insert(
                    booking,
                    BookingRef {
                        id: quote.booking_id,
                        user_id: caller.user_id,
                        gateway_order_id: quote.gateway_order_id,
                    },
                );
            }
            Command::Pay {
                booking,
                payment_id,
                signature,
                user,
            } => {
                let target = self.booking(&booking)?.clone();
                let order_id = target.gateway_order_id.clone().ok_or_else(|| {
                    SettlementError::ValidationError(format!(
                        "booking {booking} has nothing to pay through the gateway"
                    ))
                })?;
                let signature = self.signature(signature, &order_id, &payment_id)?;
                let caller = self.caller(user.as_deref().unwrap_or(&target.user_id)).await?;
                let confirmation = self
                    .marketplace
                    .confirm_payment(
                        &caller,
                        ConfirmPayment {
                            booking_id: target.id,
                            gateway_order_id: order_id,
                            payment_id,
                            signature,
                        },
                    )
                    .await?;
                info!(alias = %booking, already_confirmed = confirmation.already_confirmed, "payment applied");
            }
            Command::ConfirmWallet { booking, user } => {
                let target = self.booking(&booking)?.clone();
                let caller = self.caller(user.as_deref().unwrap_or(&target.user_id)).await?;
                self.marketplace
                    .confirm_wallet_payment(&caller, &target.id)
                    .await?;
            }
            Command::ValidateCoupon { code, cart_value } => {
                let discount = market.validate_coupon(&code, cart_value).await?;
                info!(code = %code, discount = discount.value(), "coupon valid");
            }
            Command::UpdateStatus {
                user,
                booking,
                status,
            } => {
                let target = self.booking(&booking)?.id.clone();
                let caller = self.caller(&user).await?;
                self.marketplace
                    .update_booking_status(&caller, &target, status)
                    .await?;
            }
            Command::RewardReview { user, booking } => {
                let target = self.booking(&booking)?.id.clone();
                let caller = self.caller(&user).await?;
                self.marketplace.reward_review(&caller, &target).await?;
            }
            Command::CreateTopup {
                user,
                topup,
                offer_id,
            } => {
                let caller = self.caller(&user).await?;
                let quote = market.create_topup(&caller, &offer_id).await?;
                self.topups.insert(
                    topup,
                    TopupRef {
                        gateway_order_id: quote.gateway_order_id,
                        user_id: caller.user_id,
                    },
                );
            }
            Command::PayTopup {
                topup,
                payment_id,
                signature,
            } => {
                let target = self
                    .topups
                    .get(&topup)
                    .cloned()
                    .ok_or_else(|| SettlementError::not_found(Entity::Topup, &topup))?;
                let signature = self.signature(signature, &target.gateway_order_id, &payment_id)?;
                let caller = self.caller(&target.user_id).await?;
                self.marketplace
                    .confirm_topup(
                        &caller,
                        ConfirmTopup {
                            gateway_order_id: target.gateway_order_id,
                            payment_id,
                            signature,
                        },
                    )
                    .await?;
            }
            Command::Credit {
                user,
                to,
                amount,
                description,
            } => {
                let caller = self.caller(&user).await?;
                market.credit_wallet(&caller, &to, amount, description).await?;
            }
        }
        Ok(())
    }
}
