use super::marketplace::Marketplace;
use crate::domain::booking::{Product, Professional};
use crate::domain::coupon::Coupon;
use crate::domain::money::Money;
use crate::domain::user::{Caller, Role, User};
use crate::domain::wallet::{Topup, TopupStatus, TransactionKind, WalletOffer, WalletTransaction};
use crate::error::{Entity, Result, SettlementError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub user_id: String,
    pub spendable_balance: Money,
    pub locked_balance: Money,
    pub total_balance: Money,
    /// Newest first.
    pub transactions: Vec<WalletTransaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopupQuote {
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub currency: String,
    pub amount: Money,
    pub cashback: Money,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmTopup {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopupReceipt {
    pub gateway_order_id: String,
    pub amount: Money,
    pub cashback: Money,
    pub spendable_balance: Money,
    /// True when an earlier confirmation already credited this top-up.
    pub already_applied: bool,
}

impl Marketplace {
    /// Creates a user, granting the welcome bonus to new customers.
    ///
    /// The bonus lands in the locked pool and is written to the ledger.
    pub async fn register_user(&self, new_user: NewUser) -> Result<User> {
        if new_user.id.trim().is_empty() {
            return Err(SettlementError::ValidationError(
                "User id must not be empty".to_string(),
            ));
        }
        let config = self.wallet_config().await?;
        let mut user = User::new(new_user.id, new_user.email, new_user.name, new_user.role);
        let bonus = if config.welcome_bonus_enabled && user.role == Role::Customer {
            config.welcome_bonus_amount
        } else {
            Money::ZERO
        };
        self.stores.users.insert(user.clone()).await?;

        if !bonus.is_zero() {
            let user_id = user.id.clone();
            (user, _) = self
                .credit_recorded(
                    &user_id,
                    bonus,
                    Money::ZERO,
                    TransactionKind::WelcomeBonus,
                    "Welcome bonus".to_string(),
                    None,
                )
                .await?;
        }
        info!(user_id = %user.id, role = %user.role, bonus = bonus.value(), "user registered");
        Ok(user)
    }

    pub async fn wallet_summary(&self, caller: &Caller) -> Result<WalletSummary> {
        let user = self.user(&caller.user_id).await?;
        let mut transactions = self.stores.ledger.history(&user.id).await?;
        transactions.reverse();
        Ok(WalletSummary {
            total_balance: user.spendable_balance + user.locked_balance,
            user_id: user.id,
            spendable_balance: user.spendable_balance,
            locked_balance: user.locked_balance,
            transactions,
        })
    }

    /// Adds spendable credit on behalf of an admin.
    pub async fn credit_wallet(
        &self,
        caller: &Caller,
        user_id: &str,
        amount: Money,
        description: Option<String>,
    ) -> Result<WalletTransaction> {
        caller.require_admin()?;
        if amount.is_zero() {
            return Err(SettlementError::ValidationError(
                "Credit amount must be positive".to_string(),
            ));
        }
        amount.ensure_recordable("Credit amount")?;
        let (_, tx) = self
            .credit_recorded(
                user_id,
                Money::ZERO,
                amount,
                TransactionKind::Credit,
                description.unwrap_or_else(|| "Admin credit".to_string()),
                Some(caller.user_id.clone()),
            )
            .await?;
        info!(user_id, amount = amount.value(), admin = %caller.user_id, "wallet credited");
        Ok(tx)
    }

    /// Opens a gateway order for a top-up offer.
    pub async fn create_topup(&self, caller: &Caller, offer_id: &str) -> Result<TopupQuote> {
        let offer = self
            .stores
            .wallet
            .get_offer(offer_id)
            .await?
            .ok_or_else(|| SettlementError::not_found(Entity::Offer, offer_id))?;
        let user = self.user(&caller.user_id).await?;
        let order = self.gateway.create_order(offer.amount, &self.currency).await?;
        let cashback = offer.cashback();
        let topup = Topup {
            gateway_order_id: order.id.clone(),
            user_id: user.id,
            offer_id: offer.id,
            amount: offer.amount,
            cashback,
            status: TopupStatus::Pending,
            payment_id: None,
            created_at: Utc::now(),
        };
        self.stores.wallet.insert_topup(topup.clone()).await?;
        info!(
            user_id = %topup.user_id,
            gateway_order_id = %order.id,
            amount = topup.amount.value(),
            cashback = topup.cashback.value(),
            "top-up order opened"
        );
        Ok(TopupQuote {
            gateway_order_id: order.id,
            gateway_key_id: self.gateway.key_id().to_string(),
            currency: order.currency,
            amount: topup.amount,
            cashback: topup.cashback,
        })
    }

    /// Credits a paid top-up and its cashback to the spendable pool, once.
    pub async fn confirm_topup(&self, caller: &Caller, request: ConfirmTopup) -> Result<TopupReceipt> {
        if !self.gateway.verify_signature(
            &request.gateway_order_id,
            &request.payment_id,
            &request.signature,
        ) {
            warn!(gateway_order_id = %request.gateway_order_id, "top-up signature rejected");
            return Err(SettlementError::PaymentVerificationFailed);
        }
        let topup = self
            .stores
            .wallet
            .get_topup(&request.gateway_order_id)
            .await?
            .ok_or_else(|| SettlementError::not_found(Entity::Topup, &request.gateway_order_id))?;
        if caller.role != Role::Admin && caller.user_id != topup.user_id {
            return Err(SettlementError::Forbidden(format!(
                "top-up {} belongs to another user",
                topup.gateway_order_id
            )));
        }

        let completed = topup.status == TopupStatus::Pending
            && self
                .stores
                .wallet
                .complete_topup(&topup.gateway_order_id, &request.payment_id)
                .await?;
        if !completed {
            info!(gateway_order_id = %topup.gateway_order_id, "top-up already applied");
            let user = self.user(&topup.user_id).await?;
            return Ok(TopupReceipt {
                gateway_order_id: topup.gateway_order_id,
                amount: topup.amount,
                cashback: topup.cashback,
                spendable_balance: user.spendable_balance,
                already_applied: true,
            });
        }

        let user = match self.credit_topup(&topup).await {
            Ok(user) => user,
            Err(err) => {
                error!(
                    gateway_order_id = %topup.gateway_order_id,
                    user_id = %topup.user_id,
                    error = %err,
                    "top-up marked completed but not fully credited"
                );
                return Err(err);
            }
        };
        info!(
            user_id = %user.id,
            gateway_order_id = %topup.gateway_order_id,
            amount = topup.amount.value(),
            cashback = topup.cashback.value(),
            "top-up credited"
        );
        Ok(TopupReceipt {
            gateway_order_id: topup.gateway_order_id,
            amount: topup.amount,
            cashback: topup.cashback,
            spendable_balance: user.spendable_balance,
            already_applied: false,
        })
    }

    async fn credit_topup(&self, topup: &Topup) -> Result<User> {
        let (mut user, _) = self
            .credit_recorded(
                &topup.user_id,
                Money::ZERO,
                topup.amount,
                TransactionKind::Topup,
                "Wallet top-up".to_string(),
                Some(topup.gateway_order_id.clone()),
            )
            .await?;
        if !topup.cashback.is_zero() {
            (user, _) = self
                .credit_recorded(
                    &topup.user_id,
                    Money::ZERO,
                    topup.cashback,
                    TransactionKind::Cashback,
                    format!("Cashback on offer {}", topup.offer_id),
                    Some(topup.gateway_order_id.clone()),
                )
                .await?;
        }
        Ok(user)
    }

    pub async fn create_coupon(&self, caller: &Caller, coupon: Coupon) -> Result<()> {
        caller.require_admin()?;
        coupon.validate()?;
        let code = coupon.code.clone();
        self.stores.coupons.insert(coupon).await?;
        info!(code = %code, "coupon created");
        Ok(())
    }

    pub async fn create_offer(&self, caller: &Caller, offer: WalletOffer) -> Result<()> {
        caller.require_admin()?;
        offer.validate()?;
        let id = offer.id.clone();
        self.stores.wallet.insert_offer(offer).await?;
        info!(offer_id = %id, "top-up offer created");
        Ok(())
    }

    /// Top-up offers, cheapest first.
    pub async fn offers(&self) -> Result<Vec<WalletOffer>> {
        self.stores.wallet.offers().await
    }

    pub async fn add_product(&self, caller: &Caller, product: Product) -> Result<()> {
        caller.require_admin()?;
        product.validate()?;
        self.stores.catalog.insert_product(product).await
    }

    pub async fn add_professional(&self, caller: &Caller, professional: Professional) -> Result<()> {
        caller.require_admin()?;
        self.stores.catalog.insert_professional(professional).await
    }
}
