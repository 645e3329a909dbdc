use super::booking::{Booking, Product, Professional};
use super::coupon::Coupon;
use super::money::Money;
use super::user::User;
use super::wallet::{Topup, WalletConfig, WalletOffer, WalletTransaction};
use crate::error::Result;
use async_trait::async_trait;

/// Users and their balance pair.
///
/// Balance writes go through `compare_and_swap` only: the write succeeds when
/// the stored `version` still equals `expected_version`, and the stored
/// version becomes `expected_version + 1`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with a validation error if the id is taken.
    async fn insert(&self, user: User) -> Result<()>;
    async fn get(&self, user_id: &str) -> Result<Option<User>>;
    async fn all_users(&self) -> Result<Vec<User>>;
    async fn compare_and_swap(&self, user: &User, expected_version: u64) -> Result<bool>;
}

/// Append-only wallet transaction log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, tx: WalletTransaction) -> Result<()>;
    /// A user's entries, oldest first.
    async fn history(&self, user_id: &str) -> Result<Vec<WalletTransaction>>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert(&self, coupon: Coupon) -> Result<()>;
    async fn get(&self, code: &str) -> Result<Option<Coupon>>;
    /// Counts one redemption unless `used_count` already reached
    /// `usage_limit`. Returns whether the redemption was counted.
    async fn record_redemption(&self, code: &str) -> Result<bool>;
    /// Undoes one counted redemption.
    async fn release_redemption(&self, code: &str) -> Result<()>;
}

/// Bookings, versioned like users.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: Booking) -> Result<()>;
    async fn get(&self, booking_id: &str) -> Result<Option<Booking>>;
    async fn all_bookings(&self) -> Result<Vec<Booking>>;
    async fn compare_and_swap(&self, booking: &Booking, expected_version: u64) -> Result<bool>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: Product) -> Result<()>;
    async fn get_product(&self, product_id: &str) -> Result<Option<Product>>;
    async fn insert_professional(&self, professional: Professional) -> Result<()>;
    /// The earliest-registered active professional, if any.
    async fn first_active_professional(&self) -> Result<Option<Professional>>;
    async fn professional_for_user(&self, user_id: &str) -> Result<Option<Professional>>;
}

/// Wallet policy, top-up offers and top-ups in flight.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn wallet_config(&self) -> Result<Option<WalletConfig>>;
    async fn put_wallet_config(&self, config: WalletConfig) -> Result<()>;
    /// Stores `defaults` unless a config already exists, and returns whichever
    /// config is stored afterwards.
    async fn init_wallet_config(&self, defaults: WalletConfig) -> Result<WalletConfig>;
    async fn insert_offer(&self, offer: WalletOffer) -> Result<()>;
    async fn get_offer(&self, offer_id: &str) -> Result<Option<WalletOffer>>;
    async fn offers(&self) -> Result<Vec<WalletOffer>>;
    async fn insert_topup(&self, topup: Topup) -> Result<()>;
    async fn get_topup(&self, gateway_order_id: &str) -> Result<Option<Topup>>;
    /// Marks a pending top-up completed. Returns `false` if it was not pending.
    async fn complete_topup(&self, gateway_order_id: &str, payment_id: &str) -> Result<bool>;
}

/// A hosted order opened with the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Money,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, amount: Money, currency: &str) -> Result<GatewayOrder>;
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
    /// Public key id the client needs to open the hosted checkout.
    fn key_id(&self) -> &str;
}

pub type UserStoreBox = Box<dyn UserStore>;
pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type CouponStoreBox = Box<dyn CouponStore>;
pub type BookingStoreBox = Box<dyn BookingStore>;
pub type CatalogStoreBox = Box<dyn CatalogStore>;
pub type WalletStoreBox = Box<dyn WalletStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;

/// Every store the marketplace reads or writes.
pub struct Stores {
    pub users: UserStoreBox,
    pub ledger: LedgerStoreBox,
    pub coupons: CouponStoreBox,
    pub bookings: BookingStoreBox,
    pub catalog: CatalogStoreBox,
    pub wallet: WalletStoreBox,
}
