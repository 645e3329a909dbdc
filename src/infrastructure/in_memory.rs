use crate::domain::booking::{Booking, Product, Professional};
use crate::domain::coupon::Coupon;
use crate::domain::ports::{
    BookingStore, CatalogStore, CouponStore, LedgerStore, Stores, UserStore, WalletStore,
};
use crate::domain::user::User;
use crate::domain::wallet::{Topup, TopupStatus, WalletConfig, WalletOffer, WalletTransaction};
use crate::error::{Entity, Result, SettlementError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for users.
///
/// Conditional writes run under the write lock, so a compare-and-swap is
/// atomic with respect to every other access.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserStore {
    /// Creates a new, empty in-memory user store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(SettlementError::ValidationError(format!(
                "User {} already exists",
                user.id
            )));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.values().cloned().collect())
    }

    async fn compare_and_swap(&self, user: &User, expected_version: u64) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(current) if current.version == expected_version => {
                *current = User {
                    version: expected_version + 1,
                    ..user.clone()
                };
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SettlementError::not_found(
                Entity::User,
                &user.id,
            )),
        }
    }
}

/// Append-only ledger kept as one vector per user.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    entries: Arc<RwLock<HashMap<String, Vec<WalletTransaction>>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, tx: WalletTransaction) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.entry(tx.user_id.clone()).or_default().push(tx);
        Ok(())
    }

    async fn history(&self, user_id: &str) -> Result<Vec<WalletTransaction>> {
        let entries = self.entries.read().await;
        Ok(entries.get(user_id).cloned().unwrap_or_default())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<String, Coupon>>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn insert(&self, coupon: Coupon) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(&coupon.code) {
            return Err(SettlementError::ValidationError(format!(
                "Coupon {} already exists",
                coupon.code
            )));
        }
        coupons.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(code).cloned())
    }

    async fn record_redemption(&self, code: &str) -> Result<bool> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons
            .get_mut(code)
            .ok_or_else(|| SettlementError::not_found(Entity::Coupon, code))?;
        if coupon.is_exhausted() {
            return Ok(false);
        }
        coupon.used_count += 1;
        Ok(true)
    }

    async fn release_redemption(&self, code: &str) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        if let Some(coupon) = coupons.get_mut(code) {
            coupon.used_count = coupon.used_count.saturating_sub(1);
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<String, Booking>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: Booking) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        bookings.insert(booking.id.clone(), booking);
        Ok(())
    }

    async fn get(&self, booking_id: &str) -> Result<Option<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(booking_id).cloned())
    }

    async fn all_bookings(&self) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.values().cloned().collect())
    }

    async fn compare_and_swap(&self, booking: &Booking, expected_version: u64) -> Result<bool> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&booking.id) {
            Some(current) if current.version == expected_version => {
                *current = Booking {
                    version: expected_version + 1,
                    ..booking.clone()
                };
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SettlementError::not_found(
                Entity::Booking,
                &booking.id,
            )),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<HashMap<String, Product>>>,
    professionals: Arc<RwLock<HashMap<String, Professional>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        let mut products = self.products.write().await;
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products.get(product_id).cloned())
    }

    async fn insert_professional(&self, professional: Professional) -> Result<()> {
        let mut professionals = self.professionals.write().await;
        professionals.insert(professional.id.clone(), professional);
        Ok(())
    }

    async fn first_active_professional(&self) -> Result<Option<Professional>> {
        let professionals = self.professionals.read().await;
        Ok(professionals
            .values()
            .filter(|p| p.active)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn professional_for_user(&self, user_id: &str) -> Result<Option<Professional>> {
        let professionals = self.professionals.read().await;
        Ok(professionals
            .values()
            .find(|p| p.user_id.as_deref() == Some(user_id))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    config: Arc<RwLock<Option<WalletConfig>>>,
    offers: Arc<RwLock<HashMap<String, WalletOffer>>>,
    topups: Arc<RwLock<HashMap<String, Topup>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn wallet_config(&self) -> Result<Option<WalletConfig>> {
        Ok(self.config.read().await.clone())
    }

    async fn put_wallet_config(&self, config: WalletConfig) -> Result<()> {
        *self.config.write().await = Some(config);
        Ok(())
    }

    async fn init_wallet_config(&self, defaults: WalletConfig) -> Result<WalletConfig> {
        let mut config = self.config.write().await;
        Ok(config.get_or_insert(defaults).clone())
    }

    async fn insert_offer(&self, offer: WalletOffer) -> Result<()> {
        let mut offers = self.offers.write().await;
        offers.insert(offer.id.clone(), offer);
        Ok(())
    }

    async fn get_offer(&self, offer_id: &str) -> Result<Option<WalletOffer>> {
        let offers = self.offers.read().await;
        Ok(offers.get(offer_id).cloned())
    }

    async fn offers(&self) -> Result<Vec<WalletOffer>> {
        let offers = self.offers.read().await;
        let mut all: Vec<WalletOffer> = offers.values().cloned().collect();
        all.sort_by_key(|offer| offer.amount);
        Ok(all)
    }

    async fn insert_topup(&self, topup: Topup) -> Result<()> {
        let mut topups = self.topups.write().await;
        topups.insert(topup.gateway_order_id.clone(), topup);
        Ok(())
    }

    async fn get_topup(&self, gateway_order_id: &str) -> Result<Option<Topup>> {
        let topups = self.topups.read().await;
        Ok(topups.get(gateway_order_id).cloned())
    }

    async fn complete_topup(&self, gateway_order_id: &str, payment_id: &str) -> Result<bool> {
        let mut topups = self.topups.write().await;
        match topups.get_mut(gateway_order_id) {
            Some(topup) if topup.status == TopupStatus::Pending => {
                topup.status = TopupStatus::Completed;
                topup.payment_id = Some(payment_id.to_string());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SettlementError::not_found(
                Entity::Topup,
                gateway_order_id,
            )),
        }
    }
}

/// Builds a fresh set of in-memory stores.
pub fn in_memory_stores() -> Stores {
    Stores {
        users: Box::new(InMemoryUserStore::new()),
        ledger: Box::new(InMemoryLedgerStore::new()),
        coupons: Box::new(InMemoryCouponStore::new()),
        bookings: Box::new(InMemoryBookingStore::new()),
        catalog: Box::new(InMemoryCatalogStore::new()),
        wallet: Box::new(InMemoryWalletStore::new()),
    }
}

/// In-memory ledger that refuses entries of one kind while switched on.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct RefusingLedgerStore {
    inner: InMemoryLedgerStore,
    refused: crate::domain::wallet::TransactionKind,
    on: Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl RefusingLedgerStore {
    pub(crate) fn new(refused: crate::domain::wallet::TransactionKind) -> Self {
        Self {
            inner: InMemoryLedgerStore::new(),
            refused,
            on: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        }
    }

    pub(crate) fn switch(&self) -> Arc<std::sync::atomic::AtomicBool> {
        Arc::clone(&self.on)
    }
}

#[cfg(test)]
#[async_trait]
impl LedgerStore for RefusingLedgerStore {
    async fn append(&self, tx: WalletTransaction) -> Result<()> {
        if tx.kind == self.refused && self.on.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SettlementError::InternalError("ledger unavailable".into()));
        }
        self.inner.append(tx).await
    }

    async fn history(&self, user_id: &str) -> Result<Vec<WalletTransaction>> {
        self.inner.history(user_id).await
    }
}
