use crate::domain::booking::{Booking, Product, Professional};
use crate::domain::coupon::Coupon;
use crate::domain::ports::{
    BookingStore, CatalogStore, CouponStore, LedgerStore, Stores, UserStore, WalletStore,
};
use crate::domain::user::User;
use crate::domain::wallet::{Topup, TopupStatus, WalletConfig, WalletOffer, WalletTransaction};
use crate::error::{Entity, Result, SettlementError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_USERS: &str = "users";
/// Keyed `{len:08}:{user_id}/{micros}{sequence}` so a prefix scan yields a
/// user's entries in append order. The length prefix keeps the key space of
/// `a` apart from that of `a/b`.
pub const CF_LEDGER: &str = "ledger";
pub const CF_COUPONS: &str = "coupons";
pub const CF_BOOKINGS: &str = "bookings";
pub const CF_PRODUCTS: &str = "products";
pub const CF_PROFESSIONALS: &str = "professionals";
pub const CF_OFFERS: &str = "offers";
pub const CF_TOPUPS: &str = "topups";
/// Singletons such as the wallet config.
pub const CF_SETTINGS: &str = "settings";

const COLUMN_FAMILIES: [&str; 9] = [
    CF_USERS,
    CF_LEDGER,
    CF_COUPONS,
    CF_BOOKINGS,
    CF_PRODUCTS,
    CF_PROFESSIONALS,
    CF_OFFERS,
    CF_TOPUPS,
    CF_SETTINGS,
];

const WALLET_CONFIG_KEY: &[u8] = b"wallet";

/// A persistent store implementation using RocksDB.
///
/// Every collection lives in its own column family with JSON values. Plain
/// reads and unconditional writes go straight to the database; conditional
/// read-modify-write operations (inserts that must not overwrite,
/// compare-and-swap, coupon and top-up counters) hold `write_lock` so no two
/// of them interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    sequence: Arc<AtomicU64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Missing column families are created.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Builds a full set of stores sharing this database.
    pub fn stores(&self) -> Stores {
        Stores {
            users: Box::new(self.clone()),
            ledger: Box::new(self.clone()),
            coupons: Box::new(self.clone()),
            bookings: Box::new(self.clone()),
            catalog: Box::new(self.clone()),
            wallet: Box::new(self.clone()),
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SettlementError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn exists(&self, cf: &str, key: &[u8]) -> Result<bool> {
        Ok(self.db.get_pinned_cf(self.cf(cf)?, key)?.is_some())
    }

    /// Deserializes every value whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));
        let mut values = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn ledger_prefix(user_id: &str) -> String {
        format!("{:08}:{user_id}/", user_id.len())
    }

    fn ledger_key(&self, tx: &WalletTransaction) -> Vec<u8> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let micros = tx.created_at.timestamp_micros().max(0);
        format!(
            "{}{micros:020}{sequence:010}",
            Self::ledger_prefix(&tx.user_id)
        )
        .into_bytes()
    }

    fn insert_new<T: Serialize>(&self, cf: &str, entity: Entity, id: &str, value: &T) -> Result<()> {
        if self.exists(cf, id.as_bytes())? {
            return Err(SettlementError::ValidationError(format!(
                "{entity} {id} already exists"
            )));
        }
        self.write(cf, id.as_bytes(), value)
    }
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn insert(&self, user: User) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.insert_new(CF_USERS, Entity::User, &user.id, &user)
    }

    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        self.read(CF_USERS, user_id.as_bytes())
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        self.scan(CF_USERS, b"")
    }

    async fn compare_and_swap(&self, user: &User, expected_version: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current: User = self
            .read(CF_USERS, user.id.as_bytes())?
            .ok_or_else(|| SettlementError::not_found(Entity::User, &user.id))?;
        if current.version != expected_version {
            return Ok(false);
        }
        let updated = User {
            version: expected_version + 1,
            ..user.clone()
        };
        self.write(CF_USERS, user.id.as_bytes(), &updated)?;
        Ok(true)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn append(&self, tx: WalletTransaction) -> Result<()> {
        let key = self.ledger_key(&tx);
        self.write(CF_LEDGER, &key, &tx)
    }

    async fn history(&self, user_id: &str) -> Result<Vec<WalletTransaction>> {
        self.scan(CF_LEDGER, Self::ledger_prefix(user_id).as_bytes())
    }
}

#[async_trait]
impl CouponStore for RocksDBStore {
    async fn insert(&self, coupon: Coupon) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.insert_new(CF_COUPONS, Entity::Coupon, &coupon.code, &coupon)
    }

    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        self.read(CF_COUPONS, code.as_bytes())
    }

    async fn record_redemption(&self, code: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut coupon: Coupon = self
            .read(CF_COUPONS, code.as_bytes())?
            .ok_or_else(|| SettlementError::not_found(Entity::Coupon, code))?;
        if coupon.is_exhausted() {
            return Ok(false);
        }
        coupon.used_count += 1;
        self.write(CF_COUPONS, code.as_bytes(), &coupon)?;
        Ok(true)
    }

    async fn release_redemption(&self, code: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(mut coupon) = self.read::<Coupon>(CF_COUPONS, code.as_bytes())? {
            coupon.used_count = coupon.used_count.saturating_sub(1);
            self.write(CF_COUPONS, code.as_bytes(), &coupon)?;
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn insert(&self, booking: Booking) -> Result<()> {
        self.write(CF_BOOKINGS, booking.id.as_bytes(), &booking)
    }

    async fn get(&self, booking_id: &str) -> Result<Option<Booking>> {
        self.read(CF_BOOKINGS, booking_id.as_bytes())
    }

    async fn all_bookings(&self) -> Result<Vec<Booking>> {
        self.scan(CF_BOOKINGS, b"")
    }

    async fn compare_and_swap(&self, booking: &Booking, expected_version: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current: Booking = self
            .read(CF_BOOKINGS, booking.id.as_bytes())?
            .ok_or_else(|| SettlementError::not_found(Entity::Booking, &booking.id))?;
        if current.version != expected_version {
            return Ok(false);
        }
        let updated = Booking {
            version: expected_version + 1,
            ..booking.clone()
        };
        self.write(CF_BOOKINGS, booking.id.as_bytes(), &updated)?;
        Ok(true)
    }
}

#[async_trait]
impl CatalogStore for RocksDBStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        self.write(CF_PRODUCTS, product.id.as_bytes(), &product)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        self.read(CF_PRODUCTS, product_id.as_bytes())
    }

    async fn insert_professional(&self, professional: Professional) -> Result<()> {
        self.write(CF_PROFESSIONALS, professional.id.as_bytes(), &professional)
    }

    async fn first_active_professional(&self) -> Result<Option<Professional>> {
        let professionals: Vec<Professional> = self.scan(CF_PROFESSIONALS, b"")?;
        Ok(professionals
            .into_iter()
            .filter(|p| p.active)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))))
    }

    async fn professional_for_user(&self, user_id: &str) -> Result<Option<Professional>> {
        let professionals: Vec<Professional> = self.scan(CF_PROFESSIONALS, b"")?;
        Ok(professionals
            .into_iter()
            .find(|p| p.user_id.as_deref() == Some(user_id)))
    }
}

#[async_trait]
impl WalletStore for RocksDBStore {
    async fn wallet_config(&self) -> Result<Option<WalletConfig>> {
        self.read(CF_SETTINGS, WALLET_CONFIG_KEY)
    }

    async fn put_wallet_config(&self, config: WalletConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(CF_SETTINGS, WALLET_CONFIG_KEY, &config)
    }

    async fn init_wallet_config(&self, defaults: WalletConfig) -> Result<WalletConfig> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.read(CF_SETTINGS, WALLET_CONFIG_KEY)? {
            return Ok(existing);
        }
        self.write(CF_SETTINGS, WALLET_CONFIG_KEY, &defaults)?;
        Ok(defaults)
    }

    async fn insert_offer(&self, offer: WalletOffer) -> Result<()> {
        self.write(CF_OFFERS, offer.id.as_bytes(), &offer)
    }

    async fn get_offer(&self, offer_id: &str) -> Result<Option<WalletOffer>> {
        self.read(CF_OFFERS, offer_id.as_bytes())
    }

    async fn offers(&self) -> Result<Vec<WalletOffer>> {
        let mut offers: Vec<WalletOffer> = self.scan(CF_OFFERS, b"")?;
        offers.sort_by_key(|offer| offer.amount);
        Ok(offers)
    }

    async fn insert_topup(&self, topup: Topup) -> Result<()> {
        self.write(CF_TOPUPS, topup.gateway_order_id.as_bytes(), &topup)
    }

    async fn get_topup(&self, gateway_order_id: &str) -> Result<Option<Topup>> {
        self.read(CF_TOPUPS, gateway_order_id.as_bytes())
    }

    async fn complete_topup(&self, gateway_order_id: &str, payment_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut topup: Topup = self
            .read(CF_TOPUPS, gateway_order_id.as_bytes())?
            .ok_or_else(|| SettlementError::not_found(Entity::Topup, gateway_order_id))?;
        if topup.status != TopupStatus::Pending {
            return Ok(false);
        }
        topup.status = TopupStatus::Completed;
        topup.payment_id = Some(payment_id.to_string());
        self.write(CF_TOPUPS, gateway_order_id.as_bytes(), &topup)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::DiscountPolicy;
    use crate::domain::money::Money;
    use crate::domain::user::Role;
    use crate::domain::wallet::TransactionKind;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn entry(user_id: &str, amount: i64) -> WalletTransaction {
        WalletTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: TransactionKind::Credit,
            amount,
            locked_amount: 0,
            balance_after: Money::new(amount.unsigned_abs()),
            locked_balance_after: Money::ZERO,
            description: "test".to_string(),
            reference: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_user_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let user = User::new("u-1", "asha@example.com", "Asha", Role::Customer);
        UserStore::insert(&store, user.clone()).await.unwrap();
        assert!(UserStore::insert(&store, user.clone()).await.is_err());

        let retrieved = UserStore::get(&store, "u-1").await.unwrap().unwrap();
        assert_eq!(retrieved, user);
        assert!(UserStore::get(&store, "u-2").await.unwrap().is_none());

        let mut richer = retrieved.clone();
        richer.credit(Money::ZERO, Money::new(500)).unwrap();
        assert!(UserStore::compare_and_swap(&store, &richer, 0).await.unwrap());
        assert!(!UserStore::compare_and_swap(&store, &richer, 0).await.unwrap());

        let stored = UserStore::get(&store, "u-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.spendable_balance, Money::new(500));
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_is_scoped_and_ordered() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut later = entry("u-1", 300);
        later.created_at = Utc::now() + Duration::seconds(1);
        store.append(entry("u-1", 100)).await.unwrap();
        store.append(entry("u-10", 999)).await.unwrap();
        store.append(entry("u-1", 200)).await.unwrap();
        store.append(later).await.unwrap();

        let history = store.history("u-1").await.unwrap();
        let amounts: Vec<i64> = history.iter().map(|tx| tx.amount).collect();
        assert_eq!(amounts, vec![100, 200, 300]);
        assert_eq!(store.history("u-10").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_ids_sharing_a_prefix() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        store.append(entry("a", 100)).await.unwrap();
        store.append(entry("a/b", 700)).await.unwrap();
        store.append(entry("a/", 40)).await.unwrap();

        let amounts = |history: Vec<WalletTransaction>| -> Vec<i64> {
            history.iter().map(|tx| tx.amount).collect()
        };
        assert_eq!(amounts(store.history("a").await.unwrap()), vec![100]);
        assert_eq!(amounts(store.history("a/b").await.unwrap()), vec![700]);
        assert_eq!(amounts(store.history("a/").await.unwrap()), vec![40]);
    }

    #[tokio::test]
    async fn test_rocksdb_init_wallet_config_keeps_saved_config() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let saved = WalletConfig {
            max_locked_per_order: Money::new(1),
            ..WalletConfig::default()
        };
        store.put_wallet_config(saved.clone()).await.unwrap();
        let config = store
            .init_wallet_config(WalletConfig::default())
            .await
            .unwrap();
        assert_eq!(config, saved);
        assert_eq!(store.wallet_config().await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_rocksdb_coupon_counter() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let coupon = Coupon {
            usage_limit: Some(1),
            ..Coupon::new("ONCE", DiscountPolicy::Flat { amount: Money::new(100) })
        };
        CouponStore::insert(&store, coupon).await.unwrap();
        assert!(store.record_redemption("ONCE").await.unwrap());
        assert!(!store.record_redemption("ONCE").await.unwrap());
        store.release_redemption("ONCE").await.unwrap();
        assert!(store.record_redemption("ONCE").await.unwrap());
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.put_wallet_config(WalletConfig::default()).await.unwrap();
            UserStore::insert(
                &store,
                User::new("u-1", "asha@example.com", "Asha", Role::Customer),
            )
            .await
            .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(
            store.wallet_config().await.unwrap(),
            Some(WalletConfig::default())
        );
        assert_eq!(store.all_users().await.unwrap().len(), 1);
    }
}
