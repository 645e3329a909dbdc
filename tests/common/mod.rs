#![allow(dead_code)]

use marketplace_settlement::application::{
    ConfirmPayment, CreateOrder, Marketplace, NewUser, OrderQuote,
};
use marketplace_settlement::domain::booking::{Product, Professional};
use marketplace_settlement::domain::money::Money;
use marketplace_settlement::domain::user::{Caller, Role, User};
use marketplace_settlement::infrastructure::gateway::HmacGateway;
use marketplace_settlement::infrastructure::in_memory::in_memory_stores;
use std::io::Write;
use tempfile::NamedTempFile;

pub const KEY_ID: &str = "rzp_test_key";
pub const KEY_SECRET: &str = "test-secret";

pub fn signer() -> HmacGateway {
    HmacGateway::new(KEY_ID, KEY_SECRET)
}

pub fn admin() -> Caller {
    Caller::new("admin", Role::Admin)
}

/// A marketplace with one product, one active professional and no users.
pub async fn marketplace(price: u64) -> Marketplace {
    let market = Marketplace::new(in_memory_stores(), Box::new(signer()));
    market
        .add_product(
            &admin(),
            Product {
                id: "deep-clean".to_string(),
                name: "Deep cleaning".to_string(),
                price: Money::new(price),
            },
        )
        .await
        .unwrap();
    market
        .add_professional(
            &admin(),
            Professional {
                id: "pro-1".to_string(),
                name: "Ravi".to_string(),
                active: true,
                user_id: Some("u-pro".to_string()),
                created_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
    market
}

/// Registers a customer, then tops their spendable pool up to `spendable`.
pub async fn customer(market: &Marketplace, id: &str, spendable: u64) -> User {
    market
        .register_user(NewUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            role: Role::Customer,
        })
        .await
        .unwrap();
    if spendable > 0 {
        market
            .credit_wallet(&admin(), id, Money::new(spendable), None)
            .await
            .unwrap();
    }
    market.user(id).await.unwrap()
}

pub fn order(coupon: Option<&str>, use_wallet: bool) -> CreateOrder {
    CreateOrder {
        product_id: "deep-clean".to_string(),
        address: "12 MG Road, Bengaluru".to_string(),
        coupon_code: coupon.map(str::to_string),
        use_wallet,
    }
}

/// What the hosted checkout returns once `quote` is paid.
pub fn checkout(quote: &OrderQuote, payment_id: &str) -> ConfirmPayment {
    let order_id = quote
        .gateway_order_id
        .clone()
        .expect("quote has a gateway order");
    ConfirmPayment {
        booking_id: quote.booking_id.clone(),
        signature: signer().sign(&order_id, payment_id).unwrap(),
        gateway_order_id: order_id,
        payment_id: payment_id.to_string(),
    }
}

/// Asserts the ledger of `user_id` adds up to its stored balances.
pub async fn assert_ledger_matches(market: &Marketplace, user_id: &str) {
    let user = market.user(user_id).await.unwrap();
    let history = market.stores().ledger.history(user_id).await.unwrap();
    let spendable: i64 = history.iter().map(|tx| tx.spendable_amount()).sum();
    let locked: i64 = history.iter().map(|tx| tx.locked_amount).sum();
    assert_eq!(spendable, user.spendable_balance.signed(), "spendable drift");
    assert_eq!(locked, user.locked_balance.signed(), "locked drift");
}

pub fn write_script(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}
