use marketplace_settlement::domain::coupon::{Coupon, DiscountPolicy};
use marketplace_settlement::domain::money::Money;
use marketplace_settlement::domain::wallet::TransactionKind;
use marketplace_settlement::error::SettlementError;
use std::sync::Arc;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_debit_once() {
    let market = Arc::new(common::marketplace(49_900).await);
    let caller = common::customer(&market, "u-1", 20_000).await.caller();
    let quote = market
        .create_order(&caller, common::order(None, true))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let market = Arc::clone(&market);
        let caller = caller.clone();
        let request = common::checkout(&quote, "pay_1");
        handles.push(tokio::spawn(async move {
            market.confirm_payment(&caller, request).await
        }));
    }

    let mut settled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(confirmation) if !confirmation.already_confirmed => settled += 1,
            Ok(_) | Err(SettlementError::ConfirmationInProgress(_)) => {}
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(settled, 1);

    let user = market.user("u-1").await.unwrap();
    assert_eq!(user.locked_balance, Money::ZERO);
    assert_eq!(user.spendable_balance, Money::ZERO);
    let debits = market
        .stores()
        .ledger
        .history("u-1")
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.kind == TransactionKind::Debit)
        .count();
    assert_eq!(debits, 1);
    common::assert_ledger_matches(&market, "u-1").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_use_coupon_counted_once() {
    let market = Arc::new(common::marketplace(49_900).await);
    market
        .create_coupon(
            &common::admin(),
            Coupon {
                usage_limit: Some(1),
                ..Coupon::new(
                    "ONCE",
                    DiscountPolicy::Flat {
                        amount: Money::new(5_000),
                    },
                )
            },
        )
        .await
        .unwrap();

    let mut requests = Vec::new();
    for id in ["u-1", "u-2"] {
        let caller = common::customer(&market, id, 0).await.caller();
        let quote = market
            .create_order(&caller, common::order(Some("ONCE"), false))
            .await
            .unwrap();
        assert_eq!(quote.discount_amount, Money::new(5_000));
        requests.push((caller, common::checkout(&quote, &format!("pay_{id}"))));
    }

    let handles: Vec<_> = requests
        .into_iter()
        .map(|(caller, request)| {
            let market = Arc::clone(&market);
            tokio::spawn(async move { market.confirm_payment(&caller, request).await })
        })
        .collect();

    let mut counted = 0;
    for handle in handles {
        let confirmation = handle.await.unwrap().unwrap();
        if confirmation.coupon_counted {
            counted += 1;
        }
    }
    assert_eq!(counted, 1);
    let coupon = market.stores().coupons.get("ONCE").await.unwrap().unwrap();
    assert_eq!(coupon.used_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_are_not_lost() {
    let market = Arc::new(common::marketplace(49_900).await);
    common::customer(&market, "u-1", 0).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let market = Arc::clone(&market);
            tokio::spawn(async move {
                market
                    .credit_wallet(&common::admin(), "u-1", Money::new(250), None)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let user = market.user("u-1").await.unwrap();
    assert_eq!(user.spendable_balance, Money::new(2_000));
    common::assert_ledger_matches(&market, "u-1").await;
}

#[tokio::test]
async fn test_stores_as_trait_objects_across_tasks() {
    let market = Arc::new(common::marketplace(49_900).await);
    let handle = {
        let market = Arc::clone(&market);
        tokio::spawn(async move {
            let caller = common::customer(&market, "u-1", 1_000).await.caller();
            market.wallet_summary(&caller).await
        })
    };
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.spendable_balance, Money::new(1_000));
    assert_eq!(summary.transactions.len(), 2);
}
