//! Concurrency tests: simultaneous settlements on one investor or listing.

use shopfund::ledger::{Investor, Listing, Shop};
use shopfund::settlement::{ErrorKind, SettleRequest, SettlementConfig, SettlementEngine};
use shopfund::store::{InMemoryLedgerStore, LedgerStore};
use shopfund::Paise;
use std::sync::Arc;

async fn setup(balance: i64, price: i64, target: i64) -> (Arc<InMemoryLedgerStore>, Investor, Listing) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let investor = Investor::new("+911111111111", None, Paise::new(balance));
    let shop = Shop::new("+912222222222", "Meena", "Meena Tailors", "Jaipur");
    let listing = Listing::new(shop.id, "Sewing machines", Paise::new(price), Paise::new(target));
    store.insert_investor(&investor).await.unwrap();
    store.insert_shop(&shop).await.unwrap();
    store.insert_listing(&listing).await.unwrap();
    (store, investor, listing)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jointly_unaffordable_race_has_one_winner() {
    // each purchase is affordable alone, both together are not
    let (store, investor, listing) = setup(800, 500, 1_000_000).await;
    let engine = SettlementEngine::new(store.clone(), SettlementConfig::default());
    let (listing_id, investor_id) = (listing.id, investor.id);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .settle(SettleRequest::new(listing_id, investor_id, 1, true))
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .settle(SettleRequest::new(listing_id, investor_id, 1, true))
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::InsufficientFunds))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(insufficient, 1);

    let investor = store.investor(investor.id).await.unwrap().unwrap();
    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(300));
    assert_eq!(listing.raised_amount, Paise::new(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_investors_no_lost_updates() {
    let (store, _, listing) = setup(0, 100, 1_000_000).await;
    let engine = SettlementEngine::new(store.clone(), SettlementConfig::default());
    let listing_id = listing.id;

    let mut investors = Vec::new();
    for i in 0..20 {
        let investor = Investor::new(format!("+9130000000{i:02}"), None, Paise::new(1_000));
        store.insert_investor(&investor).await.unwrap();
        investors.push(investor);
    }

    let mut handles = Vec::new();
    for investor in &investors {
        let engine = engine.clone();
        let investor_id = investor.id;
        handles.push(tokio::spawn(async move {
            engine
                .settle(SettleRequest::new(listing_id, investor_id, 3, true))
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("every purchase is affordable");
    }

    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(listing.raised_amount, Paise::new(20 * 300));
    assert_eq!(store.transaction_count().await.unwrap(), 20);

    for investor in &investors {
        let investor = store.investor(investor.id).await.unwrap().unwrap();
        assert_eq!(investor.wallet_balance, Paise::new(700));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchases_never_overfund() {
    let (store, investor, listing) = setup(1_000_000, 1_000, 10_000).await;
    let engine = SettlementEngine::new(store.clone(), SettlementConfig::default());
    let (listing_id, investor_id) = (listing.id, investor.id);

    let mut handles = Vec::new();
    for _ in 0..15 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .settle(SettleRequest::new(listing_id, investor_id, 1, true))
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 10);
    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(listing.raised_amount, Paise::new(10_000));
    let investor = store.investor(investor.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(1_000_000 - 10_000));
}
