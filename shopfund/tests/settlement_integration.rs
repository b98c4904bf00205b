#![allow(clippy::unreadable_literal)]

//! Integration tests for wallet and external settlement against the
//! in-memory ledger store.

use chrono::{Duration, Utc};
use shopfund::ledger::seed::{DemoLedger, seed_demo};
use shopfund::ledger::{
    EXTERNAL_REFERENCE_PREFIX, FundingMethod, InvestmentStatus, Investor, Listing, ListingStatus,
    Shop, TransactionType, WALLET_REFERENCE_PREFIX,
};
use shopfund::settlement::{
    CallbackGateway, ErrorKind, FundingPolicy, PaymentReceived, SettleRequest, SettlementConfig,
    SettlementEngine, SettlementError,
};
use shopfund::store::{InMemoryLedgerStore, LedgerStore};
use shopfund::{ListingQueryService, Paise};
use std::sync::Arc;

fn config(policy: FundingPolicy) -> SettlementConfig {
    SettlementConfig {
        funding_policy: policy,
        ..SettlementConfig::default()
    }
}

/// Helper to create an engine over a freshly seeded demo ledger
async fn setup() -> (SettlementEngine, Arc<InMemoryLedgerStore>, DemoLedger) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let demo = seed_demo(store.as_ref()).await.expect("seed demo ledger");
    let engine = SettlementEngine::new(store.clone(), config(FundingPolicy::RejectOverflow));
    (engine, store, demo)
}

/// Helper to add an investor with the given balance
async fn add_investor(store: &InMemoryLedgerStore, balance: i64) -> Investor {
    let phone = format!("+91{}", uuid::Uuid::new_v4().simple());
    let investor = Investor::new(phone, None, Paise::new(balance));
    store.insert_investor(&investor).await.expect("insert investor");
    investor
}

/// Helper to add a LIVE listing for a new shop
async fn add_listing(store: &InMemoryLedgerStore, price: i64, target: i64, raised: i64) -> Listing {
    let phone = format!("+91{}", uuid::Uuid::new_v4().simple());
    let shop = Shop::new(phone, "Owner", "Kirana Store", "Mumbai");
    store.insert_shop(&shop).await.expect("insert shop");
    let mut listing = Listing::new(shop.id, "New shelves", Paise::new(price), Paise::new(target));
    listing.raised_amount = Paise::new(raised);
    store.insert_listing(&listing).await.expect("insert listing");
    listing
}

#[tokio::test]
async fn test_wallet_purchase_settles_demo_listing() {
    let (engine, store, demo) = setup().await;

    let investment = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .expect("wallet settlement");

    assert_eq!(investment.status, InvestmentStatus::Confirmed);
    assert_eq!(investment.amount_paid, Paise::new(500_000));
    assert_eq!(investment.num_tickets, 1);
    assert!(investment.payment_reference.starts_with(WALLET_REFERENCE_PREFIX));

    let investor = store.investor(demo.investor.id).await.unwrap().unwrap();
    let listing = store.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::ZERO);
    assert_eq!(listing.raised_amount, Paise::new(3_700_000));
    assert_eq!(listing.status, ListingStatus::Live);

    let entries = store.transactions_for_investment(investment.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tx_type, TransactionType::Investment);
    assert_eq!(entries[0].amount, Paise::new(500_000));
    assert_eq!(entries[0].actor_id, demo.investor.id);
    assert_eq!(entries[0].shop_id, demo.shop.id);
    assert_eq!(entries[0].metadata.listing_id, demo.listing.id);
}

#[tokio::test]
async fn test_repeat_purchase_without_funds_changes_nothing() {
    let (engine, store, demo) = setup().await;
    let request = SettleRequest::new(demo.listing.id, demo.investor.id, 1, true);

    engine.settle(request.clone()).await.expect("first purchase");
    let err = engine.settle(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    let investor = store.investor(demo.investor.id).await.unwrap().unwrap();
    let listing = store.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::ZERO);
    assert_eq!(listing.raised_amount, Paise::new(3_700_000));
    assert_eq!(store.transaction_count().await.unwrap(), 1);
    assert_eq!(
        store.investments_for_listing(demo.listing.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_conservation_across_purchases() {
    let (engine, store, _) = setup().await;
    let investor = add_investor(&store, 10_000).await;
    let listing = add_listing(&store, 700, 1_000_000, 0).await;

    for tickets in [1, 3, 5] {
        engine
            .settle(SettleRequest::new(listing.id, investor.id, tickets, true))
            .await
            .expect("affordable purchase");
    }

    let investor = store.investor(investor.id).await.unwrap().unwrap();
    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(10_000 - 9 * 700));
    assert_eq!(listing.raised_amount, Paise::new(9 * 700));
    assert_eq!(store.transaction_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_zero_tickets_is_invalid_input() {
    let (engine, store, demo) = setup().await;

    let err = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 0, true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(store.transaction_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_amount_overflow_is_invalid_input() {
    let (engine, store, _) = setup().await;
    let investor = add_investor(&store, 1_000).await;
    let listing = add_listing(&store, i64::MAX / 2, i64::MAX, 0).await;

    let err = engine
        .settle(SettleRequest::new(listing.id, investor.id, 3, true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_unknown_listing_and_investor_are_not_found() {
    let (engine, _, demo) = setup().await;

    let err = engine
        .settle(SettleRequest::new(uuid::Uuid::new_v4(), demo.investor.id, 1, true))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::ListingNotFound(_)));

    let err = engine
        .settle(SettleRequest::new(demo.listing.id, uuid::Uuid::new_v4(), 1, true))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvestorNotFound(_)));
}

#[tokio::test]
async fn test_listing_outside_window_is_not_open() {
    let (engine, store, _) = setup().await;
    let investor = add_investor(&store, 10_000).await;

    let phone = format!("+91{}", uuid::Uuid::new_v4().simple());
    let shop = Shop::new(phone, "Owner", "Bakery", "Chennai");
    store.insert_shop(&shop).await.unwrap();

    let mut closed = Listing::new(shop.id, "Closed", Paise::new(100), Paise::new(10_000));
    closed.closes_at = Some(Utc::now() - Duration::hours(1));
    let mut draft = Listing::new(shop.id, "Draft", Paise::new(100), Paise::new(10_000));
    draft.status = ListingStatus::Draft;
    store.insert_listing(&closed).await.unwrap();
    store.insert_listing(&draft).await.unwrap();

    for listing_id in [closed.id, draft.id] {
        let err = engine
            .settle(SettleRequest::new(listing_id, investor.id, 1, true))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::ListingNotOpen { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    let investor = store.investor(investor.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(10_000));
}

#[tokio::test]
async fn test_reject_overflow_caps_at_target() {
    let (engine, store, _) = setup().await;
    let investor = add_investor(&store, 100_000).await;
    let listing = add_listing(&store, 1_000, 5_000, 3_000).await;

    let err = engine
        .settle(SettleRequest::new(listing.id, investor.id, 3, true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::FundingCapExceeded { remaining, required }
            if remaining == Paise::new(2_000) && required == Paise::new(3_000)
    ));

    let investment = engine
        .settle(SettleRequest::new(listing.id, investor.id, 2, true))
        .await
        .expect("exactly reaches target");
    assert_eq!(investment.amount_paid, Paise::new(2_000));

    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(listing.raised_amount, Paise::new(5_000));
    assert_eq!(listing.status, ListingStatus::Funded);

    let err = engine
        .settle(SettleRequest::new(listing.id, investor.id, 1, true))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::ListingNotOpen { .. }));
}

#[tokio::test]
async fn test_allow_overfunding_accepts_past_target() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = SettlementEngine::new(store.clone(), config(FundingPolicy::AllowOverfunding));
    let investor = add_investor(&store, 100_000).await;
    let listing = add_listing(&store, 1_000, 5_000, 3_000).await;

    engine
        .settle(SettleRequest::new(listing.id, investor.id, 3, true))
        .await
        .expect("overfunding allowed");

    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(listing.raised_amount, Paise::new(6_000));
    assert_eq!(listing.status, ListingStatus::Live);

    // Still open once past the target
    engine
        .settle(SettleRequest::new(listing.id, investor.id, 1, true))
        .await
        .expect("purchase past target allowed");
    engine
        .settle(SettleRequest::new(listing.id, investor.id, 2, false))
        .await
        .expect("external purchase past target allowed");

    let progress = ListingQueryService::new(store)
        .listing_progress(listing.id)
        .await
        .unwrap();
    assert_eq!(progress.listing.raised_amount, Paise::new(9_000));
    assert_eq!(progress.listing.status, ListingStatus::Live);
    assert_eq!(progress.progress_percent, 180);
}

#[tokio::test]
async fn test_external_purchase_confirms_instantly() {
    let (engine, store, demo) = setup().await;

    let investment = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 2, false))
        .await
        .expect("external settlement");

    assert_eq!(investment.status, InvestmentStatus::Confirmed);
    assert_eq!(investment.funding_method, FundingMethod::External);
    assert!(investment.payment_reference.starts_with(EXTERNAL_REFERENCE_PREFIX));

    // external payment never touches the wallet
    let investor = store.investor(demo.investor.id).await.unwrap().unwrap();
    let listing = store.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(500_000));
    assert_eq!(listing.raised_amount, Paise::new(4_200_000));
    assert_eq!(
        store.transactions_for_investment(investment.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_confirm_twice_credits_once() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let demo = seed_demo(store.as_ref()).await.unwrap();
    let engine = SettlementEngine::with_gateway(
        store.clone(),
        Arc::new(CallbackGateway),
        SettlementConfig::default(),
    );

    let pending = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, false))
        .await
        .expect("pending investment");
    assert_eq!(pending.status, InvestmentStatus::Pending);
    let listing = store.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(listing.raised_amount, Paise::new(3_200_000));
    assert_eq!(store.transaction_count().await.unwrap(), 0);

    let first = engine.confirmations().confirm(pending.id).await.unwrap();
    let second = engine.confirmations().confirm(pending.id).await.unwrap();

    assert_eq!(first.status, InvestmentStatus::Confirmed);
    assert_eq!(second.status, InvestmentStatus::Confirmed);
    let listing = store.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(listing.raised_amount, Paise::new(3_700_000));
    assert_eq!(
        store.transactions_for_investment(pending.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_payment_event_must_match_investment() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let demo = seed_demo(store.as_ref()).await.unwrap();
    let engine = SettlementEngine::with_gateway(
        store.clone(),
        Arc::new(CallbackGateway),
        SettlementConfig::default(),
    );
    let pending = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, false))
        .await
        .unwrap();

    let mut event = PaymentReceived::for_investment(&pending);
    event.amount = Paise::new(1);
    let err = engine.confirmations().handle(&event).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let mut event = PaymentReceived::for_investment(&pending);
    event.payment_reference = "EXT-forged".to_string();
    let err = engine.confirmations().handle(&event).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let confirmed = engine
        .confirmations()
        .handle(&PaymentReceived::for_investment(&pending))
        .await
        .unwrap();
    assert_eq!(confirmed.status, InvestmentStatus::Confirmed);
}

#[tokio::test]
async fn test_pending_reservations_count_against_target() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = SettlementEngine::with_gateway(
        store.clone(),
        Arc::new(CallbackGateway),
        SettlementConfig::default(),
    );
    let investor = add_investor(&store, 100_000).await;
    let listing = add_listing(&store, 1_000, 5_000, 0).await;

    engine
        .settle(SettleRequest::new(listing.id, investor.id, 4, false))
        .await
        .expect("pending reservation");

    let err = engine
        .settle(SettleRequest::new(listing.id, investor.id, 2, true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::FundingCapExceeded { remaining, .. } if remaining == Paise::new(1_000)
    ));
}

#[tokio::test]
async fn test_unconfirmed_reservation_holds_capacity() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = SettlementEngine::with_gateway(
        store.clone(),
        Arc::new(CallbackGateway),
        SettlementConfig::default(),
    );
    let investor = add_investor(&store, 100_000).await;
    let listing = add_listing(&store, 1_000, 5_000, 0).await;

    let pending = engine
        .settle(SettleRequest::new(listing.id, investor.id, 5, false))
        .await
        .unwrap();
    assert_eq!(pending.status, InvestmentStatus::Pending);

    // No payment arrives; the listing stays LIVE with nothing left to sell
    let err = engine
        .settle(SettleRequest::new(listing.id, investor.id, 1, true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::FundingCapExceeded { remaining, .. } if remaining == Paise::ZERO
    ));

    let listing = store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(listing.status, ListingStatus::Live);
    assert_eq!(listing.raised_amount, Paise::ZERO);
}

#[tokio::test]
async fn test_idempotency_key_replays_original_investment() {
    let (engine, store, demo) = setup().await;
    let request =
        SettleRequest::new(demo.listing.id, demo.investor.id, 1, true).with_idempotency_key("order-42");

    let first = engine.settle(request.clone()).await.unwrap();
    let replay = engine.settle(request).await.unwrap();

    assert_eq!(first.id, replay.id);
    let investor = store.investor(demo.investor.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::ZERO);
    assert_eq!(store.transaction_count().await.unwrap(), 1);

    let conflicting =
        SettleRequest::new(demo.listing.id, demo.investor.id, 2, true).with_idempotency_key("order-42");
    let err = engine.settle(conflicting).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_listing_detail_lists_investments() {
    let (engine, store, demo) = setup().await;
    let investment = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .unwrap();

    let detail = ListingQueryService::new(store)
        .listing_detail(demo.listing.id)
        .await
        .unwrap();

    assert_eq!(detail.progress.progress_percent, 74);
    assert_eq!(detail.investments.len(), 1);
    assert_eq!(detail.investments[0].id, investment.id);
}
