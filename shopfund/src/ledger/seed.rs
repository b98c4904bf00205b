//! Demo ledger contents for local runs.

use chrono::{Duration, Utc};

use super::models::{Investor, KycStatus, Listing, Shop};
use crate::money::Paise;
use crate::settlement::SettlementResult;
use crate::store::LedgerStore;

/// Rows inserted by [`seed_demo`]
#[derive(Debug, Clone)]
pub struct DemoLedger {
    pub investor: Investor,
    pub shop: Shop,
    pub listing: Listing,
}

/// Build the demo investor, shop and LIVE listing without persisting them.
///
/// The investor holds ₹5,000 and the listing sells ₹5,000 tickets towards a
/// ₹50,000 target with ₹32,000 already raised.
pub fn demo_ledger() -> DemoLedger {
    let mut investor = Investor::new(
        "+919876543210",
        Some("Demo Investor".to_string()),
        Paise::new(500_000),
    );
    investor.kyc_status = KycStatus::Approved;

    let mut shop = Shop::new("+919876543211", "Ashish", "Ashish's Chai Point", "Bangalore");
    shop.avg_daily_revenue = Some(Paise::new(1_200_000));

    let mut listing = Listing::new(
        shop.id,
        "Expand Chai Point Location",
        Paise::new(500_000),
        Paise::new(5_000_000),
    );
    listing.description =
        "Help us expand our successful chai point with new equipment and larger space".to_string();
    listing.raised_amount = Paise::new(3_200_000);
    listing.opens_at = Some(Utc::now());
    listing.closes_at = Some(Utc::now() + Duration::days(30));

    DemoLedger {
        investor,
        shop,
        listing,
    }
}

/// Insert the demo rows into `store`.
pub async fn seed_demo(store: &dyn LedgerStore) -> SettlementResult<DemoLedger> {
    let demo = demo_ledger();
    store.insert_investor(&demo.investor).await?;
    store.insert_shop(&demo.shop).await?;
    store.insert_listing(&demo.listing).await?;

    log::info!(
        "Seeded demo ledger: investor {}, shop {}, listing {}",
        demo.investor.id,
        demo.shop.id,
        demo.listing.id
    );

    Ok(demo)
}
