//! PostgreSQL ledger store.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;

use super::repository::{LedgerStore, LedgerTx};
use crate::ledger::{
    Investment, InvestmentId, InvestmentStatus, Investor, InvestorId, LedgerTransaction, Listing,
    ListingId, ListingStatus, ParseEnumError, Shop, ShopId, TransactionMetadata,
};
use crate::money::Paise;
use crate::settlement::{SettlementError, SettlementResult};

const INVESTOR_COLUMNS: &str =
    "id, phone, name, wallet_balance_paise, kyc_status, created_at, updated_at";

const SHOP_COLUMNS: &str =
    "id, phone, owner_name, shop_name, city, avg_daily_revenue_paise, created_at, updated_at";

const LISTING_COLUMNS: &str = "id, shop_id, title, description, ticket_price_paise, \
     target_amount_paise, raised_amount_paise, status, opens_at, closes_at, created_at, updated_at";

const INVESTMENT_COLUMNS: &str = "id, listing_id, investor_id, num_tickets, amount_paid_paise, \
     funding_method, payment_reference, idempotency_key, status, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, tx_type, actor_type, actor_id, shop_id, amount_paise, metadata, created_at";

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    /// Create a new PostgreSQL ledger store
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `lock_timeout` - How long a unit of work waits for a row lock
    pub fn new(pool: Arc<PgPool>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> SettlementResult<Box<dyn LedgerTx>> {
        let mut tx = self.pool.begin().await?;

        // Lock waits past this bound fail with 55P03 and surface as ConflictAbort
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn listing(&self, listing_id: ListingId) -> SettlementResult<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(listing_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn shop(&self, shop_id: ShopId) -> SettlementResult<Option<Shop>> {
        let row = sqlx::query(&format!("SELECT {SHOP_COLUMNS} FROM shops WHERE id = $1"))
            .bind(shop_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(shop_from_row))
    }

    async fn listings_by_status(&self, status: ListingStatus) -> SettlementResult<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(listing_from_row).collect()
    }

    async fn investor(&self, investor_id: InvestorId) -> SettlementResult<Option<Investor>> {
        let row = sqlx::query(&format!(
            "SELECT {INVESTOR_COLUMNS} FROM investors WHERE id = $1"
        ))
        .bind(investor_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(investor_from_row).transpose()
    }

    async fn investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>> {
        let row = sqlx::query(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments WHERE id = $1"
        ))
        .bind(investment_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(investment_from_row).transpose()
    }

    async fn investments_for_listing(
        &self,
        listing_id: ListingId,
    ) -> SettlementResult<Vec<Investment>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments WHERE listing_id = $1 ORDER BY created_at ASC"
        ))
        .bind(listing_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(investment_from_row).collect()
    }

    async fn transactions_for_investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Vec<LedgerTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions
             WHERE metadata ->> 'investment_id' = $1
             ORDER BY created_at ASC"
        ))
        .bind(investment_id.to_string())
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn insert_investor(&self, investor: &Investor) -> SettlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO investors (id, phone, name, wallet_balance_paise, kyc_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(investor.id)
        .bind(&investor.phone)
        .bind(&investor.name)
        .bind(investor.wallet_balance.value())
        .bind(investor.kyc_status.as_str())
        .bind(investor.created_at.naive_utc())
        .bind(investor.updated_at.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_shop(&self, shop: &Shop) -> SettlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO shops (id, phone, owner_name, shop_name, city, avg_daily_revenue_paise, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(shop.id)
        .bind(&shop.phone)
        .bind(&shop.owner_name)
        .bind(&shop.shop_name)
        .bind(&shop.city)
        .bind(shop.avg_daily_revenue.map(Paise::value))
        .bind(shop.created_at.naive_utc())
        .bind(shop.updated_at.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_listing(&self, listing: &Listing) -> SettlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, shop_id, title, description, ticket_price_paise, target_amount_paise,
                                  raised_amount_paise, status, opens_at, closes_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(listing.id)
        .bind(listing.shop_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.ticket_price.value())
        .bind(listing.target_amount.value())
        .bind(listing.raised_amount.value())
        .bind(listing.status.as_str())
        .bind(listing.opens_at.map(|at| at.naive_utc()))
        .bind(listing.closes_at.map(|at| at.naive_utc()))
        .bind(listing.created_at.naive_utc())
        .bind(listing.updated_at.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

/// Unit of work over a PostgreSQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_listing(&mut self, listing_id: ListingId) -> SettlementResult<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1 FOR UPDATE"
        ))
        .bind(listing_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn lock_investor(
        &mut self,
        investor_id: InvestorId,
    ) -> SettlementResult<Option<Investor>> {
        let row = sqlx::query(&format!(
            "SELECT {INVESTOR_COLUMNS} FROM investors WHERE id = $1 FOR UPDATE"
        ))
        .bind(investor_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(investor_from_row).transpose()
    }

    async fn lock_investment(
        &mut self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>> {
        let row = sqlx::query(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments WHERE id = $1 FOR UPDATE"
        ))
        .bind(investment_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(investment_from_row).transpose()
    }

    async fn find_by_idempotency_key(
        &mut self,
        investor_id: InvestorId,
        key: &str,
    ) -> SettlementResult<Option<Investment>> {
        let row = sqlx::query(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments
             WHERE investor_id = $1 AND idempotency_key = $2"
        ))
        .bind(investor_id)
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(investment_from_row).transpose()
    }

    async fn pending_total_for_listing(&mut self, listing_id: ListingId) -> SettlementResult<Paise> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount_paid_paise), 0)::BIGINT AS pending
             FROM investments
             WHERE listing_id = $1 AND status = 'PENDING'",
        )
        .bind(listing_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Paise::new(row.get("pending")))
    }

    async fn insert_investment(&mut self, investment: &Investment) -> SettlementResult<()> {
        let num_tickets = i32::try_from(investment.num_tickets).map_err(|_| {
            SettlementError::InvalidInput(format!(
                "ticket count {} out of range",
                investment.num_tickets
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO investments (id, listing_id, investor_id, num_tickets, amount_paid_paise, funding_method,
                                     payment_reference, idempotency_key, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(investment.id)
        .bind(investment.listing_id)
        .bind(investment.investor_id)
        .bind(num_tickets)
        .bind(investment.amount_paid.value())
        .bind(investment.funding_method.as_str())
        .bind(&investment.payment_reference)
        .bind(&investment.idempotency_key)
        .bind(investment.status.as_str())
        .bind(investment.created_at.naive_utc())
        .bind(investment.updated_at.naive_utc())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn set_investment_status(
        &mut self,
        investment_id: InvestmentId,
        status: InvestmentStatus,
    ) -> SettlementResult<()> {
        let result = sqlx::query(
            "UPDATE investments
             SET status = $1, updated_at = (NOW() AT TIME ZONE 'utc')
             WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(investment_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SettlementError::InvestmentNotFound(investment_id));
        }
        Ok(())
    }

    async fn debit_wallet(
        &mut self,
        investor_id: InvestorId,
        amount: Paise,
    ) -> SettlementResult<Paise> {
        // Balance check and debit in one statement so the row can never go negative
        let row = sqlx::query(
            "UPDATE investors
             SET wallet_balance_paise = wallet_balance_paise - $1,
                 updated_at = (NOW() AT TIME ZONE 'utc')
             WHERE id = $2 AND wallet_balance_paise >= $1
             RETURNING wallet_balance_paise",
        )
        .bind(amount.value())
        .bind(investor_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Paise::new(row.get("wallet_balance_paise"))),
            None => {
                let current = sqlx::query("SELECT wallet_balance_paise FROM investors WHERE id = $1")
                    .bind(investor_id)
                    .fetch_optional(&mut *self.tx)
                    .await?;

                match current {
                    Some(row) => Err(SettlementError::InsufficientFunds {
                        available: Paise::new(row.get("wallet_balance_paise")),
                        required: amount,
                    }),
                    None => Err(SettlementError::InvestorNotFound(investor_id)),
                }
            }
        }
    }

    async fn credit_listing(
        &mut self,
        listing_id: ListingId,
        amount: Paise,
    ) -> SettlementResult<Paise> {
        let row = sqlx::query(
            "UPDATE listings
             SET raised_amount_paise = raised_amount_paise + $1,
                 updated_at = (NOW() AT TIME ZONE 'utc')
             WHERE id = $2
             RETURNING raised_amount_paise",
        )
        .bind(amount.value())
        .bind(listing_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(SettlementError::ListingNotFound(listing_id))?;

        Ok(Paise::new(row.get("raised_amount_paise")))
    }

    async fn set_listing_status(
        &mut self,
        listing_id: ListingId,
        status: ListingStatus,
    ) -> SettlementResult<()> {
        let result = sqlx::query(
            "UPDATE listings SET status = $1, updated_at = (NOW() AT TIME ZONE 'utc') WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(listing_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SettlementError::ListingNotFound(listing_id));
        }
        Ok(())
    }

    async fn append_transaction(&mut self, entry: &LedgerTransaction) -> SettlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_transactions (id, tx_type, actor_type, actor_id, shop_id, amount_paise, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tx_type.as_str())
        .bind(entry.actor_type.as_str())
        .bind(entry.actor_id)
        .bind(entry.shop_id)
        .bind(entry.amount.value())
        .bind(Json(entry.metadata))
        .bind(entry.created_at.naive_utc())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> SettlementResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SettlementResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn corrupt(err: ParseEnumError) -> SettlementError {
    SettlementError::StorageFailure(format!("corrupt ledger row: {err}"))
}

fn investor_from_row(row: &PgRow) -> SettlementResult<Investor> {
    Ok(Investor {
        id: row.get("id"),
        phone: row.get("phone"),
        name: row.get("name"),
        wallet_balance: Paise::new(row.get("wallet_balance_paise")),
        kyc_status: row
            .get::<String, _>("kyc_status")
            .parse()
            .map_err(corrupt)?,
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn shop_from_row(row: &PgRow) -> Shop {
    Shop {
        id: row.get("id"),
        phone: row.get("phone"),
        owner_name: row.get("owner_name"),
        shop_name: row.get("shop_name"),
        city: row.get("city"),
        avg_daily_revenue: row
            .get::<Option<i64>, _>("avg_daily_revenue_paise")
            .map(Paise::new),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    }
}

fn listing_from_row(row: &PgRow) -> SettlementResult<Listing> {
    Ok(Listing {
        id: row.get("id"),
        shop_id: row.get("shop_id"),
        title: row.get("title"),
        description: row.get("description"),
        ticket_price: Paise::new(row.get("ticket_price_paise")),
        target_amount: Paise::new(row.get("target_amount_paise")),
        raised_amount: Paise::new(row.get("raised_amount_paise")),
        status: row.get::<String, _>("status").parse().map_err(corrupt)?,
        opens_at: row
            .get::<Option<NaiveDateTime>, _>("opens_at")
            .map(|dt| dt.and_utc()),
        closes_at: row
            .get::<Option<NaiveDateTime>, _>("closes_at")
            .map(|dt| dt.and_utc()),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn investment_from_row(row: &PgRow) -> SettlementResult<Investment> {
    let num_tickets: i32 = row.get("num_tickets");
    Ok(Investment {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        investor_id: row.get("investor_id"),
        num_tickets: u32::try_from(num_tickets).map_err(|_| {
            SettlementError::StorageFailure(format!("corrupt ticket count {num_tickets}"))
        })?,
        amount_paid: Paise::new(row.get("amount_paid_paise")),
        funding_method: row
            .get::<String, _>("funding_method")
            .parse()
            .map_err(corrupt)?,
        payment_reference: row.get("payment_reference"),
        idempotency_key: row.get("idempotency_key"),
        status: row.get::<String, _>("status").parse().map_err(corrupt)?,
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn transaction_from_row(row: &PgRow) -> SettlementResult<LedgerTransaction> {
    let Json(metadata): Json<TransactionMetadata> = row.get("metadata");
    Ok(LedgerTransaction {
        id: row.get("id"),
        tx_type: row.get::<String, _>("tx_type").parse().map_err(corrupt)?,
        actor_type: row
            .get::<String, _>("actor_type")
            .parse()
            .map_err(corrupt)?,
        actor_id: row.get("actor_id"),
        shop_id: row.get("shop_id"),
        amount: Paise::new(row.get("amount_paise")),
        metadata,
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
    })
}
