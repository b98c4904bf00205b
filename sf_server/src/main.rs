//! Settlement server for shop fundraising listings.
//!
//! Wires the configured ledger backend and payment gateway into a
//! `SettlementEngine` and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use log::{error, info};
use pico_args::Arguments;
use sf_server::api::{self, AppState};
use sf_server::config::{GatewayMode, ServerConfig, StorageMode};
use sf_server::{logging, metrics};
use shopfund::ledger::seed::seed_demo;
use shopfund::settlement::{
    CallbackGateway, ConfirmationWorker, InstantGateway, PaymentGateway,
};
use shopfund::store::{Database, InMemoryLedgerStore, LedgerStore, PgLedgerStore};
use shopfund::{ConfirmationHandler, SettlementEngine};

const HELP: &str = "\
Run the shopfund settlement server

USAGE:
  sf_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --in-memory              Keep the ledger in process memory instead of Postgres
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               Identity token verification secret (required)
  WEBHOOK_SECRET           Payment webhook signing secret (required)
  LEDGER_STORE             postgres | memory
  PAYMENT_GATEWAY          instant | deferred | callback
  FUNDING_POLICY           reject_overflow | allow_overfunding
  METRICS_BIND             Prometheus scrape address (disabled when unset)
  SEED_DEMO                Insert the demo investor, shop and listing
";

/// Queue depth for deferred payment confirmations
const CONFIRMATION_QUEUE: usize = 256;

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        in_memory: pargs.contains("--in-memory"),
    };

    // Before config, so fallback warnings are emitted
    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.in_memory)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics on http://{addr}/metrics");
    }

    let (store, database): (Arc<dyn LedgerStore>, Option<Database>) = match config.storage {
        StorageMode::InMemory => {
            info!("Using in-memory ledger");
            let store = InMemoryLedgerStore::with_lock_timeout(config.database.lock_timeout());
            (Arc::new(store), None)
        }
        StorageMode::Postgres => {
            info!("Connecting to database");
            let db = Database::new(&config.database)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            db.migrate()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to apply ledger schema: {}", e))?;
            info!("Database connected successfully");

            let store =
                PgLedgerStore::new(Arc::new(db.pool().clone()), config.database.lock_timeout());
            (Arc::new(store), Some(db))
        }
    };

    if config.seed_demo {
        match seed_demo(store.as_ref()).await {
            Ok(demo) => info!("Demo listing {} is LIVE", demo.listing.id),
            Err(e) => error!("Failed to seed demo ledger: {}", e),
        }
    }

    let gateway: Arc<dyn PaymentGateway> = match config.gateway {
        GatewayMode::Instant => Arc::new(InstantGateway),
        GatewayMode::Callback => Arc::new(CallbackGateway),
        GatewayMode::Deferred => {
            let handler = ConfirmationHandler::new(store.clone(), &config.settlement);
            let (gateway, worker) = ConfirmationWorker::channel(handler, CONFIRMATION_QUEUE);
            tokio::spawn(worker.run());
            Arc::new(gateway)
        }
    };

    info!(
        "Settlement: policy {}, gateway {}, up to {} attempts",
        config.settlement.funding_policy.as_str(),
        gateway.name(),
        config.settlement.retry.max_attempts
    );

    let engine = SettlementEngine::with_gateway(store, gateway, config.settlement.clone());
    let state = AppState::new(
        engine,
        &config.security.jwt_secret,
        &config.security.webhook_secret,
        database.clone(),
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
