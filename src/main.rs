//! DRIP — Automated daily DCA purchases on the Gemini exchange
//!
//! Entry point. Loads configuration, initialises structured logging,
//! runs one purchase per configured ticker, and records the fulfilled
//! purchases to the spreadsheet log and the database. Meant to be run
//! once a day by a scheduler.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use drip::config::{self, Clock};
use drip::engine::dispatcher::Engine;
use drip::sheets::{self, SheetsClient};
use drip::storage::{self, PurchaseStore};
use drip::types::PurchaseResult;
use drip::venue::gemini::GeminiClient;

const BANNER: &str = r#"
  ____  ____  ___ ____
 |  _ \|  _ \|_ _|  _ \
 | | | | |_) || || |_) |
 | |_| |  _ < | ||  __/
 |____/|_| \_\___|_|

  Daily Recurring Investment Purchaser
  v0.1.0 — Set & Forget DCA
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        sandbox = cfg.sandbox,
        tickers = ?cfg.purchase.tickers,
        utc_offset_hours = cfg.utc_offset_hours,
        "DRIP starting up"
    );

    // One timestamp for the whole run: ordering, recording and row math
    // all agree on the day even if fulfillment crosses midnight.
    let clock = Clock::new(cfg.utc_offset_hours)?;
    info!(date = %clock.date_string(), "Purchasing for day");

    // -- Initialise components ---------------------------------------------

    let venue = GeminiClient::new(&cfg.venue, &cfg.purchase, cfg.sandbox)?;

    // Recording targets come up before any order is placed, so a broken
    // token or database URL fails the run immediately.
    let sheets_client = SheetsClient::new(&cfg.sheets)?;
    let database_url = config::AppConfig::resolve_env(&cfg.db.url_env)?;
    let store = PurchaseStore::connect(&database_url).await?;

    // -- Purchase ------------------------------------------------------------

    let engine = Engine::new(
        Arc::new(venue),
        cfg.purchase.clone(),
        cfg.engine.clone(),
        cfg.sandbox,
    );
    let results = engine.run().await;

    if results.is_empty() {
        warn!("No purchases fulfilled today, nothing to record");
        return Ok(());
    }

    // -- Record ----------------------------------------------------------

    record_purchases(&sheets_client, &store, &cfg, &clock, &results).await?;

    info!(purchases = results.len(), "DRIP run complete");
    Ok(())
}

/// Write the day's fulfilled purchases to the spreadsheet log, then to
/// the database.
async fn record_purchases(
    sheets_client: &SheetsClient,
    store: &PurchaseStore,
    cfg: &config::AppConfig,
    clock: &Clock,
    results: &BTreeMap<String, PurchaseResult>,
) -> Result<()> {
    let sheet_id = sheets_client.sheet_id().await?;
    let request = sheets::build_batch_update(&cfg.sheets, clock, sheet_id, results)?;
    sheets_client.batch_update(&request).await?;

    let rows = storage::build_rows(results, clock);
    store.insert_purchases(&rows).await?;

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("drip=info"));

    let json_logging = std::env::var("DRIP_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
