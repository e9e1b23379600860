//! Concurrent purchase dispatch across tickers.
//!
//! Each configured ticker gets its own task; the run completes when every
//! task has either recorded a fulfilled purchase or given up. Results are
//! aggregated into an ordered map so downstream recording is
//! deterministic.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::order::fulfill_ticker;
use super::EnginePolicy;
use crate::config::PurchaseConfig;
use crate::types::PurchaseResult;
use crate::venue::TradingVenue;

/// Runs one purchase per configured ticker, concurrently.
pub struct Engine {
    venue: Arc<dyn TradingVenue>,
    purchase: PurchaseConfig,
    policy: EnginePolicy,
    sandbox: bool,
    skip_waits: bool,
}

impl Engine {
    pub fn new(
        venue: Arc<dyn TradingVenue>,
        purchase: PurchaseConfig,
        policy: EnginePolicy,
        sandbox: bool,
    ) -> Self {
        Self {
            venue,
            purchase,
            policy,
            sandbox,
            skip_waits: false,
        }
    }

    /// Drop the pacing sleeps. Tests only; live runs keep them.
    pub fn without_waits(mut self) -> Self {
        self.skip_waits = true;
        self
    }

    /// Run all tickers to completion and return the results keyed by
    /// ticker, in ticker order.
    ///
    /// A ticker that never fulfills is simply absent from the map. A
    /// panicking task takes the whole run down.
    pub async fn run(&self) -> BTreeMap<String, PurchaseResult> {
        info!(
            venue = self.venue.name(),
            tickers = self.purchase.tickers.len(),
            sandbox = self.sandbox,
            "Dispatching daily purchases"
        );

        let results = Arc::new(Mutex::new(BTreeMap::new()));
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.purchase.tickers.len());

        for ticker in self.purchase.tickers.clone() {
            let venue = Arc::clone(&self.venue);
            let purchase = self.purchase.clone();
            let policy = self.policy.clone();
            let results = Arc::clone(&results);
            let sandbox = self.sandbox;
            let skip_waits = self.skip_waits;
            handles.push(tokio::spawn(async move {
                purchase_ticker(venue, purchase, policy, sandbox, skip_waits, ticker, results)
                    .await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        let aggregated = results.lock().await.clone();
        info!(fulfilled = aggregated.len(), "Purchase dispatch complete");
        aggregated
    }
}

async fn purchase_ticker(
    venue: Arc<dyn TradingVenue>,
    purchase: PurchaseConfig,
    policy: EnginePolicy,
    sandbox: bool,
    skip_waits: bool,
    ticker: String,
    results: Arc<Mutex<BTreeMap<String, PurchaseResult>>>,
) {
    let daily_fiat = purchase
        .daily_fiat_amounts
        .get(&ticker)
        .copied()
        .unwrap_or(Decimal::ZERO);
    if daily_fiat <= Decimal::ZERO {
        warn!(ticker = %ticker, "Purchase is turned off");
        return;
    }

    // Sandbox runs record a synthetic fill without touching the venue.
    if sandbox {
        let result = PurchaseResult::sandbox(daily_fiat, purchase.maker_fee);
        info!(ticker = %ticker, %result, "Recorded synthetic sandbox purchase");
        results.lock().await.insert(ticker, result);
        return;
    }

    if let Some(order) = fulfill_ticker(venue.as_ref(), &policy, skip_waits, &ticker).await {
        let result = PurchaseResult::from_order(&order, purchase.maker_fee);
        info!(ticker = %ticker, order = %order, %result, "Daily purchase fulfilled");
        results.lock().await.insert(ticker, result);
    }
}
