//! Mock trading venue for integration testing.
//!
//! Provides a deterministic `TradingVenue` implementation driven by a
//! script: each script models one venue behaviour (immediate fill, slow
//! fill, repeated cancellation, outage), all in-memory with no external
//! dependencies. Every call is counted so tests can assert exactly how
//! the engine paced its requests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use drip::types::{MarketPrecision, Order};
use drip::venue::TradingVenue;

/// How the mock venue behaves across one ticker's purchase.
#[derive(Debug, Clone, Copy)]
pub enum VenueScript {
    /// Orders fill the moment they are placed.
    FillImmediately,
    /// Orders rest for this many polls, then fill.
    FillAfterPolls(u32),
    /// Every created order comes back already cancelled.
    CancelOnEveryCreate,
    /// Orders rest forever; cancels succeed.
    NeverFill,
    /// The quote feed is down; everything else would work.
    FailBestBid,
    /// Creation errors out, but the order actually landed and is found
    /// among the active orders, already filled.
    CreateFailsThenActiveOrderFills,
    /// Orders rest forever and cancel requests do not stick.
    CancelUnconfirmed,
}

/// A scripted venue with call counters.
pub struct MockVenue {
    script: VenueScript,
    /// Per-ticker script overrides, for runs mixing healthy and broken
    /// tickers.
    overrides: HashMap<String, VenueScript>,
    precision_calls: AtomicU32,
    bid_calls: AtomicU32,
    create_calls: AtomicU32,
    find_calls: AtomicU32,
    status_calls: AtomicU32,
    cancel_calls: AtomicU32,
}

impl MockVenue {
    pub fn new(script: VenueScript) -> Self {
        Self {
            script,
            overrides: HashMap::new(),
            precision_calls: AtomicU32::new(0),
            bid_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            find_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    pub fn with_override(mut self, ticker: &str, script: VenueScript) -> Self {
        self.overrides.insert(ticker.to_string(), script);
        self
    }

    fn script_for(&self, ticker: &str) -> VenueScript {
        self.overrides.get(ticker).copied().unwrap_or(self.script)
    }

    pub fn precision_calls(&self) -> u32 {
        self.precision_calls.load(Ordering::SeqCst)
    }

    pub fn bid_calls(&self) -> u32 {
        self.bid_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> u32 {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        self.precision_calls()
            + self.bid_calls()
            + self.create_calls()
            + self.find_calls()
            + self.status_calls()
            + self.cancel_calls()
    }
}

/// A filled order with hand-checkable numbers: 1000.50 × 2 plus the
/// 0.002 maker fee gives a 2005.002 deposit.
pub fn fulfilled_order() -> Order {
    make_order("BTC", false, false)
}

fn make_order(ticker: &str, is_live: bool, is_cancelled: bool) -> Order {
    Order {
        id: format!("{ticker}-106817811"),
        symbol: format!("{}sgd", ticker.to_ascii_lowercase()),
        price: dec!(1000.50),
        avg_execution_price: dec!(1000.50),
        executed_amount: dec!(2),
        original_amount: dec!(2),
        is_live,
        is_cancelled,
    }
}

/// Order ids carry the ticker so status and cancel calls can look up the
/// ticker's script.
fn ticker_of(order_id: &str) -> &str {
    order_id.split_once('-').map_or(order_id, |(ticker, _)| ticker)
}

#[async_trait]
impl TradingVenue for MockVenue {
    async fn market_precision(&self, _ticker: &str) -> Result<MarketPrecision> {
        self.precision_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MarketPrecision {
            price_decimals: 2,
            amount_decimals: 8,
        })
    }

    async fn best_bid(&self, ticker: &str) -> Result<Decimal> {
        self.bid_calls.fetch_add(1, Ordering::SeqCst);
        match self.script_for(ticker) {
            VenueScript::FailBestBid => Err(anyhow!("quote feed down")),
            _ => Ok(dec!(9345.70)),
        }
    }

    async fn create_order(
        &self,
        ticker: &str,
        _best_bid: Decimal,
        _precision: MarketPrecision,
    ) -> Result<Order> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.script_for(ticker) {
            VenueScript::FillImmediately => Ok(make_order(ticker, false, false)),
            VenueScript::CancelOnEveryCreate => Ok(make_order(ticker, false, true)),
            VenueScript::CreateFailsThenActiveOrderFills => Err(anyhow!("connection reset")),
            _ => Ok(make_order(ticker, true, false)),
        }
    }

    async fn find_active_order(&self, ticker: &str) -> Result<Order> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        match self.script_for(ticker) {
            VenueScript::CreateFailsThenActiveOrderFills => Ok(make_order(ticker, false, false)),
            _ => Err(anyhow!("No active order found for {ticker}")),
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<Order> {
        let polls = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let ticker = ticker_of(order_id);
        match self.script_for(ticker) {
            VenueScript::FillAfterPolls(n) if polls > n => Ok(make_order(ticker, false, false)),
            VenueScript::FillAfterPolls(_) => Ok(make_order(ticker, true, false)),
            VenueScript::NeverFill | VenueScript::CancelUnconfirmed => {
                Ok(make_order(ticker, true, false))
            }
            _ => Ok(make_order(ticker, false, false)),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let ticker = ticker_of(order_id);
        match self.script_for(ticker) {
            VenueScript::CancelUnconfirmed => Ok(make_order(ticker, true, false)),
            _ => Ok(make_order(ticker, false, true)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fill_after_polls_script() {
        let venue = MockVenue::new(VenueScript::FillAfterPolls(2));
        assert!(venue.order_status("1").await.unwrap().is_live);
        assert!(venue.order_status("1").await.unwrap().is_live);
        assert!(!venue.order_status("1").await.unwrap().is_live);
        assert_eq!(venue.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_cancel_unconfirmed_script() {
        let venue = MockVenue::new(VenueScript::CancelUnconfirmed);
        let order = venue.cancel_order("1").await.unwrap();
        assert!(!order.is_cancelled);
    }

    #[tokio::test]
    async fn test_fail_best_bid_script_counts_calls() {
        let venue = MockVenue::new(VenueScript::FailBestBid);
        assert!(venue.best_bid("BTC").await.is_err());
        assert!(venue.best_bid("BTC").await.is_err());
        assert_eq!(venue.bid_calls(), 2);
    }

    #[tokio::test]
    async fn test_override_reaches_status_and_cancel() {
        let venue = MockVenue::new(VenueScript::FillImmediately)
            .with_override("ETH", VenueScript::CancelUnconfirmed);
        let precision = MarketPrecision {
            price_decimals: 2,
            amount_decimals: 8,
        };
        let order = venue
            .create_order("ETH", dec!(9345.70), precision)
            .await
            .unwrap();

        // Under the default script the first poll would report a fill and
        // the cancel would stick; the override keeps the order resting.
        assert!(venue.order_status(&order.id).await.unwrap().is_live);
        assert!(!venue.cancel_order(&order.id).await.unwrap().is_cancelled);
    }
}
