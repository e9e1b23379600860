//! Trading venue integrations.
//!
//! Defines the `TradingVenue` trait and provides the Gemini exchange
//! implementation the purchaser runs against.

pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{MarketPrecision, Order};

/// Abstraction over crypto trading venues.
///
/// Implementors provide quote data and the order lifecycle for one ticker
/// at a time. Amounts are sized by the venue from its configured daily
/// fiat spend; callers never pass a quantity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingVenue: Send + Sync {
    /// Decimal precision the ticker's order fields must be quoted at.
    async fn market_precision(&self, ticker: &str) -> Result<MarketPrecision>;

    /// Highest resting buy price on the ticker's book.
    async fn best_bid(&self, ticker: &str) -> Result<Decimal>;

    /// Place a limit buy priced off the given best bid and sized from the
    /// ticker's configured daily fiat amount.
    async fn create_order(
        &self,
        ticker: &str,
        best_bid: Decimal,
        precision: MarketPrecision,
    ) -> Result<Order>;

    /// Most recent active order for the ticker.
    /// Used to recover when order creation fails mid-flight.
    async fn find_active_order(&self, ticker: &str) -> Result<Order>;

    /// Current state of an order by id.
    async fn order_status(&self, order_id: &str) -> Result<Order>;

    /// Cancel an order by id and return its post-cancel state.
    async fn cancel_order(&self, order_id: &str) -> Result<Order>;

    /// Venue name for logging and identification.
    fn name(&self) -> &'static str;
}
