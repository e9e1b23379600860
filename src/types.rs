//! Shared types for the DRIP purchaser.
//!
//! These types form the data model used across all modules: exchange
//! orders as the venue reports them, market precision metadata, and the
//! per-ticker purchase results the engine aggregates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// An order as reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Traded symbol, lowercase (e.g. "btcsgd").
    pub symbol: String,
    /// Limit price the order was placed at.
    pub price: Decimal,
    /// Volume-weighted average price of the filled portion.
    pub avg_execution_price: Decimal,
    pub executed_amount: Decimal,
    pub original_amount: Decimal,
    /// Whether the order is still resting on the book.
    pub is_live: bool,
    /// Whether the order has been cancelled (possibly after a partial fill).
    pub is_cancelled: bool,
}

impl Order {
    /// Classify the order from its live/cancelled flags.
    ///
    /// Cancellation takes precedence: an order reporting both live and
    /// cancelled counts as cancelled.
    pub fn status(&self) -> OrderStatus {
        if self.is_cancelled {
            OrderStatus::Cancelled
        } else if self.is_live {
            OrderStatus::Pending
        } else {
            OrderStatus::Fulfilled
        }
    }

    /// Whether the order filled completely and left the book.
    pub fn is_fulfilled(&self) -> bool {
        self.status() == OrderStatus::Fulfilled
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {} (price={} avg={} filled={}/{})",
            self.symbol,
            self.id,
            self.status(),
            self.price,
            self.avg_execution_price,
            self.executed_amount,
            self.original_amount,
        )
    }
}

/// Lifecycle classification of an exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Fully filled and off the book.
    Fulfilled,
    /// Cancelled by the venue or by us.
    Cancelled,
    /// Still live on the book, waiting to fill.
    Pending,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Fulfilled => write!(f, "fulfilled"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Pending => write!(f, "pending"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market precision
// ---------------------------------------------------------------------------

/// Decimal places a symbol's order fields must be quoted at.
///
/// Derived from the venue's symbol details: the quote increment bounds the
/// price, the tick size bounds the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPrecision {
    pub price_decimals: u32,
    pub amount_decimals: u32,
}

impl fmt::Display for MarketPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price_dp={} amount_dp={}",
            self.price_decimals, self.amount_decimals,
        )
    }
}

// ---------------------------------------------------------------------------
// Purchase results
// ---------------------------------------------------------------------------

/// Outcome of one ticker's daily purchase, as recorded downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseResult {
    /// Fiat actually spent, fees included.
    pub actual_fiat_deposit: Decimal,
    pub avg_execution_price: Decimal,
    pub executed_amount: Decimal,
}

impl PurchaseResult {
    /// Build a result from a fulfilled order.
    ///
    /// The deposit is the executed cost plus the maker fee:
    /// `avg_execution_price × executed_amount × (1 + fee)`.
    pub fn from_order(order: &Order, maker_fee: Decimal) -> Self {
        let deposit =
            order.avg_execution_price * order.executed_amount * (Decimal::ONE + maker_fee);
        Self {
            actual_fiat_deposit: deposit,
            avg_execution_price: order.avg_execution_price,
            executed_amount: order.executed_amount,
        }
    }

    /// Synthetic result recorded in sandbox mode, where no venue order
    /// exists: the configured daily amount plus fees, at a fixed price of
    /// 1000 for exactly 1 unit.
    pub fn sandbox(daily_fiat: Decimal, maker_fee: Decimal) -> Self {
        Self {
            actual_fiat_deposit: daily_fiat * (Decimal::ONE + maker_fee),
            avg_execution_price: Decimal::ONE_THOUSAND,
            executed_amount: Decimal::ONE,
        }
    }
}

impl fmt::Display for PurchaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deposit={} avg_price={} amount={}",
            self.actual_fiat_deposit, self.avg_execution_price, self.executed_amount,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for DRIP.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DripError {
    /// The venue reported the order cancelled while we were trying to
    /// get it filled.
    #[error("order is cancelled")]
    OrderCancelled,

    /// A cancel request succeeded but the returned order did not confirm
    /// cancellation.
    #[error("order {0} not confirmed cancelled")]
    CancelUnconfirmed(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_order(is_live: bool, is_cancelled: bool) -> Order {
        Order {
            id: "106817811".to_string(),
            symbol: "btcsgd".to_string(),
            price: dec!(9336.35),
            avg_execution_price: dec!(1000.50),
            executed_amount: dec!(2),
            original_amount: dec!(2),
            is_live,
            is_cancelled,
        }
    }

    // -- Order classification tests --

    #[test]
    fn test_status_fulfilled() {
        assert_eq!(make_order(false, false).status(), OrderStatus::Fulfilled);
        assert!(make_order(false, false).is_fulfilled());
    }

    #[test]
    fn test_status_pending() {
        assert_eq!(make_order(true, false).status(), OrderStatus::Pending);
        assert!(!make_order(true, false).is_fulfilled());
    }

    #[test]
    fn test_status_cancelled() {
        assert_eq!(make_order(false, true).status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_status_cancelled_wins_over_live() {
        // A live+cancelled combination counts as cancelled.
        assert_eq!(make_order(true, true).status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_order_display() {
        let order = make_order(true, false);
        let display = format!("{order}");
        assert!(display.contains("btcsgd"));
        assert!(display.contains("106817811"));
        assert!(display.contains("pending"));
    }

    #[test]
    fn test_order_serialization_roundtrip() {
        let order = make_order(false, false);
        let json = serde_json::to_string(&order).unwrap();
        let parsed: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "106817811");
        assert_eq!(parsed.avg_execution_price, dec!(1000.50));
        assert!(parsed.is_fulfilled());
    }

    // -- OrderStatus tests --

    #[test]
    fn test_order_status_display() {
        assert_eq!(format!("{}", OrderStatus::Fulfilled), "fulfilled");
        assert_eq!(format!("{}", OrderStatus::Cancelled), "cancelled");
        assert_eq!(format!("{}", OrderStatus::Pending), "pending");
    }

    // -- MarketPrecision tests --

    #[test]
    fn test_precision_display() {
        let precision = MarketPrecision {
            price_decimals: 2,
            amount_decimals: 8,
        };
        assert_eq!(format!("{precision}"), "price_dp=2 amount_dp=8");
    }

    // -- PurchaseResult tests --

    #[test]
    fn test_from_order_applies_maker_fee() {
        let order = make_order(false, false); // avg=1000.50, executed=2
        let result = PurchaseResult::from_order(&order, dec!(0.002));
        // 1000.50 × 2 = 2001.00; × 1.002 = 2005.002
        assert_eq!(result.actual_fiat_deposit, dec!(2005.002));
        assert_eq!(result.avg_execution_price, dec!(1000.50));
        assert_eq!(result.executed_amount, dec!(2));
    }

    #[test]
    fn test_sandbox_result_is_exact() {
        let result = PurchaseResult::sandbox(dec!(1), dec!(0.002));
        assert_eq!(result.actual_fiat_deposit, dec!(1.002));
        assert_eq!(result.avg_execution_price, dec!(1000));
        assert_eq!(result.executed_amount, dec!(1));

        let result = PurchaseResult::sandbox(dec!(2), dec!(0.002));
        assert_eq!(result.actual_fiat_deposit, dec!(2.004));
    }

    #[test]
    fn test_purchase_result_display() {
        let result = PurchaseResult::sandbox(dec!(1), dec!(0.002));
        let display = format!("{result}");
        assert!(display.contains("1.002"));
        assert!(display.contains("1000"));
    }

    #[test]
    fn test_purchase_result_serialization_roundtrip() {
        let result = PurchaseResult::sandbox(dec!(2), dec!(0.002));
        let json = serde_json::to_string(&result).unwrap();
        let parsed: PurchaseResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }

    // -- DripError tests --

    #[test]
    fn test_drip_error_display() {
        assert_eq!(format!("{}", DripError::OrderCancelled), "order is cancelled");
        let e = DripError::CancelUnconfirmed("106817811".to_string());
        assert!(format!("{e}").contains("106817811"));
    }
}
