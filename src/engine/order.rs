//! Order fulfillment for a single ticker.
//!
//! One placement window: fetch the best bid, rest a limit buy just under
//! it, poll until it fills, cancel if it never does. The supervisor opens
//! windows until one of them produces a fulfilled order or the run gives
//! up on the ticker.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::retry::{with_retries, RetryPolicy};
use super::EnginePolicy;
use crate::types::{DripError, MarketPrecision, Order, OrderStatus};
use crate::venue::TradingVenue;

/// Drive one ticker to a fulfilled order.
///
/// Returns `None` when the ticker has to be given up on: precision
/// lookup failed, or every placement window closed without a fill.
pub(crate) async fn fulfill_ticker(
    venue: &dyn TradingVenue,
    policy: &EnginePolicy,
    skip_waits: bool,
    ticker: &str,
) -> Option<Order> {
    let precision = match with_retries(
        &policy.retry,
        skip_waits,
        "fetch market precision",
        || venue.market_precision(ticker),
    )
    .await
    {
        Ok(precision) => precision,
        Err(e) => {
            error!(ticker = %ticker, error = %e, "Could not determine market precision, giving up");
            return None;
        }
    };

    for window in 1..=policy.window.placement_windows {
        match run_placement_cycle(venue, policy, skip_waits, ticker, precision).await {
            Ok(Some(order)) => return Some(order),
            Ok(None) => {
                debug!(ticker = %ticker, window, "Window closed without a fill");
            }
            Err(e) => {
                warn!(ticker = %ticker, window, error = %e, "Placement window failed");
            }
        }
    }

    warn!(ticker = %ticker, "No fulfilled order after all placement windows");
    None
}

/// One placement window: place, poll, cancel.
///
/// `Ok(Some)` is a fulfilled order, `Ok(None)` means the order was
/// cancelled cleanly without filling and the caller may open another
/// window. Errors abort the window only, not the run.
async fn run_placement_cycle(
    venue: &dyn TradingVenue,
    policy: &EnginePolicy,
    skip_waits: bool,
    ticker: &str,
    precision: MarketPrecision,
) -> Result<Option<Order>> {
    let retry = &policy.retry;

    let best_bid =
        with_retries(retry, skip_waits, "fetch best bid", || venue.best_bid(ticker)).await?;

    // Creation is never retried blindly: a lost response may still have
    // placed the order. Recover by matching the resting order instead.
    let mut order = match venue.create_order(ticker, best_bid, precision).await {
        Ok(order) => order,
        Err(e) => {
            warn!(ticker = %ticker, error = %e, "Order creation failed, searching for a resting order");
            with_retries(retry, skip_waits, "find active order", || {
                venue.find_active_order(ticker)
            })
            .await?
        }
    };

    // The venue occasionally hands back an already-cancelled order.
    // Re-place it a bounded number of times before giving up.
    let mut recreations = 0;
    while order.is_cancelled && recreations < retry.max_attempts {
        recreations += 1;
        warn!(ticker = %ticker, order = %order, recreations, "Order came back cancelled, re-creating");
        order = match venue.create_order(ticker, best_bid, precision).await {
            Ok(order) => order,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Order creation failed, searching for a resting order");
                with_retries(retry, skip_waits, "find active order", || {
                    venue.find_active_order(ticker)
                })
                .await?
            }
        };
    }
    if order.is_cancelled {
        error!(ticker = %ticker, order = %order, "Order still cancelled after re-creating");
        return Err(DripError::OrderCancelled.into());
    }

    if order.is_fulfilled() {
        info!(ticker = %ticker, order = %order, "Order fulfilled on placement");
        return Ok(Some(order));
    }

    // Poll the resting order. A poll that keeps failing falls through to
    // the cancel below so no order is left dangling on the book.
    for poll in 1..=policy.window.poll_attempts {
        if !skip_waits {
            debug!(ticker = %ticker, poll, "Waiting before next status poll");
            tokio::time::sleep(Duration::from_secs(policy.window.poll_interval_secs)).await;
        }

        match poll_order(venue, retry, skip_waits, ticker, &order.id).await {
            Ok(PollOutcome::Fulfilled(filled)) => return Ok(Some(filled)),
            Ok(PollOutcome::Cancelled) => return Err(DripError::OrderCancelled.into()),
            Ok(PollOutcome::Pending) => {}
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Status poll failed, cancelling the order");
                break;
            }
        }
    }

    // The window closed without a fill. Take the order off the book so the
    // next window starts from a fresh bid.
    let cancelled = with_retries(retry, skip_waits, "cancel order", || {
        venue.cancel_order(&order.id)
    })
    .await?;
    if !cancelled.is_cancelled {
        error!(ticker = %ticker, order = %cancelled, "Cancel request did not stick");
        return Err(DripError::CancelUnconfirmed(cancelled.id).into());
    }

    warn!(ticker = %ticker, order = %cancelled, "Order not filled and successfully cancelled");
    Ok(None)
}

enum PollOutcome {
    Fulfilled(Order),
    Cancelled,
    Pending,
}

/// One status poll against the venue.
async fn poll_order(
    venue: &dyn TradingVenue,
    retry: &RetryPolicy,
    skip_waits: bool,
    ticker: &str,
    order_id: &str,
) -> Result<PollOutcome> {
    let order = with_retries(retry, skip_waits, "fetch order status", || {
        venue.order_status(order_id)
    })
    .await?;

    match order.status() {
        OrderStatus::Cancelled => {
            warn!(ticker = %ticker, order = %order, "Order was cancelled while resting");
            Ok(PollOutcome::Cancelled)
        }
        OrderStatus::Fulfilled => {
            info!(ticker = %ticker, order = %order, "Order fulfilled");
            Ok(PollOutcome::Fulfilled(order))
        }
        OrderStatus::Pending => {
            debug!(ticker = %ticker, order = %order, "Order not fulfilled yet");
            Ok(PollOutcome::Pending)
        }
    }
}
