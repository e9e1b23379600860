//! Gemini exchange integration.
//!
//! Provides quotes and the full order lifecycle over Gemini's REST API.
//!
//! API docs: https://docs.gemini.com/rest-api/
//! Base URL: https://api.gemini.com (sandbox: https://api.sandbox.gemini.com)
//! Rate limit: 120 requests/minute on private endpoints
//! Auth: base64-encoded JSON payload signed with HMAC-SHA384, sent in
//! `X-GEMINI-*` headers. The request body itself is empty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha384;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::TradingVenue;
use crate::config::{AppConfig, PurchaseConfig, VenueConfig};
use crate::types::{MarketPrecision, Order};

type HmacSha384 = Hmac<Sha384>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PRODUCTION_BASE_URL: &str = "https://api.gemini.com";
const SANDBOX_BASE_URL: &str = "https://api.sandbox.gemini.com";
const VENUE_NAME: &str = "gemini";

const HEADER_API_KEY: &str = "X-GEMINI-APIKEY";
const HEADER_PAYLOAD: &str = "X-GEMINI-PAYLOAD";
const HEADER_SIGNATURE: &str = "X-GEMINI-SIGNATURE";

// ---------------------------------------------------------------------------
// API response types (Gemini JSON → Rust)
// ---------------------------------------------------------------------------

/// Subset of `/v1/symbols/details/{symbol}`. Increments arrive as JSON
/// numbers.
#[derive(Debug, Deserialize)]
struct SymbolDetails {
    /// Smallest amount step (e.g. 1e-8 for BTC pairs).
    tick_size: Decimal,
    /// Smallest price step in the quote currency (e.g. 0.01).
    quote_increment: Decimal,
}

/// Subset of `/v2/ticker/{symbol}`. Prices arrive as JSON strings.
#[derive(Debug, Deserialize)]
struct TickerV2 {
    #[serde(with = "rust_decimal::serde::str")]
    bid: Decimal,
}

/// An order as returned by `/v1/order/new`, `/v1/order/status`,
/// `/v1/order/cancel` and the `/v1/orders` list. Numeric fields are
/// string-encoded on the wire.
#[derive(Debug, Deserialize)]
struct GeminiOrder {
    order_id: String,
    symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    avg_execution_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    executed_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    original_amount: Decimal,
    is_live: bool,
    is_cancelled: bool,
}

impl From<GeminiOrder> for Order {
    fn from(o: GeminiOrder) -> Self {
        Order {
            id: o.order_id,
            symbol: o.symbol,
            price: o.price,
            avg_execution_price: o.avg_execution_price,
            executed_amount: o.executed_amount,
            original_amount: o.original_amount,
            is_live: o.is_live,
            is_cancelled: o.is_cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct NewOrderPayload {
    request: &'static str,
    nonce: u64,
    client_order_id: String,
    symbol: String,
    amount: String,
    price: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
}

#[derive(Debug, Serialize)]
struct OrderIdPayload {
    request: &'static str,
    nonce: u64,
    order_id: String,
}

#[derive(Debug, Serialize)]
struct ListOrdersPayload {
    request: &'static str,
    nonce: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gemini exchange client.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    /// Limit price as a fraction of the best bid.
    price_ratio: Decimal,
    /// Daily fiat spend per ticker, used to size orders.
    daily_fiat: HashMap<String, Decimal>,
    /// Monotonic nonce for private requests.
    nonce: AtomicU64,
}

impl GeminiClient {
    /// Create a new Gemini client, resolving credentials from the
    /// environment. The sandbox endpoint is used when `sandbox` is set,
    /// unless the config overrides the base URL outright.
    pub fn new(venue: &VenueConfig, purchase: &PurchaseConfig, sandbox: bool) -> Result<Self> {
        let api_key = AppConfig::resolve_env(&venue.api_key_env)?;
        let api_secret = SecretString::new(AppConfig::resolve_env(&venue.api_secret_env)?);

        let base_url = venue.base_url.clone().unwrap_or_else(|| {
            if sandbox {
                SANDBOX_BASE_URL.to_string()
            } else {
                PRODUCTION_BASE_URL.to_string()
            }
        });

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("DRIP/0.1.0 (dca-purchaser)")
            .build()
            .context("Failed to build HTTP client for Gemini")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
            price_ratio: purchase.order_price_to_bid_ratio,
            daily_fiat: purchase.daily_fiat_amounts.clone(),
            nonce: AtomicU64::new(Utc::now().timestamp_millis() as u64),
        })
    }

    /// Trading symbol for a ticker: BTC and ETH trade against SGD, the
    /// rest against USD. Gemini symbols are lowercase.
    pub fn trading_symbol(ticker: &str) -> String {
        let quote = match ticker.to_uppercase().as_str() {
            "BTC" | "ETH" => "sgd",
            _ => "usd",
        };
        format!("{}{}", ticker.to_lowercase(), quote)
    }

    // -- Internal helpers ------------------------------------------------

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::Relaxed)
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching Gemini public endpoint");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Gemini request failed: GET {path}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            match status_hint(status) {
                Some(hint) => anyhow::bail!("Gemini API error {status}: {body} ({hint})"),
                None => anyhow::bail!("Gemini API error {status}: {body}"),
            }
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Gemini response from {path}"))
    }

    async fn post_private<T: DeserializeOwned, P: Serialize>(
        &self,
        path: &str,
        params: &P,
    ) -> Result<T> {
        let json = serde_json::to_vec(params).context("Failed to encode Gemini payload")?;
        let payload = BASE64.encode(&json);
        let signature = sign_payload(self.api_secret.expose_secret(), &payload)?;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling Gemini private endpoint");

        let resp = self
            .http
            .post(&url)
            .header(CONTENT_LENGTH, "0")
            .header(CONTENT_TYPE, "text/plain")
            .header(CACHE_CONTROL, "no-cache")
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_PAYLOAD, &payload)
            .header(HEADER_SIGNATURE, &signature)
            .send()
            .await
            .with_context(|| format!("Gemini request failed: POST {path}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            match status_hint(status) {
                Some(hint) => anyhow::bail!("Gemini API error {status}: {body} ({hint})"),
                None => anyhow::bail!("Gemini API error {status}: {body}"),
            }
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Gemini response from {path}"))
    }
}

/// Sign a base64 payload with HMAC-SHA384, hex-encoded.
fn sign_payload(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha384::new_from_slice(secret.as_bytes())
        .context("Failed to initialize payload signer")?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Limit price and amount for a daily purchase: the price is the best bid
/// scaled by the configured ratio, the amount is the daily fiat spend at
/// that price. Both are rounded to what the market accepts.
fn limit_order_values(
    daily_fiat: Decimal,
    best_bid: Decimal,
    ratio: Decimal,
    precision: MarketPrecision,
) -> Result<(Decimal, Decimal)> {
    let price = (best_bid * ratio).round_dp(precision.price_decimals);
    let amount = daily_fiat
        .checked_div(price)
        .context("Limit price must be positive")?
        .round_dp(precision.amount_decimals);
    Ok((price, amount))
}

/// Decimal places of an increment (1e-8 → 8, 0.01 → 2, 1 → 0).
fn decimal_places(increment: Decimal) -> u32 {
    increment.normalize().scale()
}

/// Human hint for Gemini's documented HTTP status codes.
fn status_hint(status: StatusCode) -> Option<&'static str> {
    if status.is_redirection() {
        return Some("API entry point has moved, see Location header");
    }
    match status.as_u16() {
        400 => Some("auction not open, malformed request, or bad auth headers"),
        403 => Some("API key is missing the role for this endpoint"),
        404 => Some("unknown API entry point or order not found"),
        406 => Some("insufficient funds"),
        429 => Some("Rate Limiting was applied"),
        500 => Some("the server encountered an error"),
        502 => Some("technical issues are preventing the request"),
        503 => Some("the exchange is down for maintenance"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TradingVenue trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TradingVenue for GeminiClient {
    /// Quoting precision from the symbol details: the quote increment
    /// bounds the price, the tick size bounds the amount.
    async fn market_precision(&self, ticker: &str) -> Result<MarketPrecision> {
        let symbol = Self::trading_symbol(ticker);
        let details: SymbolDetails = self
            .get_public(&format!("/v1/symbols/details/{symbol}"))
            .await?;

        let precision = MarketPrecision {
            price_decimals: decimal_places(details.quote_increment),
            amount_decimals: decimal_places(details.tick_size),
        };
        debug!(symbol = %symbol, %precision, "Fetched symbol details");
        Ok(precision)
    }

    /// Best bid from the v2 ticker.
    async fn best_bid(&self, ticker: &str) -> Result<Decimal> {
        let symbol = Self::trading_symbol(ticker);
        let ticker_data: TickerV2 = self.get_public(&format!("/v2/ticker/{symbol}")).await?;
        debug!(symbol = %symbol, bid = %ticker_data.bid, "Fetched best bid");
        Ok(ticker_data.bid)
    }

    /// Place a limit buy for the ticker's configured daily fiat amount.
    ///
    /// The client order id embeds the nonce so a lost response can be
    /// matched to the resting order afterwards.
    async fn create_order(
        &self,
        ticker: &str,
        best_bid: Decimal,
        precision: MarketPrecision,
    ) -> Result<Order> {
        let daily_fiat = *self
            .daily_fiat
            .get(ticker)
            .with_context(|| format!("No daily fiat amount configured for {ticker}"))?;

        let symbol = Self::trading_symbol(ticker);
        let (price, amount) = limit_order_values(daily_fiat, best_bid, self.price_ratio, precision)?;

        let nonce = self.next_nonce();
        let payload = NewOrderPayload {
            request: "/v1/order/new",
            nonce,
            client_order_id: format!("{nonce}_{symbol}"),
            symbol: symbol.clone(),
            amount: amount.to_string(),
            price: price.to_string(),
            side: "buy",
            order_type: "exchange limit",
        };

        info!(
            symbol = %symbol,
            price = %price,
            amount = %amount,
            best_bid = %best_bid,
            "Placing limit buy order"
        );

        let order: GeminiOrder = self.post_private("/v1/order/new", &payload).await?;
        Ok(order.into())
    }

    /// Most recent active order whose symbol matches the ticker's.
    async fn find_active_order(&self, ticker: &str) -> Result<Order> {
        let symbol = Self::trading_symbol(ticker);
        let payload = ListOrdersPayload {
            request: "/v1/orders",
            nonce: self.next_nonce(),
        };

        let orders: Vec<GeminiOrder> = self.post_private("/v1/orders", &payload).await?;
        let order = orders
            .into_iter()
            .find(|o| o.symbol.eq_ignore_ascii_case(&symbol))
            .with_context(|| format!("No active order found for {symbol}"))?;

        info!(symbol = %symbol, order_id = %order.order_id, "Recovered active order");
        Ok(order.into())
    }

    async fn order_status(&self, order_id: &str) -> Result<Order> {
        let payload = OrderIdPayload {
            request: "/v1/order/status",
            nonce: self.next_nonce(),
            order_id: order_id.to_string(),
        };

        let order: GeminiOrder = self.post_private("/v1/order/status", &payload).await?;
        Ok(order.into())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        let payload = OrderIdPayload {
            request: "/v1/order/cancel",
            nonce: self.next_nonce(),
            order_id: order_id.to_string(),
        };

        info!(order_id = %order_id, "Cancelling order");
        let order: GeminiOrder = self.post_private("/v1/order/cancel", &payload).await?;
        Ok(order.into())
    }

    fn name(&self) -> &'static str {
        VENUE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
