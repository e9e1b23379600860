//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, tokens, the database URL) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;

use crate::engine::EnginePolicy;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// When true, no venue calls are made and synthetic results are
    /// recorded instead.
    #[serde(default)]
    pub sandbox: bool,
    /// Fixed UTC offset, in hours, deciding which calendar day a purchase
    /// belongs to.
    #[serde(default)]
    pub utc_offset_hours: i32,
    pub purchase: PurchaseConfig,
    pub venue: VenueConfig,
    pub sheets: SheetsConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub engine: EnginePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PurchaseConfig {
    /// Asset tickers to purchase daily (e.g. "BTC", "ETH").
    pub tickers: Vec<String>,
    /// Fiat to spend per ticker per day. A missing or non-positive entry
    /// turns that ticker off.
    #[serde(default)]
    pub daily_fiat_amounts: HashMap<String, Decimal>,
    /// Limit price as a fraction of the best bid (e.g. 0.999 bids just
    /// under the top of the book).
    pub order_price_to_bid_ratio: Decimal,
    /// Maker fee folded into the recorded fiat deposit.
    #[serde(default = "default_maker_fee")]
    pub maker_fee: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    /// Overrides the venue base URL. When unset, the production or
    /// sandbox endpoint is chosen from the top-level `sandbox` flag.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// Title of the sheet (tab) holding the purchase log.
    pub sheet_name: String,
    /// First tracked day, formatted DD/MM/YYYY. Rows advance one per day
    /// from here.
    pub start_date: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    /// Overrides the Sheets API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Spreadsheet row holding each ticker's first day.
    pub start_rows: HashMap<String, i64>,
    /// Column span of each ticker's four cells (e.g. "E:H").
    pub column_ranges: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_url_env")]
    pub url_env: String,
}

fn default_maker_fee() -> Decimal {
    dec!(0.002)
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "GEMINI_API_SECRET".to_string()
}

fn default_access_token_env() -> String {
    "SHEETS_ACCESS_TOKEN".to_string()
}

fn default_db_url_env() -> String {
    "DATABASE_URL".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    fn validate(&self) -> Result<()> {
        if self.purchase.tickers.is_empty() {
            bail!("No tickers configured");
        }
        // A ticker listed twice would be purchased twice and recorded once.
        let mut seen = HashSet::new();
        for ticker in &self.purchase.tickers {
            if !seen.insert(ticker.as_str()) {
                bail!("Ticker {ticker} is listed more than once");
            }
        }
        if self.purchase.order_price_to_bid_ratio <= Decimal::ZERO {
            bail!("order_price_to_bid_ratio must be positive");
        }
        if self.purchase.maker_fee < Decimal::ZERO {
            bail!("maker_fee must not be negative");
        }

        // Per-ticker maps must not name anything outside the ticker list.
        for (map_name, keys) in [
            (
                "purchase.daily_fiat_amounts",
                self.purchase.daily_fiat_amounts.keys().collect::<Vec<_>>(),
            ),
            ("sheets.start_rows", self.sheets.start_rows.keys().collect()),
            (
                "sheets.column_ranges",
                self.sheets.column_ranges.keys().collect(),
            ),
        ] {
            for ticker in keys {
                if !self.purchase.tickers.contains(ticker) {
                    bail!("{map_name} names unknown ticker {ticker}");
                }
            }
        }

        // An enabled ticker without a sheet mapping would fail recording
        // after the money is already spent.
        for ticker in &self.purchase.tickers {
            let daily = self
                .purchase
                .daily_fiat_amounts
                .get(ticker)
                .copied()
                .unwrap_or(Decimal::ZERO);
            if daily <= Decimal::ZERO {
                continue;
            }
            if !self.sheets.start_rows.contains_key(ticker) {
                bail!("sheets.start_rows has no entry for ticker {ticker}");
            }
            if !self.sheets.column_ranges.contains_key(ticker) {
                bail!("sheets.column_ranges has no entry for ticker {ticker}");
            }
        }
        Ok(())
    }
}

impl SheetsConfig {
    /// Parse `start_date` (DD/MM/YYYY) into a calendar date.
    pub fn parsed_start_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.start_date, "%d/%m/%Y")
            .with_context(|| format!("Failed to parse sheets.start_date: {}", self.start_date))
    }
}

/// A run-scoped timestamp in the configured UTC offset.
///
/// Captured once at startup so every downstream consumer (row math, date
/// strings, database rows) agrees on which day this run belongs to, even
/// if the run straddles midnight.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    now: DateTime<FixedOffset>,
}

impl Clock {
    pub fn new(utc_offset_hours: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .with_context(|| format!("Invalid UTC offset: {utc_offset_hours}h"))?;
        Ok(Self {
            now: Utc::now().with_timezone(&offset),
        })
    }

    /// Build a clock pinned to a known instant.
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    /// Calendar date of this run in the configured offset.
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Today formatted DD/MM/YYYY, the format the purchase log uses.
    pub fn date_string(&self) -> String {
        self.now.format("%d/%m/%Y").to_string()
    }
}
