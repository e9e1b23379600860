//! Persistence for completed purchases.
//!
//! Appends one row per fulfilled purchase into Postgres. The table is
//! append-only; nothing in the daily run updates or deletes.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeMap;
use tracing::info;

use crate::config::Clock;
use crate::types::PurchaseResult;
use crate::venue::gemini::GeminiClient;

/// One row in the `purchases` table.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRow {
    /// Trading symbol, lowercase (e.g. "btcsgd").
    pub ticker: String,
    pub created_for_day: NaiveDate,
    pub fiat_deposit: Decimal,
    pub price_per_coin: Decimal,
    pub coin_amount: Decimal,
}

/// Build the day's rows from the aggregated purchase results.
pub fn build_rows(results: &BTreeMap<String, PurchaseResult>, clock: &Clock) -> Vec<PurchaseRow> {
    results
        .iter()
        .map(|(ticker, result)| PurchaseRow {
            ticker: GeminiClient::trading_symbol(ticker),
            created_for_day: clock.today(),
            fiat_deposit: result.actual_fiat_deposit,
            price_per_coin: result.avg_execution_price,
            coin_amount: result.executed_amount,
        })
        .collect()
}

fn insert_query(rows: &[PurchaseRow]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO purchases (ticker, created_for_day, fiat_deposit, price_per_coin, coin_amount) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.ticker)
            .push_bind(row.created_for_day)
            .push_bind(row.fiat_deposit)
            .push_bind(row.price_per_coin)
            .push_bind(row.coin_amount);
    });
    builder
}

/// Postgres-backed store for purchase rows.
pub struct PurchaseStore {
    pool: PgPool,
}

impl PurchaseStore {
    /// Connect to the database named by the URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    /// Insert all rows in one statement, verifying the database accepted
    /// every one of them.
    pub async fn insert_purchases(&self, rows: &[PurchaseRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut builder = insert_query(rows);
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to insert purchase rows")?;

        if result.rows_affected() != rows.len() as u64 {
            anyhow::bail!(
                "Expected {} purchase rows inserted, database reports {}",
                rows.len(),
                result.rows_affected()
            );
        }

        info!(rows = rows.len(), "Inserted purchase rows");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    fn clock_at(rfc3339: &str) -> Clock {
        Clock::at(DateTime::parse_from_rfc3339(rfc3339).unwrap())
    }

    fn sample_results() -> BTreeMap<String, PurchaseResult> {
        BTreeMap::from([
            (
                "BTC".to_string(),
                PurchaseResult {
                    actual_fiat_deposit: dec!(2005.002),
                    avg_execution_price: dec!(1000.50),
                    executed_amount: dec!(2),
                },
            ),
            (
                "ETH".to_string(),
                PurchaseResult {
                    actual_fiat_deposit: dec!(1.002),
                    avg_execution_price: dec!(1000),
                    executed_amount: dec!(1),
                },
            ),
        ])
    }

    #[test]
    fn test_build_rows_maps_tickers_to_trading_symbols() {
        let clock = clock_at("2024-11-03T14:30:00+08:00");
        let rows = build_rows(&sample_results(), &clock);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, "btcsgd");
        assert_eq!(rows[1].ticker, "ethsgd");
    }

    #[test]
    fn test_build_rows_carries_result_fields() {
        let clock = clock_at("2024-11-03T14:30:00+08:00");
        let rows = build_rows(&sample_results(), &clock);

        let btc = &rows[0];
        assert_eq!(btc.created_for_day, clock.today());
        assert_eq!(btc.fiat_deposit, dec!(2005.002));
        assert_eq!(btc.price_per_coin, dec!(1000.50));
        assert_eq!(btc.coin_amount, dec!(2));
    }

    #[test]
    fn test_build_rows_empty_results() {
        let clock = clock_at("2024-11-03T14:30:00+08:00");
        let rows = build_rows(&BTreeMap::new(), &clock);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_insert_query_binds_every_row() {
        let clock = clock_at("2024-11-03T14:30:00+08:00");
        let rows = build_rows(&sample_results(), &clock);

        let mut builder = insert_query(&rows);
        let sql = builder.sql().to_string();
        assert!(sql.starts_with("INSERT INTO purchases"));
        assert!(sql.contains("ticker, created_for_day, fiat_deposit, price_per_coin, coin_amount"));
        // Five placeholders per row.
        assert_eq!(sql.matches('$').count(), 10);
    }
}
