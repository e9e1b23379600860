//! Google Sheets purchase log.
//!
//! Each ticker owns a block of four columns (date, fiat deposit, price,
//! amount) in one sheet, one row per day counted from a configured start
//! date. Writes go through the Sheets v4 `batchUpdate` endpoint with a
//! bearer token.
//!
//! API docs: https://developers.google.com/sheets/api/reference/rest

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{AppConfig, Clock, SheetsConfig};
use crate::types::PurchaseResult;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

// ---------------------------------------------------------------------------
// Wire types (Rust → Sheets v4 JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateRequest {
    requests: Vec<UpdateRequest>,
}

impl BatchUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    update_cells: UpdateCells,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCells {
    range: GridRange,
    rows: Vec<RowData>,
    fields: &'static str,
}

/// Half-open row/column span, zero-indexed, as the API expects.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridRange {
    sheet_id: i64,
    start_row_index: i64,
    end_row_index: i64,
    start_column_index: i64,
    end_column_index: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowData {
    values: Vec<CellData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CellData {
    user_entered_value: ExtendedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtendedValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    number_value: Option<Decimal>,
}

impl ExtendedValue {
    fn string(value: String) -> Self {
        Self {
            string_value: Some(value),
            number_value: None,
        }
    }

    fn number(value: Decimal) -> Self {
        Self {
            string_value: None,
            number_value: Some(value),
        }
    }
}

/// Subset of the spreadsheet metadata response.
#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

// ---------------------------------------------------------------------------
// Row & range math
// ---------------------------------------------------------------------------

/// Parse a column span like "E:H" into inclusive zero-based indices.
fn column_span(range: &str) -> Result<(i64, i64)> {
    let (start, end) = range
        .split_once(':')
        .with_context(|| format!("Column range must look like E:H, got {range:?}"))?;
    Ok((column_index(start)?, column_index(end)?))
}

/// Zero-based index of a column name: A → 0, E → 4, Z → 25, AA → 26.
fn column_index(column: &str) -> Result<i64> {
    if column.is_empty() {
        bail!("Column must be letters A-Z, got {column:?}");
    }
    let mut index: i64 = 0;
    for c in column.chars() {
        if !c.is_ascii_uppercase() {
            bail!("Column must be letters A-Z, got {column:?}");
        }
        index = index * 26 + i64::from(c as u8 - b'A') + 1;
    }
    Ok(index - 1)
}

/// Whole 24-hour periods between the start date at UTC midnight and the
/// current instant. Each full period advances the target row by one, so
/// rows line up with what earlier runs wrote regardless of the run's
/// local offset.
fn days_since_start(clock: &Clock, start_date: NaiveDate) -> Result<i64> {
    let start = start_date.and_time(NaiveTime::MIN).and_utc();
    let now = clock.now().with_timezone(&Utc);
    if now < start {
        bail!("Start date {start_date} is in the future (now is {now})");
    }
    Ok((now - start).num_days())
}

/// The four-cell range a ticker's purchase lands in today.
fn grid_range(sheet_id: i64, start_row: i64, days: i64, column_range: &str) -> Result<GridRange> {
    let (start_column, end_column) = column_span(column_range)?;
    let row = start_row + days;
    Ok(GridRange {
        sheet_id,
        start_row_index: row - 1,
        end_row_index: row,
        start_column_index: start_column,
        end_column_index: end_column + 1,
    })
}

/// Build the batch update writing every fulfilled purchase into its
/// ticker's row for today.
pub fn build_batch_update(
    cfg: &SheetsConfig,
    clock: &Clock,
    sheet_id: i64,
    results: &BTreeMap<String, PurchaseResult>,
) -> Result<BatchUpdateRequest> {
    let start_date = cfg.parsed_start_date()?;
    let days = days_since_start(clock, start_date)?;
    let date_string = clock.date_string();

    let mut requests = Vec::with_capacity(results.len());
    for (ticker, result) in results {
        let start_row = *cfg
            .start_rows
            .get(ticker)
            .with_context(|| format!("No start row configured for ticker {ticker}"))?;
        let column_range = cfg
            .column_ranges
            .get(ticker)
            .with_context(|| format!("No column range configured for ticker {ticker}"))?;

        let range = grid_range(sheet_id, start_row, days, column_range)?;
        debug!(ticker = %ticker, ?range, "Prepared purchase log cells");

        requests.push(UpdateRequest {
            update_cells: UpdateCells {
                range,
                rows: vec![RowData {
                    values: vec![
                        ExtendedValue::string(date_string.clone()),
                        ExtendedValue::number(result.actual_fiat_deposit),
                        ExtendedValue::number(result.avg_execution_price),
                        ExtendedValue::number(result.executed_amount),
                    ]
                    .into_iter()
                    .map(|user_entered_value| CellData { user_entered_value })
                    .collect(),
                }],
                fields: "userEnteredValue",
            },
        });
    }

    Ok(BatchUpdateRequest { requests })
}

fn find_sheet_id(meta: &SpreadsheetMeta, title: &str) -> Option<i64> {
    meta.sheets
        .iter()
        .find(|s| s.properties.title == title)
        .map(|s| s.properties.sheet_id)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Google Sheets client scoped to one spreadsheet.
pub struct SheetsClient {
    http: Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: SecretString,
}

impl SheetsClient {
    /// Create a new Sheets client, resolving the bearer token from the
    /// environment.
    pub fn new(cfg: &SheetsConfig) -> Result<Self> {
        let access_token = SecretString::new(AppConfig::resolve_env(&cfg.access_token_env)?);

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("DRIP/0.1.0 (dca-purchaser)")
            .build()
            .context("Failed to build HTTP client for Sheets")?;

        Ok(Self {
            http,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| SHEETS_BASE_URL.to_string()),
            spreadsheet_id: cfg.spreadsheet_id.clone(),
            sheet_name: cfg.sheet_name.clone(),
            access_token,
        })
    }

    /// Numeric id of the configured sheet (tab) inside the spreadsheet.
    pub async fn sheet_id(&self) -> Result<i64> {
        let url = format!(
            "{}/{}?fields=sheets.properties",
            self.base_url, self.spreadsheet_id
        );
        debug!(url = %url, "Fetching spreadsheet metadata");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .context("Sheets metadata request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Sheets API error {status}: {body}");
        }

        let meta: SpreadsheetMeta = resp
            .json()
            .await
            .context("Failed to parse spreadsheet metadata")?;

        find_sheet_id(&meta, &self.sheet_name).with_context(|| {
            format!(
                "Sheet {:?} not found in spreadsheet {}",
                self.sheet_name, self.spreadsheet_id
            )
        })
    }

    /// Apply a prepared batch update to the spreadsheet.
    pub async fn batch_update(&self, request: &BatchUpdateRequest) -> Result<()> {
        let url = format!("{}/{}:batchUpdate", self.base_url, self.spreadsheet_id);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(request)
            .send()
            .await
            .context("Sheets batch update request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Sheets API error {status}: {body}");
        }

        info!(
            rows = request.requests.len(),
            sheet = %self.sheet_name,
            "Recorded purchases to spreadsheet"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
