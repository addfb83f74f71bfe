//! USD/EUR conversion rate resolver
//!
//! The unit of conversion granularity is one UTC calendar day. Resolution
//! order: day-keyed cache, then the ECB statistical data API, then a
//! single-day timeseries query against the fallback provider. A resolved rate
//! is persisted before it is returned, so repeated lookups for the same day
//! never repeat network I/O. The bulk CSV import is the offline escape hatch
//! for when both live sources are down.

use crate::http::FetchClient;
use crate::storage::RateStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;

pub const SOURCE_RATES: &str = "rates";

/// Both rate sources failed for a day. Fatal to whichever sync step needed
/// the conversion - a monetary value cannot be fabricated.
#[derive(Debug)]
pub struct RateNotFound(pub NaiveDate);

impl std::fmt::Display for RateNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rate not found for {}", self.0)
    }
}

impl std::error::Error for RateNotFound {}

pub struct RateResolver {
    client: Arc<FetchClient>,
    store: Arc<dyn RateStore>,
    ecb_url: String,
    fallback_url: String,
}

impl RateResolver {
    pub fn new(
        client: Arc<FetchClient>,
        store: Arc<dyn RateStore>,
        ecb_url: String,
        fallback_url: String,
    ) -> Self {
        Self {
            client,
            store,
            ecb_url,
            fallback_url,
        }
    }

    /// USD/EUR rate for the instant's UTC calendar day (time-of-day discarded)
    pub async fn rate_for_day(&self, instant: DateTime<Utc>) -> Result<f64, Box<dyn std::error::Error>> {
        let day = instant.date_naive();
        if let Some(rate) = self.store.find_rate(day).await? {
            return Ok(rate);
        }

        let iso = day.format("%Y-%m-%d").to_string();

        // Primary: ECB SDW, series EXR/D.USD.EUR.SP00.A
        match self.fetch_ecb_rate(&iso).await {
            Ok(rate) => {
                self.store.upsert_rate(day, rate).await?;
                return Ok(rate);
            }
            Err(e) => {
                log::debug!("ECB rate lookup failed for {}: {}", iso, e);
            }
        }

        // Fallback: single-day timeseries query
        match self.fetch_fallback_rate(&iso).await {
            Ok(rate) => {
                self.store.upsert_rate(day, rate).await?;
                return Ok(rate);
            }
            Err(e) => {
                log::debug!("Fallback rate lookup failed for {}: {}", iso, e);
            }
        }

        Err(Box::new(RateNotFound(day)))
    }

    async fn fetch_ecb_rate(&self, iso: &str) -> Result<f64, Box<dyn std::error::Error>> {
        let url = format!("{}/EXR/D.USD.EUR.SP00.A?time={}", self.ecb_url, iso);
        let json = self.client.get_json(&url, 1.0, SOURCE_RATES).await?;
        extract_ecb_observation(&json).ok_or_else(|| format!("no ECB observation for {}", iso).into())
    }

    async fn fetch_fallback_rate(&self, iso: &str) -> Result<f64, Box<dyn std::error::Error>> {
        let url = format!(
            "{}/timeseries?base=USD&symbols=EUR&start_date={}&end_date={}",
            self.fallback_url, iso, iso
        );
        let json = self.client.get_json(&url, 1.0, SOURCE_RATES).await?;
        json.get("rates")
            .and_then(|rates| rates.get(iso))
            .and_then(|day| day.get("EUR"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| format!("no fallback rate for {}", iso).into())
    }

    /// Upsert every (day, rate) pair from a two-column CSV table straight into
    /// the cache, bypassing network resolution. Returns the number of rows
    /// imported.
    pub async fn import_rates(&self, csv: &str) -> Result<usize, Box<dyn std::error::Error>> {
        let rows = parse_rates_csv(csv);
        for (day, rate) in &rows {
            self.store.upsert_rate(*day, *rate).await?;
        }
        Ok(rows.len())
    }
}

/// Single observation from an ECB SDW JSON response:
/// dataSets[0].series["0:0:0:0:0"].observations -> first entry -> value[0]
fn extract_ecb_observation(json: &Value) -> Option<f64> {
    json.get("dataSets")?
        .get(0)?
        .get("series")?
        .get("0:0:0:0:0")?
        .get("observations")?
        .as_object()?
        .values()
        .next()?
        .get(0)?
        .as_f64()
}

/// Parse a two-column `date,rate` table.
///
/// A header line starting with `date,` (case-insensitive, optional spaces
/// before the comma) is skipped, as is every malformed row: unparseable date,
/// missing or non-finite rate.
pub fn parse_rates_csv(csv: &str) -> Vec<(NaiveDate, f64)> {
    let mut out = Vec::new();
    for raw_line in csv.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if is_header_line(line) {
            continue;
        }
        let mut parts = line.splitn(2, ',');
        let (Some(date_text), Some(rate_text)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(rate) = rate_text.trim().parse::<f64>() else {
            continue;
        };
        if !rate.is_finite() {
            continue;
        }
        if let Ok(date) = NaiveDate::parse_from_str(date_text.trim(), "%Y-%m-%d") {
            out.push((date, rate));
        }
    }
    out
}

fn is_header_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower
        .strip_prefix("date")
        .map(|rest| rest.trim_start().starts_with(','))
        .unwrap_or(false)
}
