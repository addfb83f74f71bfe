//! Core data structures for the normalized ledger

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Ledger record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deposit,
    Withdrawal,
    Fee,
    Gain,
    Loss,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Deposit => "deposit",
            Category::Withdrawal => "withdrawal",
            Category::Fee => "fee",
            Category::Gain => "gain",
            Category::Loss => "loss",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "deposit" => Some(Category::Deposit),
            "withdrawal" => Some(Category::Withdrawal),
            "fee" => Some(Category::Fee),
            "gain" => Some(Category::Gain),
            "loss" => Some(Category::Loss),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

/// Canonical ledger record priced in both source currency (USDC) and EUR.
///
/// (wallet_address, tx_hash) is the dedup key; tx_hash may be synthesized for
/// events that carry no natural hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub wallet_address: String,
    pub tx_hash: String,
    pub category: Category,
    pub symbol: String,
    pub amount_usdc: f64,
    pub amount_eur: f64,
    pub timestamp: DateTime<Utc>,
    /// Raw upstream event JSON, kept for audit
    pub meta: Option<String>,
}

/// Perpetual funding settlement, keyed by (wallet_address, funding_id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRecord {
    pub wallet_address: String,
    pub funding_id: String,
    pub symbol: String,
    pub amount_usdc: f64,
    pub amount_eur: f64,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time open position, one row per (wallet_address, symbol),
/// replaced wholesale on each sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionSnapshot {
    pub wallet_address: String,
    pub symbol: String,
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl_usdc: f64,
    pub unrealized_pnl_eur: f64,
}

/// Append-only sync cursor; the newest row per wallet starts the next
/// incremental fetch window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFetchLog {
    pub wallet_address: String,
    pub last_fetched_at: DateTime<Utc>,
}

/// Cached USD/EUR rate for one UTC calendar day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRate {
    pub date: NaiveDate,
    pub usd_eur: f64,
}

/// One bracket of a year's progressive tax schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub year: i32,
    /// Upper bound of the bracket; the top bracket's rate applies to all
    /// income above the highest listed limit
    pub income_limit: f64,
    pub rate_percent: f64,
}

/// Counts reported by a completed sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub transactions_written: u64,
    pub funding_written: u64,
}
