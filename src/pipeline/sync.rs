//! Wallet sync - incremental, idempotent ledger ingestion
//!
//! Orchestrates windowed retrieval of fills, funding payments, and ledger
//! transfers for one wallet, prices every event in EUR for its calendar day,
//! and upserts canonical records. Currency resolution failures abort the
//! sync; explorer enrichment and the open-position snapshot are best-effort
//! and never do.
//!
//! Callers must serialize syncs per wallet. Distinct wallets may sync
//! concurrently: all shared state (token buckets, rate cache) is keyed by
//! source or day, not by wallet.

use super::normalize::{classify_transfer, event_timestamp, num_field, str_field};
use super::types::{
    Category, FundingRecord, OpenPositionSnapshot, SyncReport, Transaction, WalletFetchLog,
};
use crate::exchange::ExchangeClient;
use crate::explorer::ExplorerClient;
use crate::rates::RateResolver;
use crate::storage::LedgerStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Incremental fetch window size: 30 days in milliseconds
const WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Minimum plausible wallet address length, checked before any I/O
const MIN_WALLET_LEN: usize = 10;

pub struct WalletSync {
    exchange: Arc<ExchangeClient>,
    explorer: Arc<ExplorerClient>,
    rates: Arc<RateResolver>,
    store: Arc<dyn LedgerStore>,
}

impl WalletSync {
    pub fn new(
        exchange: Arc<ExchangeClient>,
        explorer: Arc<ExplorerClient>,
        rates: Arc<RateResolver>,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            exchange,
            explorer,
            rates,
            store,
        }
    }

    /// Run one full sync for a wallet.
    ///
    /// Returns counts of upserted records. Re-running against an unchanged
    /// upstream is a no-op on the stored rows thanks to the idempotent
    /// dedup keys.
    pub async fn sync(
        &self,
        wallet_address: &str,
        persist_cursor: bool,
    ) -> Result<SyncReport, Box<dyn std::error::Error>> {
        if wallet_address.len() < MIN_WALLET_LEN {
            return Err(format!(
                "walletAddress is required and must be at least {} characters",
                MIN_WALLET_LEN
            )
            .into());
        }

        let started_at = Utc::now();
        let since = self
            .store
            .latest_fetch_log(wallet_address)
            .await?
            .map(|log| log.last_fetched_at.timestamp_millis());
        let windows = fetch_windows(since, started_at.timestamp_millis());

        log::info!(
            "🚀 Syncing wallet {} ({} fetch window{})",
            wallet_address,
            windows.len(),
            if windows.len() == 1 { "" } else { "s" }
        );

        let mut fills = Vec::new();
        let mut funding_events = Vec::new();
        let mut ledger_events = Vec::new();
        for start in &windows {
            fills.extend(self.exchange.user_fills(wallet_address, *start).await?);
            funding_events.extend(self.exchange.user_funding(wallet_address, *start).await?);
            ledger_events.extend(
                self.exchange
                    .user_non_funding_ledger(wallet_address, *start)
                    .await?,
            );
        }

        log::info!(
            "📊 Retrieved {} fills, {} funding events, {} ledger events",
            fills.len(),
            funding_events.len(),
            ledger_events.len()
        );

        let mut report = SyncReport::default();

        for fill in &fills {
            report.transactions_written += self.ingest_fill(wallet_address, fill).await?;
        }
        for event in &funding_events {
            report.funding_written += self.ingest_funding(wallet_address, event).await?;
        }
        for event in &ledger_events {
            report.transactions_written += self.ingest_transfer(wallet_address, event).await?;
        }

        // Best-effort enrichment; never aborts the sync
        if let Err(e) = self.explorer.user_details(wallet_address).await {
            log::warn!("⚠️  Explorer enrichment skipped: {}", e);
        }

        // Best-effort snapshot; ledger writes above already count as success
        if let Err(e) = self.sync_open_positions(wallet_address).await {
            log::warn!("⚠️  Open position snapshot failed: {}", e);
        }

        if persist_cursor {
            self.store
                .append_fetch_log(WalletFetchLog {
                    wallet_address: wallet_address.to_string(),
                    last_fetched_at: started_at,
                })
                .await?;
        }

        log::info!(
            "✅ Sync complete: {} transactions, {} funding records",
            report.transactions_written,
            report.funding_written
        );

        Ok(report)
    }

    /// One fill yields zero, one, or two ledger rows: a `fee` row when the
    /// fee is nonzero and a `gain`/`loss` row when realized PnL is nonzero.
    async fn ingest_fill(
        &self,
        wallet_address: &str,
        fill: &Value,
    ) -> Result<u64, Box<dyn std::error::Error>> {
        let ts = event_timestamp(fill);
        let rate = self.rates.rate_for_day(ts).await?;

        let fee_usdc = num_field(fill, &["fee", "feeUSDC"]);
        let realized_usdc = num_field(fill, &["realizedPnl", "realized", "closedPnl"]);
        let symbol = str_field(fill, &["symbol", "coin", "pair"]).unwrap_or_else(|| "UNKNOWN".to_string());
        let fill_id = str_field(fill, &["id", "tradeId"]).unwrap_or_else(|| "fill".to_string());
        let sequence = str_field(fill, &["sequence"]).unwrap_or_default();

        let mut written = 0;

        if fee_usdc != 0.0 {
            self.store
                .upsert_transaction(Transaction {
                    wallet_address: wallet_address.to_string(),
                    tx_hash: format!("{}-fee-{}", fill_id, sequence),
                    category: Category::Fee,
                    symbol: symbol.clone(),
                    amount_usdc: fee_usdc,
                    amount_eur: fee_usdc * rate,
                    timestamp: ts,
                    meta: Some(fill.to_string()),
                })
                .await?;
            written += 1;
        }

        if realized_usdc != 0.0 {
            let category = if realized_usdc >= 0.0 {
                Category::Gain
            } else {
                Category::Loss
            };
            self.store
                .upsert_transaction(Transaction {
                    wallet_address: wallet_address.to_string(),
                    tx_hash: format!("{}-pnl-{}", fill_id, sequence),
                    category,
                    symbol,
                    amount_usdc: realized_usdc,
                    amount_eur: realized_usdc * rate,
                    timestamp: ts,
                    meta: Some(fill.to_string()),
                })
                .await?;
            written += 1;
        }

        Ok(written)
    }

    async fn ingest_funding(
        &self,
        wallet_address: &str,
        event: &Value,
    ) -> Result<u64, Box<dyn std::error::Error>> {
        let ts = event_timestamp(event);
        let rate = self.rates.rate_for_day(ts).await?;

        let amount_usdc = num_field(event, &["amount", "payment"]);
        let symbol = str_field(event, &["symbol", "coin"]).unwrap_or_else(|| "UNKNOWN".to_string());
        let funding_id = str_field(event, &["id", "seq"])
            .unwrap_or_else(|| format!("{}-{}", ts.timestamp_millis(), symbol));

        self.store
            .upsert_funding(FundingRecord {
                wallet_address: wallet_address.to_string(),
                funding_id,
                symbol,
                amount_usdc,
                amount_eur: amount_usdc * rate,
                timestamp: ts,
            })
            .await?;

        Ok(1)
    }

    /// Deposits, withdrawals, and other balance movements, classified from
    /// the event's free-text type field.
    async fn ingest_transfer(
        &self,
        wallet_address: &str,
        event: &Value,
    ) -> Result<u64, Box<dyn std::error::Error>> {
        let ts = event_timestamp(event);
        let rate = self.rates.rate_for_day(ts).await?;

        let amount_usdc = num_field(event, &["amount", "delta"]);
        let type_text = str_field(event, &["type", "category"]).unwrap_or_default();
        let category = classify_transfer(&type_text);
        let tx_hash = str_field(event, &["txHash", "hash"])
            .unwrap_or_else(|| format!("{}-{}", ts.timestamp_millis(), type_text.to_lowercase()));

        self.store
            .upsert_transaction(Transaction {
                wallet_address: wallet_address.to_string(),
                tx_hash,
                category,
                symbol: "USDC".to_string(),
                amount_usdc,
                amount_eur: amount_usdc * rate,
                timestamp: ts,
                meta: Some(event.to_string()),
            })
            .await?;

        Ok(1)
    }

    /// Replace the wallet's open-position snapshot from current
    /// clearinghouse state. Upserts target disjoint symbol keys and run
    /// concurrently, joined before returning.
    async fn sync_open_positions(&self, wallet_address: &str) -> Result<(), Box<dyn std::error::Error>> {
        let state = self.exchange.clearinghouse_state(wallet_address).await?;
        let positions = state
            .get("positions")
            .or_else(|| state.get("openPositions"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        if positions.is_empty() {
            return Ok(());
        }

        let rate = self.rates.rate_for_day(Utc::now()).await?;

        let mut join_set = JoinSet::new();
        for position in positions {
            let symbol = str_field(&position, &["symbol", "coin"])
                .unwrap_or_else(|| "UNKNOWN".to_string());
            let size = num_field(&position, &["size", "positionSize"]);
            let entry_price = num_field(&position, &["entryPrice", "entry"]);
            let mark_price = num_field(&position, &["markPrice", "mark"]);
            let unrealized_pnl_usdc =
                if position.get("unrealizedPnl").is_some() || position.get("upnl").is_some() {
                    num_field(&position, &["unrealizedPnl", "upnl"])
                } else {
                    size * (mark_price - entry_price)
                };

            let snapshot = OpenPositionSnapshot {
                wallet_address: wallet_address.to_string(),
                symbol,
                size,
                entry_price,
                mark_price,
                unrealized_pnl_usdc,
                unrealized_pnl_eur: unrealized_pnl_usdc * rate,
            };

            let store = self.store.clone();
            join_set.spawn(async move {
                if let Err(e) = store.replace_open_position(snapshot).await {
                    log::warn!("⚠️  Open position upsert failed: {}", e);
                }
            });
        }

        while join_set.join_next().await.is_some() {}

        Ok(())
    }
}

/// Split the incremental range into fixed-size fetch window starts.
///
/// No cursor means one unbounded request (`None`); a cursor at or past `now`
/// yields no windows at all.
fn fetch_windows(since: Option<i64>, now_ms: i64) -> Vec<Option<i64>> {
    match since {
        None => vec![None],
        Some(start_ms) => {
            let mut windows = Vec::new();
            let mut cursor = start_ms;
            while cursor < now_ms {
                windows.push(Some(cursor));
                cursor += WINDOW_MS;
            }
            windows
        }
    }
}
