//! Analytics over the normalized ledger
//!
//! Pure with respect to I/O: callers load the wallet's transactions, funding
//! records, and open-position snapshot and hand them in. Day bucketing
//! follows the exchange's configured report timezone, not UTC - events near
//! midnight can land on a different wall-clock date than their UTC date.
//!
//! Sign convention: withdrawal amounts are stored negative in EUR, so net
//! invested capital is the plain sum of deposits and withdrawals.

use crate::pipeline::types::{Category, FundingRecord, OpenPositionSnapshot, Transaction};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub realized_eur: f64,
    pub fees_eur: f64,
    pub funding_eur: f64,
    pub deposits_eur: f64,
    pub withdrawals_eur: f64,
}

/// Per-day category sums, keyed by the report timezone's wall-clock date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyEntry {
    pub date: String,
    pub realized: f64,
    pub fees: f64,
    pub funding: f64,
    pub deposits: f64,
    pub withdrawals: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlPoint {
    pub date: String,
    pub realized: f64,
    pub funding: f64,
    pub fees: f64,
    /// Running realized + funding - fees across all prior days
    pub cumulative: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: String,
    pub invested: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub date: String,
    /// (equity - running peak) / peak; always <= 0
    pub drawdown: f64,
}

/// Point-in-time equity estimate including unrealized PnL
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityNow {
    pub invested: f64,
    pub upnl_eur: f64,
    pub equity_now: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub trades: usize,
    /// Percentage of realized records with positive amount
    pub winrate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

/// Full analytics output, rendered verbatim by the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub totals: Totals,
    pub daily: Vec<DailyEntry>,
    pub pnl_series: Vec<PnlPoint>,
    pub equity_series: Vec<EquityPoint>,
    pub drawdown_series: Vec<DrawdownPoint>,
    pub equity: EquityNow,
    pub stats: TradeStats,
}

fn day_key(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Aggregate a wallet's ledger into totals, daily rollups, cumulative PnL,
/// equity curve, drawdown series, and trade statistics.
pub fn summarize(
    transactions: &[Transaction],
    funding: &[FundingRecord],
    open_positions: &[OpenPositionSnapshot],
    tz: Tz,
) -> Summary {
    let mut totals = Totals::default();
    // BTreeMap keeps the fixed-width YYYY-MM-DD keys sorted ascending
    let mut by_day: BTreeMap<String, DailyEntry> = BTreeMap::new();

    for tx in transactions {
        let slot = by_day.entry(day_key(tx.timestamp, tz)).or_default();
        match tx.category {
            Category::Gain | Category::Loss => {
                totals.realized_eur += tx.amount_eur;
                slot.realized += tx.amount_eur;
            }
            Category::Fee => {
                totals.fees_eur += tx.amount_eur;
                slot.fees += tx.amount_eur;
            }
            Category::Deposit => {
                totals.deposits_eur += tx.amount_eur;
                slot.deposits += tx.amount_eur;
            }
            Category::Withdrawal => {
                totals.withdrawals_eur += tx.amount_eur;
                slot.withdrawals += tx.amount_eur;
            }
            Category::Other => {}
        }
    }

    for record in funding {
        totals.funding_eur += record.amount_eur;
        let slot = by_day.entry(day_key(record.timestamp, tz)).or_default();
        slot.funding += record.amount_eur;
    }

    let daily: Vec<DailyEntry> = by_day
        .into_iter()
        .map(|(date, mut entry)| {
            entry.date = date;
            entry
        })
        .collect();

    let mut cum_realized = 0.0;
    let mut cum_funding = 0.0;
    let mut cum_fees = 0.0;
    let pnl_series: Vec<PnlPoint> = daily
        .iter()
        .map(|day| {
            cum_realized += day.realized;
            cum_funding += day.funding;
            cum_fees += day.fees;
            PnlPoint {
                date: day.date.clone(),
                realized: day.realized,
                funding: day.funding,
                fees: day.fees,
                cumulative: cum_realized + cum_funding - cum_fees,
            }
        })
        .collect();

    let mut invested_cum = 0.0;
    let equity_series: Vec<EquityPoint> = daily
        .iter()
        .zip(pnl_series.iter())
        .map(|(day, pnl)| {
            invested_cum += day.deposits + day.withdrawals;
            EquityPoint {
                date: day.date.clone(),
                invested: invested_cum,
                equity: invested_cum + pnl.cumulative,
            }
        })
        .collect();

    let mut peak = f64::NEG_INFINITY;
    let drawdown_series: Vec<DrawdownPoint> = equity_series
        .iter()
        .map(|point| {
            peak = peak.max(point.equity);
            let drawdown = if peak > 0.0 {
                (point.equity - peak) / peak
            } else {
                0.0
            };
            DrawdownPoint {
                date: point.date.clone(),
                drawdown,
            }
        })
        .collect();

    let invested = totals.deposits_eur + totals.withdrawals_eur;
    let upnl_eur: f64 = open_positions.iter().map(|p| p.unrealized_pnl_eur).sum();
    let equity = EquityNow {
        invested,
        upnl_eur,
        equity_now: invested + totals.realized_eur + totals.funding_eur - totals.fees_eur + upnl_eur,
    };

    let trade_pnls: Vec<f64> = transactions
        .iter()
        .filter(|tx| matches!(tx.category, Category::Gain | Category::Loss))
        .map(|tx| tx.amount_eur)
        .collect();
    let wins: Vec<f64> = trade_pnls.iter().copied().filter(|&v| v > 0.0).collect();
    let losses: Vec<f64> = trade_pnls.iter().copied().filter(|&v| v < 0.0).collect();
    let stats = TradeStats {
        trades: trade_pnls.len(),
        winrate: if trade_pnls.is_empty() {
            0.0
        } else {
            wins.len() as f64 / trade_pnls.len() as f64 * 100.0
        },
        avg_win: if wins.is_empty() {
            0.0
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        },
        avg_loss: if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f64>() / losses.len() as f64
        },
    };

    Summary {
        totals,
        daily,
        pnl_series,
        equity_series,
        drawdown_series,
        equity,
        stats,
    }
}
