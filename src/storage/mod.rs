//! SQLite storage behind async traits
//!
//! The pipeline, resolver, and tax calculator only speak to storage through
//! the traits below, so tests can substitute in-memory doubles and the
//! SQLite implementation stays swappable.
//!
//! Tables written (see `/sql/` directory):
//! - `transactions` - UPSERT on (wallet_address, tx_hash)
//! - `funding` - UPSERT on (wallet_address, funding_id)
//! - `open_positions` - REPLACE on (wallet_address, symbol)
//! - `wallet_fetch_log` - INSERT (append-only cursor log)
//! - `rates` - UPSERT on date
//! - `tax_brackets` - idempotent seed

use crate::pipeline::types::{
    CachedRate, Category, FundingRecord, OpenPositionSnapshot, TaxBracket, Transaction,
    WalletFetchLog,
};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Ledger persistence used by the ingestion pipeline and the analytics reader.
///
/// Upserts are idempotent under their natural keys: re-running a sync over
/// already-seen events must not create duplicate rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn upsert_transaction(&self, tx: Transaction) -> Result<(), Box<dyn std::error::Error>>;

    async fn upsert_funding(&self, record: FundingRecord) -> Result<(), Box<dyn std::error::Error>>;

    /// Replace the snapshot row for (wallet, symbol) wholesale
    async fn replace_open_position(
        &self,
        snapshot: OpenPositionSnapshot,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// All transactions for a wallet, ordered by timestamp ascending
    async fn transactions(&self, wallet: &str) -> Result<Vec<Transaction>, Box<dyn std::error::Error>>;

    /// All funding records for a wallet, ordered by timestamp ascending
    async fn funding(&self, wallet: &str) -> Result<Vec<FundingRecord>, Box<dyn std::error::Error>>;

    async fn open_positions(
        &self,
        wallet: &str,
    ) -> Result<Vec<OpenPositionSnapshot>, Box<dyn std::error::Error>>;

    /// Most recent sync cursor for a wallet, if any
    async fn latest_fetch_log(
        &self,
        wallet: &str,
    ) -> Result<Option<WalletFetchLog>, Box<dyn std::error::Error>>;

    /// Append a new cursor row (the log is append-only)
    async fn append_fetch_log(&self, log: WalletFetchLog) -> Result<(), Box<dyn std::error::Error>>;
}

/// Day-keyed USD/EUR rate cache
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn find_rate(&self, day: NaiveDate) -> Result<Option<f64>, Box<dyn std::error::Error>>;

    /// Insert or overwrite the rate for a day (bulk CSV import may overwrite)
    async fn upsert_rate(&self, day: NaiveDate, usd_eur: f64) -> Result<(), Box<dyn std::error::Error>>;
}

/// Progressive tax bracket schedule
#[async_trait]
pub trait TaxStore: Send + Sync {
    /// Brackets for a year, sorted ascending by income limit
    async fn brackets_for_year(&self, year: i32) -> Result<Vec<TaxBracket>, Box<dyn std::error::Error>>;

    /// Seed a year's schedule; a no-op if any bracket already exists for it
    async fn seed_brackets(&self, brackets: &[TaxBracket]) -> Result<(), Box<dyn std::error::Error>>;
}

/// Run schema migrations from SQL files.
///
/// Reads all .sql files from the directory in name order and executes them.
/// Every file must use "IF NOT EXISTS" clauses so the loader stays idempotent.
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(format!("Schema directory not found: {}", schema_dir).into());
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = path.file_name().unwrap().to_string_lossy().to_string();

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;

        log::info!("   ├─ ✅ {}", filename);
    }

    log::info!("✅ All schema migrations completed");

    Ok(())
}

/// Austrian progressive income tax schedule for 2025.
///
/// The 1e12 limit stands in for the open-ended top bracket.
pub fn austrian_brackets_2025() -> Vec<TaxBracket> {
    let rows = [
        (13_308.0, 0.0),
        (21_617.0, 20.0),
        (35_836.0, 30.0),
        (69_166.0, 40.0),
        (103_072.0, 48.0),
        (1_000_000.0, 50.0),
        (1e12, 55.0),
    ];
    rows.iter()
        .map(|&(income_limit, rate_percent)| TaxBracket {
            year: 2025,
            income_limit,
            rate_percent,
        })
        .collect()
}

/// SQLite implementation of all three storage traits
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a store over an existing database file.
    ///
    /// Does NOT create the schema; run [`run_schema_migrations`] first.
    pub fn new(db_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
        let category: String = row.get(2)?;
        let ts_ms: i64 = row.get(6)?;
        Ok(Transaction {
            wallet_address: row.get(0)?,
            tx_hash: row.get(1)?,
            category: Category::parse(&category).unwrap_or(Category::Other),
            symbol: row.get(3)?,
            amount_usdc: row.get(4)?,
            amount_eur: row.get(5)?,
            timestamp: Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_else(Utc::now),
            meta: row.get(7)?,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn upsert_transaction(&self, tx: Transaction) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO transactions
                (wallet_address, tx_hash, category, symbol, amount_usdc, amount_eur, timestamp, meta)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(wallet_address, tx_hash) DO NOTHING
            "#,
            rusqlite::params![
                tx.wallet_address,
                tx.tx_hash,
                tx.category.as_str(),
                tx.symbol,
                tx.amount_usdc,
                tx.amount_eur,
                tx.timestamp.timestamp_millis(),
                tx.meta,
            ],
        )?;
        Ok(())
    }

    async fn upsert_funding(&self, record: FundingRecord) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO funding
                (wallet_address, funding_id, symbol, amount_usdc, amount_eur, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(wallet_address, funding_id) DO NOTHING
            "#,
            rusqlite::params![
                record.wallet_address,
                record.funding_id,
                record.symbol,
                record.amount_usdc,
                record.amount_eur,
                record.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn replace_open_position(
        &self,
        snapshot: OpenPositionSnapshot,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO open_positions
                (wallet_address, symbol, size, entry_price, mark_price, unrealized_pnl_usdc, unrealized_pnl_eur)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(wallet_address, symbol) DO UPDATE SET
                size = excluded.size,
                entry_price = excluded.entry_price,
                mark_price = excluded.mark_price,
                unrealized_pnl_usdc = excluded.unrealized_pnl_usdc,
                unrealized_pnl_eur = excluded.unrealized_pnl_eur
            "#,
            rusqlite::params![
                snapshot.wallet_address,
                snapshot.symbol,
                snapshot.size,
                snapshot.entry_price,
                snapshot.mark_price,
                snapshot.unrealized_pnl_usdc,
                snapshot.unrealized_pnl_eur,
            ],
        )?;
        Ok(())
    }

    async fn transactions(&self, wallet: &str) -> Result<Vec<Transaction>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT wallet_address, tx_hash, category, symbol, amount_usdc, amount_eur, timestamp, meta
            FROM transactions
            WHERE wallet_address = ?1
            ORDER BY timestamp ASC
            "#,
        )?;
        let rows = stmt
            .query_map([wallet], Self::row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn funding(&self, wallet: &str) -> Result<Vec<FundingRecord>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT wallet_address, funding_id, symbol, amount_usdc, amount_eur, timestamp
            FROM funding
            WHERE wallet_address = ?1
            ORDER BY timestamp ASC
            "#,
        )?;
        let rows = stmt
            .query_map([wallet], |row| {
                let ts_ms: i64 = row.get(5)?;
                Ok(FundingRecord {
                    wallet_address: row.get(0)?,
                    funding_id: row.get(1)?,
                    symbol: row.get(2)?,
                    amount_usdc: row.get(3)?,
                    amount_eur: row.get(4)?,
                    timestamp: Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_else(Utc::now),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn open_positions(
        &self,
        wallet: &str,
    ) -> Result<Vec<OpenPositionSnapshot>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT wallet_address, symbol, size, entry_price, mark_price,
                   unrealized_pnl_usdc, unrealized_pnl_eur
            FROM open_positions
            WHERE wallet_address = ?1
            "#,
        )?;
        let rows = stmt
            .query_map([wallet], |row| {
                Ok(OpenPositionSnapshot {
                    wallet_address: row.get(0)?,
                    symbol: row.get(1)?,
                    size: row.get(2)?,
                    entry_price: row.get(3)?,
                    mark_price: row.get(4)?,
                    unrealized_pnl_usdc: row.get(5)?,
                    unrealized_pnl_eur: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn latest_fetch_log(
        &self,
        wallet: &str,
    ) -> Result<Option<WalletFetchLog>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                r#"
                SELECT wallet_address, last_fetched_at
                FROM wallet_fetch_log
                WHERE wallet_address = ?1
                ORDER BY last_fetched_at DESC
                LIMIT 1
                "#,
                [wallet],
                |row| {
                    let ts_ms: i64 = row.get(1)?;
                    Ok(WalletFetchLog {
                        wallet_address: row.get(0)?,
                        last_fetched_at: Utc
                            .timestamp_millis_opt(ts_ms)
                            .single()
                            .unwrap_or_else(Utc::now),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn append_fetch_log(&self, log: WalletFetchLog) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO wallet_fetch_log (wallet_address, last_fetched_at) VALUES (?1, ?2)",
            rusqlite::params![log.wallet_address, log.last_fetched_at.timestamp_millis()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RateStore for SqliteStore {
    async fn find_rate(&self, day: NaiveDate) -> Result<Option<f64>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let rate = conn
            .query_row(
                "SELECT usd_eur FROM rates WHERE date = ?1",
                [day.format("%Y-%m-%d").to_string()],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(rate)
    }

    async fn upsert_rate(&self, day: NaiveDate, usd_eur: f64) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO rates (date, usd_eur) VALUES (?1, ?2)
            ON CONFLICT(date) DO UPDATE SET usd_eur = excluded.usd_eur
            "#,
            rusqlite::params![day.format("%Y-%m-%d").to_string(), usd_eur],
        )?;
        Ok(())
    }
}

#[async_trait]
impl TaxStore for SqliteStore {
    async fn brackets_for_year(&self, year: i32) -> Result<Vec<TaxBracket>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT year, income_limit, rate_percent
            FROM tax_brackets
            WHERE year = ?1
            ORDER BY income_limit ASC
            "#,
        )?;
        let rows = stmt
            .query_map([year], |row| {
                Ok(TaxBracket {
                    year: row.get(0)?,
                    income_limit: row.get(1)?,
                    rate_percent: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn seed_brackets(&self, brackets: &[TaxBracket]) -> Result<(), Box<dyn std::error::Error>> {
        let Some(first) = brackets.first() else {
            return Ok(());
        };
        let conn = self.conn.lock().unwrap();
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tax_brackets WHERE year = ?1",
            [first.year],
            |row| row.get(0),
        )?;
        if existing > 0 {
            log::debug!("Tax brackets already seeded for {}", first.year);
            return Ok(());
        }
        for bracket in brackets {
            conn.execute(
                "INSERT INTO tax_brackets (year, income_limit, rate_percent) VALUES (?1, ?2, ?3)",
                rusqlite::params![bracket.year, bracket.income_limit, bracket.rate_percent],
            )?;
        }
        log::info!("Seeded {} tax brackets for {}", brackets.len(), first.year);
        Ok(())
    }
}

/// Keep the rate cache API symmetrical with the other stores
impl SqliteStore {
    pub async fn all_rates(&self) -> Result<Vec<CachedRate>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT date, usd_eur FROM rates ORDER BY date ASC")?;
        let rows = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                Ok((date, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(date, usd_eur)| {
                NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .ok()
                    .map(|date| CachedRate { date, usd_eur })
            })
            .collect())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::create_test_store;
    use super::*;

    fn make_test_transaction(tx_hash: &str, amount_eur: f64) -> Transaction {
        Transaction {
            wallet_address: "0xtest_wallet_address".to_string(),
            tx_hash: tx_hash.to_string(),
            category: Category::Gain,
            symbol: "ETH".to_string(),
            amount_usdc: amount_eur / 0.9,
            amount_eur,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap(),
            meta: None,
        }
    }

    #[tokio::test]
    async fn test_transaction_upsert_is_idempotent() {
        let (_temp, store) = create_test_store();

        let tx = make_test_transaction("fill-1-pnl-", 100.0);
        store.upsert_transaction(tx.clone()).await.unwrap();
        store.upsert_transaction(tx).await.unwrap();

        let rows = store.transactions("0xtest_wallet_address").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount_eur, 100.0);
    }

    #[tokio::test]
    async fn test_transactions_ordered_by_timestamp() {
        let (_temp, store) = create_test_store();

        let mut early = make_test_transaction("a", 1.0);
        early.timestamp = Utc.timestamp_millis_opt(1_000).single().unwrap();
        let mut late = make_test_transaction("b", 2.0);
        late.timestamp = Utc.timestamp_millis_opt(2_000).single().unwrap();

        store.upsert_transaction(late).await.unwrap();
        store.upsert_transaction(early).await.unwrap();

        let rows = store.transactions("0xtest_wallet_address").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].timestamp < rows[1].timestamp);
    }

    #[tokio::test]
    async fn test_replace_open_position_overwrites() {
        let (_temp, store) = create_test_store();

        let mut snapshot = OpenPositionSnapshot {
            wallet_address: "0xtest_wallet_address".to_string(),
            symbol: "BTC".to_string(),
            size: 1.0,
            entry_price: 40_000.0,
            mark_price: 41_000.0,
            unrealized_pnl_usdc: 1_000.0,
            unrealized_pnl_eur: 900.0,
        };
        store.replace_open_position(snapshot.clone()).await.unwrap();

        snapshot.mark_price = 42_000.0;
        snapshot.unrealized_pnl_usdc = 2_000.0;
        store.replace_open_position(snapshot).await.unwrap();

        let rows = store.open_positions("0xtest_wallet_address").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mark_price, 42_000.0);
        assert_eq!(rows[0].unrealized_pnl_usdc, 2_000.0);
    }

    #[tokio::test]
    async fn test_latest_fetch_log_returns_newest() {
        let (_temp, store) = create_test_store();
        let wallet = "0xtest_wallet_address";

        assert!(store.latest_fetch_log(wallet).await.unwrap().is_none());

        for ts in [1_000, 3_000, 2_000] {
            store
                .append_fetch_log(WalletFetchLog {
                    wallet_address: wallet.to_string(),
                    last_fetched_at: Utc.timestamp_millis_opt(ts).single().unwrap(),
                })
                .await
                .unwrap();
        }

        let latest = store.latest_fetch_log(wallet).await.unwrap().unwrap();
        assert_eq!(latest.last_fetched_at.timestamp_millis(), 3_000);
    }

    #[tokio::test]
    async fn test_rate_cache_upsert_overwrites() {
        let (_temp, store) = create_test_store();
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        assert!(store.find_rate(day).await.unwrap().is_none());

        store.upsert_rate(day, 0.91).await.unwrap();
        assert_eq!(store.find_rate(day).await.unwrap(), Some(0.91));

        // CSV import may overwrite an existing day
        store.upsert_rate(day, 0.92).await.unwrap();
        assert_eq!(store.find_rate(day).await.unwrap(), Some(0.92));
    }

    #[tokio::test]
    async fn test_seed_brackets_is_idempotent() {
        let (_temp, store) = create_test_store();

        store.seed_brackets(&austrian_brackets_2025()).await.unwrap();
        store.seed_brackets(&austrian_brackets_2025()).await.unwrap();

        let brackets = store.brackets_for_year(2025).await.unwrap();
        assert_eq!(brackets.len(), 7);
        // Sorted ascending by income limit
        assert!(brackets.windows(2).all(|w| w[0].income_limit < w[1].income_limit));
        assert_eq!(brackets[0].rate_percent, 0.0);
        assert_eq!(brackets[6].rate_percent, 55.0);
    }
}
