//! Bulk rate table import
//!
//! Upserts a two-column `date,rate` CSV straight into the rate cache. This is
//! the offline fallback for when both live rate sources are unavailable.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin rates_import -- path/to/rates.csv
//! ```

use perptax::config::Config;
use perptax::rates::parse_rates_csv;
use perptax::storage::{run_schema_migrations, RateStore, SqliteStore};
use std::env;
use std::fs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let csv_path = env::args()
        .nth(1)
        .ok_or("usage: rates_import <path/to/rates.csv>")?;
    let csv = fs::read_to_string(&csv_path)?;

    let config = Config::from_env();
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        fs::create_dir_all(parent)?;
    }
    let mut conn = rusqlite::Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    let store = SqliteStore::from_connection(conn);

    let rows = parse_rates_csv(&csv);
    let total = rows.len();
    for (day, rate) in rows {
        store.upsert_rate(day, rate).await?;
    }

    let cached = store.all_rates().await?.len();
    log::info!("✅ Imported {} rates from {} ({} days cached)", total, csv_path, cached);
    Ok(())
}
