//! Progressive tax simulation
//!
//! Computes the marginal tax attributable to trading profit when stacked on
//! top of a base income, using the seeded bracket schedule.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin tax_sim -- <year> <base_income_eur> <trading_profit_eur>
//! ```

use perptax::config::Config;
use perptax::storage::{austrian_brackets_2025, run_schema_migrations, SqliteStore, TaxStore};
use perptax::tax;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        return Err("usage: tax_sim <year> <base_income_eur> <trading_profit_eur>".into());
    }
    let year: i32 = args[1].parse()?;
    let base_income: f64 = args[2].parse()?;
    let trading_profit: f64 = args[3].parse()?;

    let config = Config::from_env();
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = rusqlite::Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    let store = SqliteStore::from_connection(conn);
    store.seed_brackets(&austrian_brackets_2025()).await?;

    let simulation = tax::simulate(&store, year, base_income, trading_profit).await?;
    println!("{}", serde_json::to_string_pretty(&simulation)?);

    Ok(())
}
