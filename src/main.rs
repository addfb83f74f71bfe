#[cfg(test)]
mod tests;

pub mod config;
pub mod exchange;
pub mod explorer;
pub mod http;
pub mod pipeline;
pub mod ratelimit;
pub mod rates;
pub mod storage;
pub mod summary;
pub mod tax;

use {
    config::Config,
    exchange::ExchangeClient,
    explorer::ExplorerClient,
    http::{FetchClient, ReqwestTransport, Transport},
    pipeline::WalletSync,
    ratelimit::{Clock, RateLimiter, SystemClock},
    rates::RateResolver,
    std::sync::Arc,
    storage::{austrian_brackets_2025, LedgerStore, SqliteStore, TaxStore},
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env();

    log::info!("🚀 Starting perptax sync runtime...");
    log::info!("📊 Configuration:");
    log::info!("   Info API: {}", config.info_url);
    log::info!("   Database: {}", config.db_path);
    log::info!("   Report timezone: {}", config.report_timezone);

    let wallet_address = config
        .wallet_address
        .clone()
        .ok_or("WALLET_ADDRESS must be set")?;

    // Database + schema
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = rusqlite::Connection::open(&config.db_path)?;
    storage::run_schema_migrations(&mut conn, &config.schema_dir)?;
    let store = Arc::new(SqliteStore::from_connection(conn));
    store.seed_brackets(&austrian_brackets_2025()).await?;

    // Outbound plumbing: limiter -> fetch client -> accessors
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = Arc::new(RateLimiter::with_default_buckets(clock.clone()));
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
    let client = Arc::new(FetchClient::new(limiter, transport, clock));

    let exchange = Arc::new(ExchangeClient::new(client.clone(), config.info_url.clone()));
    let explorer = Arc::new(ExplorerClient::new(client.clone(), config.explorer_url.clone()));
    let resolver = Arc::new(RateResolver::new(
        client,
        store.clone(),
        config.ecb_url.clone(),
        config.rates_url.clone(),
    ));

    let sync = WalletSync::new(exchange, explorer, resolver, store.clone());
    let report = sync.sync(&wallet_address, config.save_wallet).await?;

    log::info!(
        "✅ Sync finished: {} transactions, {} funding records",
        report.transactions_written,
        report.funding_written
    );

    // Aggregate the freshly synced ledger for a quick report
    let transactions = store.transactions(&wallet_address).await?;
    let funding = store.funding(&wallet_address).await?;
    let open_positions = store.open_positions(&wallet_address).await?;
    let summary = summary::summarize(
        &transactions,
        &funding,
        &open_positions,
        config.report_timezone,
    );

    log::info!("📊 Totals:");
    log::info!("   Realized PnL: {:.2} EUR", summary.totals.realized_eur);
    log::info!("   Funding:      {:.2} EUR", summary.totals.funding_eur);
    log::info!("   Fees:         {:.2} EUR", summary.totals.fees_eur);
    log::info!("   Equity now:   {:.2} EUR", summary.equity.equity_now);

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
