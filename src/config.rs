//! Runtime configuration from environment variables

use chrono_tz::Tz;
use std::env;

/// Configuration for the sync runtime.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Exchange info-API endpoint
    pub info_url: String,

    /// Block explorer base URL; enrichment is skipped when unset
    pub explorer_url: Option<String>,

    /// ECB statistical data API base URL (primary rate source)
    pub ecb_url: String,

    /// Fallback rate provider base URL
    pub rates_url: String,

    /// Path to the SQLite database file
    pub db_path: String,

    /// Directory holding the numbered schema migration files
    pub schema_dir: String,

    /// Timezone used for report day bucketing
    pub report_timezone: Tz,

    /// Wallet to sync (required by the sync runtime)
    pub wallet_address: Option<String>,

    /// Whether to persist the sync cursor after a successful run
    pub save_wallet: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HYPERLIQUID_INFO_URL` (default: https://api.hyperliquid.xyz/info)
    /// - `HYPERLIQUID_EXPLORER_URL` (default: unset, enrichment disabled)
    /// - `ECB_SDW_URL` (default: https://sdw-wsrest.ecb.europa.eu/service/data)
    /// - `EXCHANGERATE_HOST_URL` (default: https://api.exchangerate.host)
    /// - `PERPTAX_DB_PATH` (default: data/perptax.db)
    /// - `PERPTAX_SCHEMA_DIR` (default: sql)
    /// - `REPORT_TIMEZONE` (default: Europe/Vienna)
    /// - `WALLET_ADDRESS` (default: unset)
    /// - `SAVE_WALLET` (default: true)
    pub fn from_env() -> Self {
        Self {
            info_url: env::var("HYPERLIQUID_INFO_URL")
                .unwrap_or_else(|_| "https://api.hyperliquid.xyz/info".to_string()),

            explorer_url: env::var("HYPERLIQUID_EXPLORER_URL")
                .ok()
                .filter(|url| !url.is_empty()),

            ecb_url: env::var("ECB_SDW_URL")
                .unwrap_or_else(|_| "https://sdw-wsrest.ecb.europa.eu/service/data".to_string()),

            rates_url: env::var("EXCHANGERATE_HOST_URL")
                .unwrap_or_else(|_| "https://api.exchangerate.host".to_string()),

            db_path: env::var("PERPTAX_DB_PATH").unwrap_or_else(|_| "data/perptax.db".to_string()),

            schema_dir: env::var("PERPTAX_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            report_timezone: env::var("REPORT_TIMEZONE")
                .ok()
                .and_then(|name| name.parse().ok())
                .unwrap_or(chrono_tz::Europe::Vienna),

            wallet_address: env::var("WALLET_ADDRESS").ok().filter(|w| !w.is_empty()),

            save_wallet: env::var("SAVE_WALLET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }
}
