//! # Ledger ingestion pipeline
//!
//! Turns raw exchange events into a canonical, EUR-priced transaction ledger:
//!
//! 1. Raw fills, funding payments, and ledger transfers arrive as dynamic
//!    JSON from the exchange accessors
//! 2. The normalization boundary maps variant field names onto typed values
//! 3. Every event is priced for its UTC calendar day via the rate resolver
//! 4. Canonical records are upserted under idempotent dedup keys, so a sync
//!    can be safely re-run to completion after any failure
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (Transaction, FundingRecord, ...)
//! - `normalize` - Field-fallback extraction for dynamic upstream shapes
//! - `sync` - The windowed, incremental wallet sync orchestrator

pub mod normalize;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use sync::WalletSync;
pub use types::{
    CachedRate, Category, FundingRecord, OpenPositionSnapshot, SyncReport, TaxBracket,
    Transaction, WalletFetchLog,
};
