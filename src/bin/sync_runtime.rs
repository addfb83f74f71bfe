//! Production sync runtime
//!
//! Syncs the configured wallet's full trading history into the local ledger
//! database and prints the aggregated summary as JSON.
//!
//! ## Usage
//!
//! ```bash
//! WALLET_ADDRESS=0x... cargo run --release --bin sync_runtime
//! ```
//!
//! See `Config::from_env` for all environment variables.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    perptax::main()
}
