#[cfg(test)]
mod tests {
    use crate::exchange::ExchangeClient;
    use crate::explorer::ExplorerClient;
    use crate::http::{FetchClient, Transport, TransportResponse};
    use crate::pipeline::types::Category;
    use crate::pipeline::WalletSync;
    use crate::ratelimit::testing::MockClock;
    use crate::ratelimit::RateLimiter;
    use crate::rates::RateResolver;
    use crate::storage::testing::create_test_store;
    use crate::storage::{austrian_brackets_2025, LedgerStore, TaxStore};
    use crate::{summary, tax};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const WALLET: &str = "0xintegration_wallet";
    const T0_MS: i64 = 1_717_408_800_000; // 2024-06-03T10:00:00Z

    /// Upstream double covering the info API and both rate sources
    struct FixtureUpstream;

    #[async_trait]
    impl Transport for FixtureUpstream {
        async fn execute(
            &self,
            url: &str,
            body: Option<&Value>,
        ) -> Result<TransportResponse, Box<dyn std::error::Error + Send + Sync>> {
            let response = match body {
                None => {
                    if url.contains("/EXR/") {
                        json!({ "dataSets": [{ "series": { "0:0:0:0:0": {
                            "observations": { "0": [0.9] } } } }] })
                    } else {
                        return Ok(TransportResponse {
                            status: 404,
                            body: "not found".to_string(),
                        });
                    }
                }
                Some(payload) => match payload["type"].as_str() {
                    Some("userFills") => json!({ "fills": [
                        { "id": "f1", "symbol": "ETH", "fee": 5.0, "realizedPnl": 100.0, "timestamp": T0_MS },
                        { "id": "f2", "symbol": "ETH", "fee": 2.0, "realizedPnl": -30.0, "timestamp": T0_MS + 1_000 }
                    ]}),
                    Some("userFunding") => json!({ "funding": [
                        { "id": "fu1", "symbol": "ETH", "amount": 1.5, "timestamp": T0_MS }
                    ]}),
                    Some("userNonFundingLedgerUpdates") => json!({ "ledger": [
                        { "hash": "0xd1", "type": "deposit", "amount": 1000.0, "timestamp": T0_MS },
                        { "hash": "0xw1", "type": "withdraw", "amount": -200.0, "timestamp": T0_MS + 2_000 }
                    ]}),
                    Some("clearinghouseState") => json!({ "positions": [] }),
                    other => panic!("unexpected request type: {:?}", other),
                },
            };
            Ok(TransportResponse {
                status: 200,
                body: response.to_string(),
            })
        }
    }

    /// End-to-end flow: sync a wallet from fixtures, aggregate the stored
    /// ledger, then simulate the tax on the realized profit.
    #[tokio::test]
    async fn test_sync_summarize_simulate_flow() {
        let (_temp, store) = create_test_store();

        let clock = Arc::new(MockClock::new(T0_MS));
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        limiter.add_bucket("info", 100_000.0, 1_000.0);
        limiter.add_bucket("rates", 100_000.0, 1_000.0);
        let client = Arc::new(FetchClient::new(limiter, Arc::new(FixtureUpstream), clock));

        let exchange = Arc::new(ExchangeClient::new(client.clone(), "http://info.test".to_string()));
        let explorer = Arc::new(ExplorerClient::new(client.clone(), None));
        let resolver = Arc::new(RateResolver::new(
            client,
            store.clone(),
            "http://ecb.test".to_string(),
            "http://fallback.test".to_string(),
        ));
        let sync = WalletSync::new(exchange, explorer, resolver, store.clone());

        let report = sync.sync(WALLET, true).await.unwrap();
        // 2 fills x (fee + pnl) + deposit + withdrawal
        assert_eq!(report.transactions_written, 6);
        assert_eq!(report.funding_written, 1);

        let transactions = store.transactions(WALLET).await.unwrap();
        let funding = store.funding(WALLET).await.unwrap();
        let open_positions = store.open_positions(WALLET).await.unwrap();

        let summary = summary::summarize(
            &transactions,
            &funding,
            &open_positions,
            chrono_tz::Europe::Vienna,
        );

        // All amounts priced at the fixture rate of 0.9 EUR/USD
        assert!((summary.totals.realized_eur - (100.0 - 30.0) * 0.9).abs() < 1e-9);
        assert!((summary.totals.fees_eur - 7.0 * 0.9).abs() < 1e-9);
        assert!((summary.totals.funding_eur - 1.5 * 0.9).abs() < 1e-9);
        assert!((summary.totals.deposits_eur - 900.0).abs() < 1e-9);
        assert!((summary.totals.withdrawals_eur - (-180.0)).abs() < 1e-9);
        assert_eq!(summary.stats.trades, 2);
        assert_eq!(summary.stats.winrate, 50.0);

        // Feed the realized profit into the tax simulation
        store.seed_brackets(&austrian_brackets_2025()).await.unwrap();
        let sim = tax::simulate(store.as_ref(), 2025, 40_000.0, summary.totals.realized_eur)
            .await
            .unwrap();
        assert!(sim.trading_delta > 0.0);
        assert!(
            (sim.trading_delta
                - (sim.with_trading.total_tax - sim.without_trading.total_tax))
                .abs()
                < 1e-9
        );
    }

    /// Ledger classification end to end: categories land in the right
    /// transaction rows after a sync.
    #[tokio::test]
    async fn test_synced_categories_match_event_types() {
        let (_temp, store) = create_test_store();

        let clock = Arc::new(MockClock::new(T0_MS));
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        limiter.add_bucket("info", 100_000.0, 1_000.0);
        limiter.add_bucket("rates", 100_000.0, 1_000.0);
        let client = Arc::new(FetchClient::new(limiter, Arc::new(FixtureUpstream), clock));

        let exchange = Arc::new(ExchangeClient::new(client.clone(), "http://info.test".to_string()));
        let explorer = Arc::new(ExplorerClient::new(client.clone(), None));
        let resolver = Arc::new(RateResolver::new(
            client,
            store.clone(),
            "http://ecb.test".to_string(),
            "http://fallback.test".to_string(),
        ));
        let sync = WalletSync::new(exchange, explorer, resolver, store.clone());

        sync.sync(WALLET, false).await.unwrap();

        let transactions = store.transactions(WALLET).await.unwrap();
        let count = |cat: Category| transactions.iter().filter(|t| t.category == cat).count();

        assert_eq!(count(Category::Fee), 2);
        assert_eq!(count(Category::Gain), 1);
        assert_eq!(count(Category::Loss), 1);
        assert_eq!(count(Category::Deposit), 1);
        assert_eq!(count(Category::Withdrawal), 1);
    }
}
