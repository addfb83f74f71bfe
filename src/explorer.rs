//! Block explorer enrichment client
//!
//! Explorer queries are heavy (weight 40 against the explorer bucket) and
//! strictly best-effort: the sync pipeline swallows every failure from here.

use crate::http::{FetchClient, FetchError};
use serde_json::Value;
use std::sync::Arc;

pub const SOURCE_EXPLORER: &str = "explorer";

const EXPLORER_WEIGHT: f64 = 40.0;

pub struct ExplorerClient {
    client: Arc<FetchClient>,
    explorer_url: Option<String>,
}

impl ExplorerClient {
    pub fn new(client: Arc<FetchClient>, explorer_url: Option<String>) -> Self {
        Self { client, explorer_url }
    }

    fn base_url(&self) -> Result<&str, Box<dyn std::error::Error>> {
        self.explorer_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| "explorer URL not configured".into())
    }

    pub async fn user_details(&self, address: &str) -> Result<Value, Box<dyn std::error::Error>> {
        let url = format!("{}/user_details?address={}", self.base_url()?, address);
        self.get(&url).await
    }

    pub async fn tx_details(&self, hash: &str) -> Result<Value, Box<dyn std::error::Error>> {
        let url = format!("{}/tx_details?hash={}", self.base_url()?, hash);
        self.get(&url).await
    }

    async fn get(&self, url: &str) -> Result<Value, Box<dyn std::error::Error>> {
        self.client
            .get_json(url, EXPLORER_WEIGHT, SOURCE_EXPLORER)
            .await
            .map_err(|e: FetchError| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ReqwestTransport, Transport};
    use crate::ratelimit::{RateLimiter, SystemClock};

    fn make_client(explorer_url: Option<String>) -> ExplorerClient {
        let clock = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::with_default_buckets(clock.clone()));
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new().unwrap());
        ExplorerClient::new(Arc::new(FetchClient::new(limiter, transport, clock)), explorer_url)
    }

    #[tokio::test]
    async fn test_unconfigured_url_errors_without_io() {
        let client = make_client(None);
        assert!(client.user_details("0xabc").await.is_err());

        let client = make_client(Some(String::new()));
        assert!(client.user_details("0xabc").await.is_err());
    }
}
