//! Exchange info-API accessors
//!
//! All reads are POSTs against a single info endpoint with a `type`
//! discriminator. Responses are kept as dynamic JSON; typing happens later at
//! the normalization boundary.

use crate::http::{FetchClient, FetchError};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SOURCE_INFO: &str = "info";

pub struct ExchangeClient {
    client: Arc<FetchClient>,
    info_url: String,
}

impl ExchangeClient {
    pub fn new(client: Arc<FetchClient>, info_url: String) -> Self {
        Self { client, info_url }
    }

    async fn info_request(&self, mut payload: Value, since: Option<i64>) -> Result<Value, FetchError> {
        if let Some(start_ms) = since {
            payload["params"] = json!({ "startTime": start_ms });
        }
        self.client
            .post_json(&self.info_url, &payload, 1.0, SOURCE_INFO)
            .await
    }

    /// Executed trade events. `since` is a millisecond epoch lower bound.
    pub async fn user_fills(&self, address: &str, since: Option<i64>) -> Result<Vec<Value>, FetchError> {
        let data = self
            .info_request(json!({ "type": "userFills", "user": address }), since)
            .await?;
        Ok(extract_array(&data, "fills"))
    }

    /// Perpetual funding settlements
    pub async fn user_funding(&self, address: &str, since: Option<i64>) -> Result<Vec<Value>, FetchError> {
        let data = self
            .info_request(json!({ "type": "userFunding", "user": address }), since)
            .await?;
        Ok(extract_array(&data, "funding"))
    }

    /// Non-funding ledger updates: deposits, withdrawals, transfers
    pub async fn user_non_funding_ledger(
        &self,
        address: &str,
        since: Option<i64>,
    ) -> Result<Vec<Value>, FetchError> {
        let data = self
            .info_request(
                json!({ "type": "userNonFundingLedgerUpdates", "user": address }),
                since,
            )
            .await?;
        Ok(extract_array(&data, "ledger"))
    }

    /// Current account state including open positions
    pub async fn clearinghouse_state(&self, address: &str) -> Result<Value, FetchError> {
        self.info_request(json!({ "type": "clearinghouseState", "user": address }), None)
            .await
    }
}

/// Pull the event array out of a response that is either an object keyed by
/// the operation name or a bare array (both shapes occur upstream).
fn extract_array(data: &Value, key: &str) -> Vec<Value> {
    match data {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get(key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_array_from_keyed_object() {
        let data = json!({ "fills": [{ "id": 1 }, { "id": 2 }] });
        assert_eq!(extract_array(&data, "fills").len(), 2);
    }

    #[test]
    fn test_extract_array_from_bare_array() {
        let data = json!([{ "id": 1 }]);
        assert_eq!(extract_array(&data, "fills").len(), 1);
    }

    #[test]
    fn test_extract_array_missing_key_is_empty() {
        let data = json!({ "other": [] });
        assert!(extract_array(&data, "fills").is_empty());
        assert!(extract_array(&json!(null), "fills").is_empty());
    }
}
