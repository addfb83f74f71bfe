//! Resilient JSON fetch client
//!
//! Every request pays its weight to the rate limiter before touching the
//! network. HTTP 429 and 5xx responses are treated as transient and retried
//! with exponential backoff indefinitely; any other non-2xx status fails
//! immediately with the status and body attached. Callers wanting a hard
//! timeout must enforce it externally.

use crate::ratelimit::{Clock, RateLimiter};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Duration;

/// First retry delay is BASE * 2^1 = 400ms, doubling per attempt up to MAX.
const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 2_000;

/// Request timeout applied by the production transport
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetch failure taxonomy.
///
/// `Status` is a permanent request error (non-retryable client error);
/// transient statuses never surface here because they are retried internally.
#[derive(Debug)]
pub enum FetchError {
    /// Non-2xx, non-retryable HTTP status with the response body
    Status { status: u16, body: String },
    /// Transport-level failure (connect, TLS, timeout)
    Transport(String),
    /// 2xx response whose body was not valid JSON
    Parse(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status { status, body } => write!(f, "HTTP {} {}", status, body),
            FetchError::Transport(msg) => write!(f, "transport error: {}", msg),
            FetchError::Parse(msg) => write!(f, "invalid JSON response: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Raw response handed back by a transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Wire abstraction under the fetch client.
///
/// Production uses [`ReqwestTransport`]; tests substitute scripted
/// implementations to exercise the retry policy without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one HTTP exchange. `body` None issues a GET, Some a JSON POST.
    async fn execute(
        &self,
        url: &str,
        body: Option<&Value>,
    ) -> Result<TransportResponse, Box<dyn std::error::Error + Send + Sync>>;
}

/// reqwest-backed transport with rustls TLS
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        url: &str,
        body: Option<&Value>,
    ) -> Result<TransportResponse, Box<dyn std::error::Error + Send + Sync>> {
        let request = match body {
            Some(json) => self.client.post(url).json(json),
            None => self.client.get(url).header("Accept", "application/json"),
        };
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

/// Rate-limited, retrying JSON client shared by every outbound accessor
pub struct FetchClient {
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl FetchClient {
    pub fn new(limiter: Arc<RateLimiter>, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            transport,
            clock,
        }
    }

    /// GET a JSON document
    pub async fn get_json(&self, url: &str, weight: f64, source: &str) -> Result<Value, FetchError> {
        self.request(url, None, weight, source).await
    }

    /// POST a JSON payload and parse the JSON response
    pub async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        weight: f64,
        source: &str,
    ) -> Result<Value, FetchError> {
        self.request(url, Some(payload), weight, source).await
    }

    async fn request(
        &self,
        url: &str,
        body: Option<&Value>,
        weight: f64,
        source: &str,
    ) -> Result<Value, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.consume(weight, source).await;

            let response = self
                .transport
                .execute(url, body)
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            if (200..300).contains(&response.status) {
                return serde_json::from_str(&response.body)
                    .map_err(|e| FetchError::Parse(e.to_string()));
            }

            if response.status == 429 || response.status >= 500 {
                attempt += 1;
                let backoff = (BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt.min(16))))
                    .min(MAX_BACKOFF_MS);
                log::warn!(
                    "⏳ HTTP {} from {} (source: {}), retry attempt {} in {}ms",
                    response.status,
                    url,
                    source,
                    attempt,
                    backoff
                );
                self.clock.sleep(Duration::from_millis(backoff)).await;
                continue;
            }

            return Err(FetchError::Status {
                status: response.status,
                body: response.body,
            });
        }
    }
}
