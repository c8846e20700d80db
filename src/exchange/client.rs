use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{
    candle_from_raw, AccountInfo, ApiErrorBody, AssetBalance, ExchangeInfo, OrderAck, OrderSide,
    RawKline, SymbolRules, Ticker24h,
};
use super::ExchangeApi;
use crate::error::ExchangeError;
use crate::models::Candle;

/// Published per-minute request weight budget for the REST API.
const WEIGHT_BUDGET_PER_MINUTE: u32 = 1000;
const MAX_RETRIES: u32 = 3;
/// Fallback wait when a 429 carries no Retry-After header.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

// Endpoint weights from the exchange's API documentation
const WEIGHT_ALL_TICKERS: u32 = 2;
const WEIGHT_KLINES: u32 = 5;
const WEIGHT_ACCOUNT: u32 = 10;
const WEIGHT_EXCHANGE_INFO: u32 = 2;
const WEIGHT_ORDER: u32 = 1;

// Type alias for the rate limiter to simplify signatures
type ApiRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST client for the exchange with weight-based rate limiting and retry.
///
/// Cloneable; all clones share one token bucket, so every worker draws
/// from the same request budget. Transient failures (network errors, 5xx)
/// retry with exponential backoff up to `MAX_RETRIES`; 429 responses wait
/// out the server-indicated interval without consuming retry budget.
#[derive(Clone)]
pub struct ExchangeClient {
    http: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<ApiRateLimiter>,
}

impl ExchangeClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(WEIGHT_BUDGET_PER_MINUTE).unwrap());

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Execute a request with rate limiting and retry. `build` constructs
    /// a fresh request per attempt.
    async fn execute<T, F>(&self, weight: u32, build: F) -> Result<T, ExchangeError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        let weight = NonZeroU32::new(weight).unwrap_or(NonZeroU32::MIN);
        let mut attempt = 0u32;

        loop {
            self.rate_limiter
                .until_n_ready(weight)
                .await
                .map_err(|e| ExchangeError::Transient(format!("weight over bucket size: {}", e)))?;

            match build(&self.http).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            ExchangeError::Transient(format!("malformed response body: {}", e))
                        });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        // Server-paced wait; deliberately not counted
                        // against the retry budget.
                        let wait = retry_after(&response).unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                        tracing::warn!(
                            "Rate limited by exchange (429), waiting {:?} before resuming",
                            wait
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if status.is_server_error() {
                        attempt += 1;
                        if attempt >= MAX_RETRIES {
                            return Err(ExchangeError::Transient(format!(
                                "server error {} after {} attempts",
                                status, MAX_RETRIES
                            )));
                        }
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Server error {} from exchange, retrying in {:?} (attempt {}/{})",
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    // Other 4xx - terminal, don't retry
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify_client_error(status.as_u16(), &body));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(ExchangeError::Transient(format!(
                            "network error after {} attempts: {}",
                            MAX_RETRIES, e
                        )));
                    }
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    tracing::warn!(
                        "Network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a 4xx body onto the error taxonomy. The exchange reports a numeric
/// code; -2010 is insufficient balance, order-validity rejections come as
/// -1013/-1111/-2011.
fn classify_client_error(status: u16, body: &str) -> ExchangeError {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(body) {
        return match api_error.code {
            -2010 => ExchangeError::InsufficientBalance(api_error.msg),
            -1013 | -1111 | -2011 => ExchangeError::InvalidOrder(api_error.msg),
            _ => ExchangeError::Terminal {
                status,
                message: format!("code {}: {}", api_error.code, api_error.msg),
            },
        };
    }
    ExchangeError::Terminal {
        status,
        message: body.to_string(),
    }
}

#[async_trait]
impl ExchangeApi for ExchangeClient {
    async fn all_tickers(&self) -> Result<Vec<Ticker24h>, ExchangeError> {
        let url = self.url("/api/v3/ticker/24hr");
        self.execute(WEIGHT_ALL_TICKERS, |http| http.get(&url)).await
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let url = self.url("/api/v3/klines");
        let raw: Vec<RawKline> = self
            .execute(WEIGHT_KLINES, |http| {
                http.get(&url).query(&[
                    ("symbol", symbol),
                    ("interval", interval),
                    ("limit", &limit.to_string()),
                ])
            })
            .await?;

        raw.iter().map(candle_from_raw).collect()
    }

    async fn balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let url = self.url("/api/v3/account");
        let account: AccountInfo = self
            .execute(WEIGHT_ACCOUNT, |http| {
                http.get(&url).header("X-MBX-APIKEY", &self.api_key)
            })
            .await?;
        Ok(account.balances)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        let url = self.url("/api/v3/exchangeInfo");
        let info: ExchangeInfo = self
            .execute(WEIGHT_EXCHANGE_INFO, |http| {
                http.get(&url).query(&[("symbol", symbol)])
            })
            .await?;

        info.symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.rules())
            .ok_or_else(|| ExchangeError::Terminal {
                status: 404,
                message: format!("symbol {} not found in exchange info", symbol),
            })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        let url = self.url("/api/v3/order");
        self.execute(WEIGHT_ORDER, |http| {
            http.post(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .query(&[
                    ("symbol", symbol),
                    ("side", side.as_str()),
                    ("type", "MARKET"),
                    ("quantity", &format!("{}", quantity)),
                    ("newClientOrderId", client_order_id),
                ])
        })
        .await
    }
}
