use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::types::{AssetBalance, SymbolRules, Ticker24h};
use super::ExchangeApi;
use crate::error::ExchangeError;
use crate::models::Candle;

// TTLs per data kind. Filters effectively never change intraday.
const TICKERS_TTL: Duration = Duration::from_secs(5);
const KLINES_TTL: Duration = Duration::from_secs(10);
const BALANCES_TTL: Duration = Duration::from_secs(10);
const RULES_TTL: Duration = Duration::from_secs(24 * 3600);

/// Candles fetched per symbol; covers the longest indicator window with
/// room for the volatility lookback.
pub const KLINE_LIMIT: u32 = 100;
pub const KLINE_INTERVAL: &str = "1m";

/// A cached value plus whether it was served past its TTL because the
/// refresh failed.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub stale: bool,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<(T, Instant)>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

/// TTL cache with single-flight refresh.
///
/// Each key owns an async mutex; a refresh holds it for the duration of
/// the fetch, so N concurrent gets against one expired key perform exactly
/// one underlying fetch and the rest reuse the result. A failed refresh
/// falls back to the previous value (marked stale) when one exists.
pub struct TtlCache<T> {
    ttl: Duration,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Slot<T>>>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_with<F, Fut>(&self, key: &str, fetch: F) -> Result<Cached<T>, ExchangeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key.to_string()).or_default().clone()
        };

        let mut guard = slot.lock().await;

        if let Some((value, fetched_at)) = &guard.value {
            if fetched_at.elapsed() < self.ttl {
                return Ok(Cached {
                    value: value.clone(),
                    stale: false,
                });
            }
        }

        match fetch().await {
            Ok(value) => {
                guard.value = Some((value.clone(), Instant::now()));
                Ok(Cached {
                    value,
                    stale: false,
                })
            }
            Err(e) => match &guard.value {
                Some((value, _)) => {
                    tracing::warn!("Refresh of {} failed ({}), serving stale value", key, e);
                    Ok(Cached {
                        value: value.clone(),
                        stale: true,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Drop a key so the next get refetches.
    pub fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(key);
    }
}

/// Read-through cache in front of the exchange, one TTL per data kind.
/// All market reads in the bot go through here; only order placement
/// talks to the client directly.
pub struct MarketDataCache<C> {
    client: Arc<C>,
    tickers: TtlCache<Vec<Ticker24h>>,
    klines: TtlCache<Vec<Candle>>,
    balances: TtlCache<Vec<AssetBalance>>,
    rules: TtlCache<SymbolRules>,
}

impl<C: ExchangeApi> MarketDataCache<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            tickers: TtlCache::new(TICKERS_TTL),
            klines: TtlCache::new(KLINES_TTL),
            balances: TtlCache::new(BALANCES_TTL),
            rules: TtlCache::new(RULES_TTL),
        }
    }

    pub async fn tickers(&self) -> Result<Cached<Vec<Ticker24h>>, ExchangeError> {
        self.tickers
            .get_with("all", || self.client.all_tickers())
            .await
    }

    pub async fn klines(&self, symbol: &str) -> Result<Cached<Vec<Candle>>, ExchangeError> {
        self.klines
            .get_with(symbol, || {
                self.client.klines(symbol, KLINE_INTERVAL, KLINE_LIMIT)
            })
            .await
    }

    pub async fn balances(&self) -> Result<Cached<Vec<AssetBalance>>, ExchangeError> {
        self.balances
            .get_with("account", || self.client.balances())
            .await
    }

    /// Free balance of one asset; absent from the account means zero.
    pub async fn free_balance(&self, asset: &str) -> Result<Cached<f64>, ExchangeError> {
        let balances = self.balances().await?;
        let free = balances
            .value
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(0.0);
        Ok(Cached {
            value: free,
            stale: balances.stale,
        })
    }

    pub async fn symbol_rules(&self, symbol: &str) -> Result<Cached<SymbolRules>, ExchangeError> {
        self.rules
            .get_with(symbol, || self.client.symbol_rules(symbol))
            .await
    }

    /// Balances change the moment an order fills; force the next read to
    /// hit the exchange.
    pub fn invalidate_balances(&self) {
        self.balances.invalidate("account");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fresh_value_served_from_cache() {
        let cache: TtlCache<u64> = TtlCache::new(Duration::from_secs(60));
        let fetches = AtomicUsize::new(0);

        for _ in 0..5 {
            let cached = cache
                .get_with("k", || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(42u64)
                })
                .await
                .unwrap();
            assert_eq!(cached.value, 42);
            assert!(!cached.stale);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_value_refetched() {
        let cache: TtlCache<u64> = TtlCache::new(Duration::ZERO);
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            cache
                .get_with("k", || async {
                    Ok(fetches.fetch_add(1, Ordering::SeqCst) as u64)
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_flight_under_contention() {
        let cache: Arc<TtlCache<u64>> = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let fetches = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let fetches = fetches.clone();
                tokio::spawn(async move {
                    cache
                        .get_with("k", || async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            // Hold the slot long enough for every task to pile up
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(7u64)
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().value, 7);
        }

        // Sixteen concurrent gets, one underlying fetch
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_value_served_on_fetch_failure() {
        let cache: TtlCache<u64> = TtlCache::new(Duration::ZERO);

        cache.get_with("k", || async { Ok(9u64) }).await.unwrap();

        let cached = cache
            .get_with("k", || async {
                Err(ExchangeError::Transient("down".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(cached.value, 9);
        assert!(cached.stale);
    }

    #[tokio::test]
    async fn test_error_propagates_without_prior_value() {
        let cache: TtlCache<u64> = TtlCache::new(Duration::from_secs(60));

        let result = cache
            .get_with("k", || async {
                Err(ExchangeError::Transient("down".to_string()))
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let cache: TtlCache<u64> = TtlCache::new(Duration::from_secs(60));
        let fetches = AtomicUsize::new(0);

        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(1u64)
        };

        cache.get_with("k", fetch).await.unwrap();
        cache.invalidate("k");
        cache.get_with("k", fetch).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
