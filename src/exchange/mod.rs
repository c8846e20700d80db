pub mod cache;
pub mod client;
pub mod types;

pub use cache::{Cached, MarketDataCache, TtlCache};
pub use client::ExchangeClient;
pub use types::{AssetBalance, OrderAck, OrderSide, SymbolRules, Ticker24h};

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::models::Candle;

/// Surface of the exchange the rest of the bot sees. `ExchangeClient` is
/// the production implementation; tests substitute scripted ones.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// 24h rolling stats for every listed symbol.
    async fn all_tickers(&self) -> Result<Vec<Ticker24h>, ExchangeError>;

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn balances(&self) -> Result<Vec<AssetBalance>, ExchangeError>;

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError>;

    /// Market order placement. `client_order_id` makes a retried placement
    /// deduplicate server-side instead of filling twice.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError>;
}
