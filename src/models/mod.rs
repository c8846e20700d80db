use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A coin actively monitored by the bot.
///
/// `tradable = false` marks a coin that was dropped by the selector while
/// a position was still open: it stays monitored for exits only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coin {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub min_notional: f64,
    pub step_size: f64,
    pub tradable: bool,
}

/// OHLCV candlestick. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candles plus the indicators computed over them, for one coin.
///
/// Indicator fields are `None` until enough candles have accumulated.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub last_price: f64,
    pub rsi: Option<f64>,
    pub ema_short: Option<f64>,
    pub ema_medium: Option<f64>,
    pub ema_long: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub volatility: Option<f64>,
    pub avg_volume: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

/// Strategy output for one coin in one evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub strategy: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(symbol: &str, direction: SignalDirection, strategy: &str, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction,
            strategy: strategy.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn hold(symbol: &str, strategy: &str, reason: &str) -> Self {
        Self::new(symbol, SignalDirection::Hold, strategy, reason)
    }
}

/// Lifecycle of a position. Transitions only move forward:
/// Open → TrailingArmed → Closing → Closed, with TrailingArmed optional.
/// The one sanctioned step back is a rejected exit order, Closing →
/// previous state, handled by PositionManager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    TrailingArmed,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    StrategySell,
    ForceSell,
    Reconciliation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub target_price: f64,
    pub stop_price: f64,
    /// Stop as computed at entry, before any trailing advancement.
    pub initial_stop: f64,
    /// High-water mark since entry.
    pub highest_price: f64,
    pub high_volatility: bool,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub realized_pnl_pct: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub exit_attempts: u32,
    /// Set after repeated exit rejections; surfaced in status, never retried.
    pub needs_review: bool,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status != PositionStatus::Closed
    }

    pub fn unrealized_pnl_pct(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) / self.entry_price * 100.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    Entry,
    TakeProfit,
    StopLoss,
    TrailingStop,
    ForceSell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// A single order submitted to (or about to be submitted to) the exchange.
///
/// `client_order_id` is generated before submission, so a retried placement
/// is recognized server-side as a duplicate instead of double-filling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub position_id: Uuid,
    pub symbol: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub client_order_id: String,
    pub exchange_order_id: Option<u64>,
    pub quantity: f64,
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
}
