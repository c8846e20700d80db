use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::ExchangeError;
use crate::models::Candle;

/// The exchange serializes most decimals as JSON strings.
fn f64_from_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// 24-hour rolling ticker statistics for one symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    #[serde(deserialize_with = "f64_from_str")]
    pub last_price: f64,
    #[serde(deserialize_with = "f64_from_str")]
    pub price_change_percent: f64,
    #[serde(deserialize_with = "f64_from_str")]
    pub quote_volume: f64,
}

/// Raw kline row: the exchange returns each candle as a mixed-type array.
/// [open_time, open, high, low, close, volume, close_time, quote_volume,
///  trades, taker_base, taker_quote, unused]
pub type RawKline = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

pub fn candle_from_raw(raw: &RawKline) -> Result<Candle, ExchangeError> {
    let parse = |field: &str, value: &str| {
        value.parse::<f64>().map_err(|e| {
            ExchangeError::Transient(format!("malformed kline {} {:?}: {}", field, value, e))
        })
    };

    let timestamp: DateTime<Utc> = Utc
        .timestamp_millis_opt(raw.0)
        .single()
        .ok_or_else(|| ExchangeError::Transient(format!("bad kline timestamp {}", raw.0)))?;

    Ok(Candle {
        timestamp,
        open: parse("open", &raw.1)?,
        high: parse("high", &raw.2)?,
        low: parse("low", &raw.3)?,
        close: parse("close", &raw.4)?,
        volume: parse("volume", &raw.5)?,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    #[serde(deserialize_with = "f64_from_str")]
    pub free: f64,
    #[serde(deserialize_with = "f64_from_str")]
    pub locked: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Trading filters attached to a symbol. Only the ones order sizing needs
/// are modeled; everything else falls through to `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        #[serde(deserialize_with = "f64_from_str")]
        step_size: f64,
    },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional {
        #[serde(deserialize_with = "f64_from_str")]
        min_notional: f64,
    },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional {
        #[serde(deserialize_with = "f64_from_str")]
        min_notional: f64,
    },
    #[serde(other)]
    Other,
}

/// The subset of a symbol's filters that order sizing uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolRules {
    pub min_notional: f64,
    pub step_size: f64,
}

impl SymbolInfo {
    pub fn rules(&self) -> SymbolRules {
        let mut rules = SymbolRules {
            min_notional: 0.0,
            step_size: 0.0,
        };
        for filter in &self.filters {
            match filter {
                SymbolFilter::LotSize { step_size } => rules.step_size = *step_size,
                SymbolFilter::Notional { min_notional }
                | SymbolFilter::MinNotional { min_notional } => {
                    rules.min_notional = *min_notional
                }
                SymbolFilter::Other => {}
            }
        }
        rules
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub status: String,
    #[serde(deserialize_with = "f64_from_str")]
    pub executed_qty: f64,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    #[serde(deserialize_with = "f64_from_str")]
    pub price: f64,
    #[serde(deserialize_with = "f64_from_str")]
    pub qty: f64,
}

impl OrderAck {
    /// Whether the order actually executed. An ack with status `EXPIRED`
    /// or `NEW` and nothing executed is not a fill.
    pub fn is_filled(&self) -> bool {
        self.executed_qty > 0.0
    }

    /// Quantity-weighted average fill price, when fills were reported.
    pub fn avg_fill_price(&self) -> Option<f64> {
        let total_qty: f64 = self.fills.iter().map(|f| f.qty).sum();
        if total_qty == 0.0 {
            return None;
        }
        let notional: f64 = self.fills.iter().map(|f| f.price * f.qty).sum();
        Some(notional / total_qty)
    }
}

/// Error payload the exchange attaches to 4xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
