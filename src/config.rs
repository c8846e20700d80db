use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::exchange::cache::KLINE_LIMIT;
use crate::strategy::StrategyKind;

/// Runtime configuration, loaded once at startup from environment
/// variables (`.env` supported via dotenvy in main).
///
/// Percent-style variables (PROFIT_TARGET, STOP_LOSS, TRADING_AMOUNT_PERCENT,
/// TRAILING_STOP_DISTANCE, FEE_PERCENTAGE) are given in percent in the
/// environment and stored here as fractions.
#[derive(Debug, Clone)]
pub struct BotConfig {
    // Exchange access
    pub api_key: String,
    pub api_url: String,

    // Coin selection
    pub quote_asset: String,
    pub max_active_coins: usize,
    pub min_volume_24h: f64,
    pub min_market_cap: f64,
    pub include_coins: Vec<String>,
    pub exclude_coins: Vec<String>,
    pub uptrend_required: bool,

    // Order sizing
    pub trading_amount_percent: f64,
    pub max_orders_per_coin: usize,
    pub min_balance_required: f64,
    pub fee_percentage: f64,

    // Risk levels
    pub profit_target: f64,
    pub stop_loss: f64,
    pub high_vol_profit_target: f64,
    pub high_vol_stop_loss: f64,
    pub high_volatility_threshold: f64,
    pub trailing_stop: bool,
    pub trailing_stop_activation: f64,
    pub trailing_stop_distance: f64,

    // Indicators
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub ema_short: usize,
    pub ema_medium: usize,
    pub ema_long: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub volume_period: usize,

    // Strategy + scheduling
    pub strategy: StrategyKind,
    pub refresh_interval: Duration,
    pub coin_selection_interval: Duration,

    // Journal output
    pub log_dir: PathBuf,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` goes through here;
    /// tests supply a map instead of mutating process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("EXCHANGE_API_KEY").ok_or(ConfigError::Missing("EXCHANGE_API_KEY"))?;
        let api_url = lookup("EXCHANGE_API_URL")
            .unwrap_or_else(|| "https://api.binance.com".to_string());

        let strategy = match lookup("STRATEGY").as_deref() {
            None => StrategyKind::Scalping,
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "STRATEGY",
                reason,
            })?,
        };

        let config = Self {
            api_key,
            api_url,
            quote_asset: lookup("QUOTE_ASSET").unwrap_or_else(|| "USDT".to_string()),
            max_active_coins: parse_or("MAX_ACTIVE_COINS", &lookup, 5)?,
            min_volume_24h: parse_or("MIN_VOLUME_24H", &lookup, 10_000_000.0)?,
            min_market_cap: parse_or("MIN_MARKET_CAP", &lookup, 100_000_000.0)?,
            include_coins: parse_list(lookup("INCLUDE_COINS").as_deref().unwrap_or("BTC,ETH")),
            exclude_coins: parse_list(lookup("EXCLUDE_COINS").as_deref().unwrap_or("")),
            uptrend_required: parse_or("UPTREND_REQUIRED", &lookup, true)?,
            trading_amount_percent: pct("TRADING_AMOUNT_PERCENT", &lookup, 1.0)?,
            max_orders_per_coin: parse_or("MAX_ORDERS_PER_COIN", &lookup, 3)?,
            min_balance_required: parse_or("MIN_BALANCE_REQUIRED", &lookup, 10.0)?,
            fee_percentage: pct("FEE_PERCENTAGE", &lookup, 0.1)?,
            profit_target: pct("PROFIT_TARGET", &lookup, 1.2)?,
            stop_loss: pct("STOP_LOSS", &lookup, 1.0)?,
            high_vol_profit_target: pct("HIGH_VOL_PROFIT_TARGET", &lookup, 1.8)?,
            high_vol_stop_loss: pct("HIGH_VOL_STOP_LOSS", &lookup, 1.5)?,
            high_volatility_threshold: parse_or("HIGH_VOLATILITY_THRESHOLD", &lookup, 2.0)?,
            trailing_stop: parse_or("TRAILING_STOP", &lookup, true)?,
            trailing_stop_activation: parse_or("TRAILING_STOP_ACTIVATION", &lookup, 0.40)?,
            trailing_stop_distance: pct("TRAILING_STOP_DISTANCE", &lookup, 0.25)?,
            rsi_period: parse_or("RSI_PERIOD", &lookup, 14)?,
            rsi_overbought: parse_or("RSI_OVERBOUGHT", &lookup, 70.0)?,
            rsi_oversold: parse_or("RSI_OVERSOLD", &lookup, 30.0)?,
            ema_short: parse_or("EMA_SHORT", &lookup, 9)?,
            ema_medium: parse_or("EMA_MEDIUM", &lookup, 21)?,
            ema_long: parse_or("EMA_LONG", &lookup, 50)?,
            bb_period: parse_or("BB_PERIOD", &lookup, 20)?,
            bb_std_dev: parse_or("BB_STD_DEV", &lookup, 2.0)?,
            volume_period: parse_or("VOLUME_PERIOD", &lookup, 3)?,
            strategy,
            refresh_interval: Duration::from_secs(parse_or("REFRESH_INTERVAL", &lookup, 5u64)?),
            coin_selection_interval: Duration::from_secs(
                parse_or("COIN_SELECTION_INTERVAL", &lookup, 60u64)? * 60,
            ),
            log_dir: PathBuf::from(lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_active_coins == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_ACTIVE_COINS",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.trading_amount_percent) {
            return Err(ConfigError::Invalid {
                var: "TRADING_AMOUNT_PERCENT",
                reason: format!("{} is outside 0-100%", self.trading_amount_percent * 100.0),
            });
        }
        if !(0.0..=1.0).contains(&self.trailing_stop_activation) {
            return Err(ConfigError::Invalid {
                var: "TRAILING_STOP_ACTIVATION",
                reason: format!("{} is not a fraction in 0-1", self.trailing_stop_activation),
            });
        }
        if self.stop_loss <= 0.0 || self.profit_target <= 0.0 {
            return Err(ConfigError::Invalid {
                var: "PROFIT_TARGET",
                reason: "profit target and stop loss must be positive".to_string(),
            });
        }
        if self.ema_short >= self.ema_medium || self.ema_medium >= self.ema_long {
            return Err(ConfigError::Invalid {
                var: "EMA_SHORT",
                reason: format!(
                    "EMA periods must be strictly increasing, got {}/{}/{}",
                    self.ema_short, self.ema_medium, self.ema_long
                ),
            });
        }
        if self.min_candles_required() > KLINE_LIMIT as usize {
            return Err(ConfigError::Invalid {
                var: "EMA_LONG",
                reason: format!(
                    "indicators need {} candles to warm up but each refresh fetches {}",
                    self.min_candles_required(),
                    KLINE_LIMIT
                ),
            });
        }
        Ok(())
    }

    /// Candles needed before every indicator in the snapshot resolves.
    pub fn min_candles_required(&self) -> usize {
        self.ema_long.max(self.bb_period).max(self.rsi_period + 1) + 5
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T, F>(var: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("{:?}: {}", raw, e),
        }),
    }
}

/// Percent-style variable: read as percent, store as fraction.
fn pct<F>(var: &'static str, lookup: &F, default_pct: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_or(var, lookup, default_pct)?;
    if value < 0.0 {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("{} must not be negative", value),
        });
    }
    Ok(value / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_lookup(env(&[("EXCHANGE_API_KEY", "k")])).unwrap();

        assert_eq!(config.quote_asset, "USDT");
        assert_eq!(config.max_active_coins, 5);
        assert_eq!(config.include_coins, vec!["BTC", "ETH"]);
        assert!(config.exclude_coins.is_empty());
        assert_eq!(config.profit_target, 0.012);
        assert_eq!(config.stop_loss, 0.010);
        assert_eq!(config.trading_amount_percent, 0.01);
        assert_eq!(config.trailing_stop_distance, 0.0025);
        assert_eq!(config.trailing_stop_activation, 0.40);
        assert_eq!(config.strategy, StrategyKind::Scalping);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.coin_selection_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let result = BotConfig::from_lookup(env(&[]));
        assert!(matches!(result, Err(ConfigError::Missing("EXCHANGE_API_KEY"))));
    }

    #[test]
    fn test_percent_conversion() {
        let config = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("PROFIT_TARGET", "2.5"),
            ("STOP_LOSS", "1.5"),
        ]))
        .unwrap();

        assert_eq!(config.profit_target, 0.025);
        assert_eq!(config.stop_loss, 0.015);
    }

    #[test]
    fn test_invalid_number_is_fatal() {
        let result = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("MAX_ACTIVE_COINS", "five"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                var: "MAX_ACTIVE_COINS",
                ..
            })
        ));
    }

    #[test]
    fn test_strategy_parsing() {
        let config = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("STRATEGY", "sniper"),
        ]))
        .unwrap();
        assert_eq!(config.strategy, StrategyKind::TrendSniper);

        let result = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("STRATEGY", "martingale"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_ema_ordering_validated() {
        let result = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("EMA_SHORT", "50"),
            ("EMA_MEDIUM", "21"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_indicator_windows_capped_by_fetch_limit() {
        // EMA_LONG=200 needs more warmup candles than one refresh fetches
        let result = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("EMA_LONG", "200"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                var: "EMA_LONG",
                ..
            })
        ));
    }

    #[test]
    fn test_include_list_normalized() {
        let config = BotConfig::from_lookup(env(&[
            ("EXCHANGE_API_KEY", "k"),
            ("INCLUDE_COINS", " btc, sol ,"),
        ]))
        .unwrap();
        assert_eq!(config.include_coins, vec!["BTC", "SOL"]);
    }
}
