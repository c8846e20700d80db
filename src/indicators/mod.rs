pub mod bollinger;
pub mod moving_average;
pub mod rsi;
pub mod volatility;

pub use bollinger::calculate_bollinger;
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;
pub use volatility::calculate_volatility;

use chrono::Utc;

use crate::config::BotConfig;
use crate::models::{Candle, MarketSnapshot};

/// Compute every configured indicator over a candle series.
///
/// Returns None only for an empty series; individual indicators that lack
/// data stay None inside the snapshot, and strategies treat those as
/// not-yet-evaluable.
pub fn build_snapshot(
    config: &BotConfig,
    symbol: &str,
    candles: Vec<Candle>,
) -> Option<MarketSnapshot> {
    let last_price = candles.last()?.close;

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let bands = calculate_bollinger(&closes, config.bb_period, config.bb_std_dev);

    // Average volume over the candles preceding the current one, so the
    // current candle's volume can be compared against it.
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let avg_volume = calculate_sma(&volumes[..volumes.len() - 1], config.volume_period);

    Some(MarketSnapshot {
        symbol: symbol.to_string(),
        last_price,
        rsi: calculate_rsi(&closes, config.rsi_period),
        ema_short: calculate_ema(&closes, config.ema_short),
        ema_medium: calculate_ema(&closes, config.ema_medium),
        ema_long: calculate_ema(&closes, config.ema_long),
        bb_upper: bands.map(|(upper, _, _)| upper),
        bb_lower: bands.map(|(_, _, lower)| lower),
        volatility: calculate_volatility(&closes),
        avg_volume,
        fetched_at: Utc::now(),
        candles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BotConfig {
        BotConfig::from_lookup(|key| match key {
            "EXCHANGE_API_KEY" => Some("test-key".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: Utc::now() - chrono::Duration::minutes((closes.len() - i) as i64),
                open: close,
                high: close * 1.001,
                low: close * 0.999,
                close,
                volume: 1000.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn test_snapshot_with_full_history() {
        let config = test_config();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let snapshot = build_snapshot(&config, "BTCUSDT", candles_from_closes(&closes)).unwrap();

        assert_eq!(snapshot.symbol, "BTCUSDT");
        assert!(snapshot.rsi.is_some());
        assert!(snapshot.ema_short.is_some());
        assert!(snapshot.ema_long.is_some());
        assert!(snapshot.bb_upper.is_some());
        assert!(snapshot.volatility.is_some());
        assert!(snapshot.avg_volume.is_some());
        assert_eq!(snapshot.last_price, *closes.last().unwrap());
    }

    #[test]
    fn test_snapshot_with_short_history_leaves_gaps() {
        let config = test_config();
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let snapshot = build_snapshot(&config, "ETHUSDT", candles_from_closes(&closes)).unwrap();

        // 10 candles: short EMA resolves, long EMA (50) and BB (20) do not
        assert!(snapshot.ema_short.is_some());
        assert!(snapshot.ema_long.is_none());
        assert!(snapshot.bb_upper.is_none());
        assert!(snapshot.volatility.is_none());
    }

    #[test]
    fn test_snapshot_empty_series() {
        let config = test_config();
        assert!(build_snapshot(&config, "BTCUSDT", Vec::new()).is_none());
    }
}
