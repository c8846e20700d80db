use crate::config::BotConfig;
use crate::models::{MarketSnapshot, Signal, SignalDirection};

/// How far above the lower Bollinger band still counts as "near" it.
const LOWER_BAND_TOLERANCE: f64 = 1.005;

/// Mean-reversion entries at the lower Bollinger band, confirmed by RSI
/// and short-over-medium EMA momentum; exits on overbought RSI or a touch
/// of the upper band.
#[derive(Debug, Clone)]
pub struct Scalping {
    rsi_oversold: f64,
    rsi_overbought: f64,
}

impl Scalping {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            rsi_oversold: config.rsi_oversold,
            rsi_overbought: config.rsi_overbought,
        }
    }

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Signal {
        let (rsi, ema_short, ema_medium, bb_upper, bb_lower) = match (
            snapshot.rsi,
            snapshot.ema_short,
            snapshot.ema_medium,
            snapshot.bb_upper,
            snapshot.bb_lower,
        ) {
            (Some(r), Some(es), Some(em), Some(bu), Some(bl)) => (r, es, em, bu, bl),
            _ => {
                return Signal::hold(
                    &snapshot.symbol,
                    "scalping",
                    "indicators not yet evaluable",
                )
            }
        };

        let price = snapshot.last_price;

        if rsi > self.rsi_overbought || price >= bb_upper {
            return Signal::new(
                &snapshot.symbol,
                SignalDirection::Sell,
                "scalping",
                &format!("RSI {:.1} / price {:.4} at upper band {:.4}", rsi, price, bb_upper),
            );
        }

        let oversold = rsi < self.rsi_oversold;
        let momentum_up = ema_short > ema_medium;
        let at_lower_band = price <= bb_lower * LOWER_BAND_TOLERANCE;

        if oversold && momentum_up && at_lower_band {
            return Signal::new(
                &snapshot.symbol,
                SignalDirection::Buy,
                "scalping",
                &format!("RSI {:.1} oversold at lower band {:.4}", rsi, bb_lower),
            );
        }

        Signal::hold(&snapshot.symbol, "scalping", "no edge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(
        price: f64,
        rsi: f64,
        ema_short: f64,
        ema_medium: f64,
        bb_lower: f64,
        bb_upper: f64,
    ) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTCUSDT".to_string(),
            candles: Vec::new(),
            last_price: price,
            rsi: Some(rsi),
            ema_short: Some(ema_short),
            ema_medium: Some(ema_medium),
            ema_long: Some(ema_medium * 0.99),
            bb_upper: Some(bb_upper),
            bb_lower: Some(bb_lower),
            volatility: Some(1.0),
            avg_volume: Some(1000.0),
            fetched_at: Utc::now(),
        }
    }

    fn strategy() -> Scalping {
        let config = crate::config::BotConfig::from_lookup(|key| match key {
            "EXCHANGE_API_KEY" => Some("k".to_string()),
            _ => None,
        })
        .unwrap();
        Scalping::new(&config)
    }

    #[test]
    fn test_buy_at_lower_band_when_oversold() {
        // RSI 25, short EMA above medium, price touching the lower band
        let signal = strategy().evaluate(&snapshot(95.0, 25.0, 100.5, 100.0, 95.2, 105.0));
        assert_eq!(signal.direction, SignalDirection::Buy);
    }

    #[test]
    fn test_no_buy_without_momentum() {
        // Same setup but short EMA below medium
        let signal = strategy().evaluate(&snapshot(95.0, 25.0, 99.5, 100.0, 95.2, 105.0));
        assert_eq!(signal.direction, SignalDirection::Hold);
    }

    #[test]
    fn test_no_buy_away_from_band() {
        let signal = strategy().evaluate(&snapshot(100.0, 25.0, 100.5, 100.0, 95.0, 105.0));
        assert_eq!(signal.direction, SignalDirection::Hold);
    }

    #[test]
    fn test_sell_when_overbought() {
        let signal = strategy().evaluate(&snapshot(102.0, 75.0, 101.0, 100.0, 95.0, 105.0));
        assert_eq!(signal.direction, SignalDirection::Sell);
    }

    #[test]
    fn test_sell_at_upper_band() {
        let signal = strategy().evaluate(&snapshot(105.5, 60.0, 101.0, 100.0, 95.0, 105.0));
        assert_eq!(signal.direction, SignalDirection::Sell);
    }

    #[test]
    fn test_hold_when_indicators_missing() {
        let mut snap = snapshot(100.0, 25.0, 100.5, 100.0, 95.0, 105.0);
        snap.bb_lower = None;
        let signal = strategy().evaluate(&snap);
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.reason.contains("not yet evaluable"));
    }
}
