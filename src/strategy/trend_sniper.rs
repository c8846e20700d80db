use crate::config::BotConfig;
use crate::models::{MarketSnapshot, Signal, SignalDirection};

/// Trend-following entries on a fully stacked EMA set (short > medium >
/// long) with volume running above its recent average; exits as soon as
/// the short EMA drops back under the medium.
#[derive(Debug, Clone)]
pub struct TrendSniper;

impl TrendSniper {
    pub fn new(_config: &BotConfig) -> Self {
        Self
    }

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Signal {
        let (ema_short, ema_medium, ema_long) =
            match (snapshot.ema_short, snapshot.ema_medium, snapshot.ema_long) {
                (Some(s), Some(m), Some(l)) => (s, m, l),
                _ => {
                    return Signal::hold(
                        &snapshot.symbol,
                        "trend_sniper",
                        "indicators not yet evaluable",
                    )
                }
            };

        if ema_short < ema_medium {
            return Signal::new(
                &snapshot.symbol,
                SignalDirection::Sell,
                "trend_sniper",
                &format!("trend broke: EMA {:.4} < {:.4}", ema_short, ema_medium),
            );
        }

        let stacked = ema_short > ema_medium && ema_medium > ema_long;

        let volume_confirms = match (snapshot.candles.last(), snapshot.avg_volume) {
            (Some(candle), Some(avg)) => candle.volume > avg,
            _ => false,
        };

        if stacked && volume_confirms {
            return Signal::new(
                &snapshot.symbol,
                SignalDirection::Buy,
                "trend_sniper",
                &format!(
                    "EMAs stacked {:.4} > {:.4} > {:.4} with volume confirmation",
                    ema_short, ema_medium, ema_long
                ),
            );
        }

        Signal::hold(&snapshot.symbol, "trend_sniper", "no confirmed trend")
    }
}
