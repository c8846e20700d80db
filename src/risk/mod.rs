use crate::config::BotConfig;
use crate::models::{Position, PositionStatus};

/// Target/stop pair chosen at entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub target_price: f64,
    pub stop_price: f64,
    pub high_volatility: bool,
}

/// Computes per-position risk levels and drives the trailing stop.
///
/// After a position's trailing stop arms, `update_trailing` is the only
/// writer of its stop price, and the stop never moves down.
#[derive(Debug, Clone)]
pub struct RiskManager {
    profit_target: f64,
    stop_loss: f64,
    high_vol_profit_target: f64,
    high_vol_stop_loss: f64,
    high_volatility_threshold: f64,
    trailing_enabled: bool,
    trailing_activation: f64,
    trailing_distance: f64,
}

impl RiskManager {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            profit_target: config.profit_target,
            stop_loss: config.stop_loss,
            high_vol_profit_target: config.high_vol_profit_target,
            high_vol_stop_loss: config.high_vol_stop_loss,
            high_volatility_threshold: config.high_volatility_threshold,
            trailing_enabled: config.trailing_stop,
            trailing_activation: config.trailing_stop_activation,
            trailing_distance: config.trailing_stop_distance,
        }
    }

    /// Pick target and stop for a new entry. A measured volatility above
    /// the threshold selects the wider high-volatility pair; an unknown
    /// volatility is treated as normal.
    pub fn initial_levels(&self, entry_price: f64, volatility: Option<f64>) -> RiskLevels {
        let high_volatility =
            volatility.is_some_and(|v| v > self.high_volatility_threshold);

        let (target_pct, stop_pct) = if high_volatility {
            (self.high_vol_profit_target, self.high_vol_stop_loss)
        } else {
            (self.profit_target, self.stop_loss)
        };

        RiskLevels {
            target_price: entry_price * (1.0 + target_pct),
            stop_price: entry_price * (1.0 - stop_pct),
            high_volatility,
        }
    }

    /// Advance the high-water mark and, once armed, ratchet the stop up.
    /// Returns the new stop when it moved.
    ///
    /// Arming requires unrealized gain to cover `trailing_activation` of
    /// the entry-to-target distance.
    pub fn update_trailing(&self, position: &mut Position, current_price: f64) -> Option<f64> {
        if !self.trailing_enabled || !position.is_open() {
            return None;
        }

        if current_price > position.highest_price {
            position.highest_price = current_price;
        }

        if position.status == PositionStatus::Open {
            let distance_to_target = position.target_price - position.entry_price;
            let progress = current_price - position.entry_price;
            if distance_to_target <= 0.0
                || progress < self.trailing_activation * distance_to_target
            {
                return None;
            }
            position.status = PositionStatus::TrailingArmed;
            tracing::info!(
                "🎯 {} trailing stop armed at {:.4} (entry {:.4})",
                position.symbol,
                current_price,
                position.entry_price
            );
        }

        if position.status != PositionStatus::TrailingArmed {
            return None;
        }

        let candidate = position.highest_price * (1.0 - self.trailing_distance);
        if candidate > position.stop_price {
            position.stop_price = candidate;
            return Some(candidate);
        }

        None
    }
}
