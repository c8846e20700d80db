pub mod scalping;
pub mod trend_sniper;

pub use scalping::Scalping;
pub use trend_sniper::TrendSniper;

use std::str::FromStr;

use crate::config::BotConfig;
use crate::models::{MarketSnapshot, Signal};

/// Which strategy variant a run is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Scalping,
    TrendSniper,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "scalping" => Ok(StrategyKind::Scalping),
            "sniper" | "trend_sniper" | "trendsniper" => Ok(StrategyKind::TrendSniper),
            other => Err(format!(
                "unknown strategy {:?} (expected \"scalping\" or \"sniper\")",
                other
            )),
        }
    }
}

/// Closed set of strategy variants, chosen once at startup. Adding a
/// strategy means adding a variant and a match arm here.
///
/// Every variant is stateless between evaluations: signal generation is a
/// pure function of the snapshot.
#[derive(Debug, Clone)]
pub enum Strategy {
    Scalping(Scalping),
    TrendSniper(TrendSniper),
}

impl Strategy {
    pub fn from_config(config: &BotConfig) -> Self {
        match config.strategy {
            StrategyKind::Scalping => Strategy::Scalping(Scalping::new(config)),
            StrategyKind::TrendSniper => Strategy::TrendSniper(TrendSniper::new(config)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Scalping(_) => "scalping",
            Strategy::TrendSniper(_) => "trend_sniper",
        }
    }

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Signal {
        match self {
            Strategy::Scalping(s) => s.evaluate(snapshot),
            Strategy::TrendSniper(s) => s.evaluate(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("scalping".parse(), Ok(StrategyKind::Scalping));
        assert_eq!("Sniper".parse(), Ok(StrategyKind::TrendSniper));
        assert_eq!("trend_sniper".parse(), Ok(StrategyKind::TrendSniper));
        assert!("grid".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_selection_from_config() {
        let config = BotConfig::from_lookup(|key| match key {
            "EXCHANGE_API_KEY" => Some("k".to_string()),
            "STRATEGY" => Some("sniper".to_string()),
            _ => None,
        })
        .unwrap();

        let strategy = Strategy::from_config(&config);
        assert_eq!(strategy.name(), "trend_sniper");
    }
}
