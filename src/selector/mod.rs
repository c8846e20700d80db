use std::collections::HashSet;

use crate::config::BotConfig;
use crate::exchange::Ticker24h;

/// Quote-pegged assets that never make sense as trading candidates
/// against a stable quote asset.
const STABLECOINS: &[&str] = &[
    "USDT", "USDC", "BUSD", "DAI", "TUSD", "FDUSD", "USDP", "PAX", "UST",
];

/// Per-symbol stats the selector ranks on. Market cap is optional because
/// the ticker endpoint does not carry it; the filter applies when known.
#[derive(Debug, Clone)]
pub struct CandidateStats {
    pub symbol: String,
    pub base_asset: String,
    pub last_price: f64,
    pub quote_volume: f64,
    pub price_change_pct: f64,
    pub market_cap: Option<f64>,
}

impl CandidateStats {
    /// Build from a ticker, if the symbol trades against `quote_asset`.
    pub fn from_ticker(ticker: &Ticker24h, quote_asset: &str) -> Option<Self> {
        let base_asset = ticker.symbol.strip_suffix(quote_asset)?;
        if base_asset.is_empty() {
            return None;
        }
        Some(Self {
            symbol: ticker.symbol.clone(),
            base_asset: base_asset.to_string(),
            last_price: ticker.last_price,
            quote_volume: ticker.quote_volume,
            price_change_pct: ticker.price_change_percent,
            market_cap: None,
        })
    }
}

/// A coin picked for the next cycle. `tradable = false` means the coin
/// only remains because a position is still open in it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCoin {
    pub symbol: String,
    pub base_asset: String,
    pub tradable: bool,
}

/// Ranks candidate coins by combined volume and movement score and keeps
/// the monitored set within `MAX_ACTIVE_COINS`.
///
/// Coins dropped from the ranking while a position is open in them are
/// retained exit-only rather than force-sold.
#[derive(Debug, Clone)]
pub struct CoinSelector {
    max_active_coins: usize,
    min_volume_24h: f64,
    min_market_cap: f64,
    include_coins: Vec<String>,
    exclude_coins: Vec<String>,
    uptrend_required: bool,
}

impl CoinSelector {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            max_active_coins: config.max_active_coins,
            min_volume_24h: config.min_volume_24h,
            min_market_cap: config.min_market_cap,
            include_coins: config.include_coins.clone(),
            exclude_coins: config.exclude_coins.clone(),
            uptrend_required: config.uptrend_required,
        }
    }

    /// 0.6 weight on liquidity, 0.4 on 24h movement, each capped at 100.
    fn score(&self, stats: &CandidateStats) -> f64 {
        let volume_score = (stats.quote_volume / self.min_volume_24h * 10.0).min(100.0);
        let movement_score = (stats.price_change_pct.abs() * 2.0).min(100.0);
        0.6 * volume_score + 0.4 * movement_score
    }

    fn passes_filters(&self, stats: &CandidateStats) -> bool {
        if STABLECOINS.contains(&stats.base_asset.as_str()) {
            return false;
        }
        if self.exclude_coins.iter().any(|c| c == &stats.base_asset) {
            return false;
        }
        if stats.quote_volume < self.min_volume_24h {
            return false;
        }
        if let Some(market_cap) = stats.market_cap {
            if market_cap < self.min_market_cap {
                return false;
            }
        }
        if self.uptrend_required && stats.price_change_pct <= 0.0 {
            return false;
        }
        true
    }

    /// Pick the next monitored set. `held_symbols` are symbols with open
    /// positions; any of them not re-selected come back exit-only.
    pub fn select(
        &self,
        candidates: &[CandidateStats],
        held_symbols: &HashSet<String>,
    ) -> Vec<SelectedCoin> {
        let eligible: Vec<&CandidateStats> = candidates
            .iter()
            .filter(|stats| self.passes_filters(stats))
            .collect();

        let mut selected: Vec<SelectedCoin> = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();

        // Configured must-haves first, in configuration order
        for base in &self.include_coins {
            if selected.len() >= self.max_active_coins {
                break;
            }
            if let Some(stats) = eligible.iter().find(|s| &s.base_asset == base) {
                taken.insert(stats.symbol.clone());
                selected.push(SelectedCoin {
                    symbol: stats.symbol.clone(),
                    base_asset: stats.base_asset.clone(),
                    tradable: true,
                });
            }
        }

        // Fill the rest by descending score
        let mut ranked: Vec<(&CandidateStats, f64)> = eligible
            .iter()
            .filter(|s| !taken.contains(&s.symbol))
            .map(|s| (*s, self.score(s)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (stats, score) in ranked {
            if selected.len() >= self.max_active_coins {
                break;
            }
            tracing::debug!("Selector: {} scored {:.1}", stats.symbol, score);
            taken.insert(stats.symbol.clone());
            selected.push(SelectedCoin {
                symbol: stats.symbol.clone(),
                base_asset: stats.base_asset.clone(),
                tradable: true,
            });
        }

        // Held but no longer ranked: keep monitoring for exits only
        for symbol in held_symbols {
            if !taken.contains(symbol) {
                tracing::info!("Selector: {} dropped from ranking, kept exit-only", symbol);
                let base_asset = candidates
                    .iter()
                    .find(|s| &s.symbol == symbol)
                    .map(|s| s.base_asset.clone())
                    .unwrap_or_else(|| symbol.clone());
                selected.push(SelectedCoin {
                    symbol: symbol.clone(),
                    base_asset,
                    tradable: false,
                });
            }
        }

        selected
    }
}
