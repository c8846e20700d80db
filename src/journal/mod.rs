use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::models::Position;
use crate::position::PerformanceStats;

/// One line per closed trade in trades.log.
#[derive(Debug, Serialize)]
struct TradeRecord<'a> {
    timestamp: String,
    symbol: &'a str,
    entry_price: f64,
    exit_price: Option<f64>,
    quantity: f64,
    pnl_pct: Option<f64>,
    exit_reason: String,
}

/// Periodic rollup appended to performance.log.
#[derive(Debug, Serialize)]
struct PerformanceRecord {
    timestamp: String,
    trade_count: usize,
    win_rate: f64,
    total_pnl_pct: f64,
    open_positions: usize,
}

/// Append-only JSON-lines log of trades and performance rollups.
///
/// Best-effort by design: journaling failures are logged and swallowed by
/// the caller so a full disk never takes trading down with it.
pub struct TradeJournal {
    dir: PathBuf,
}

impl TradeJournal {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create journal directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn record_trade(&self, position: &Position) -> Result<()> {
        let record = TradeRecord {
            timestamp: Utc::now().to_rfc3339(),
            symbol: &position.symbol,
            entry_price: position.entry_price,
            exit_price: position.exit_price,
            quantity: position.quantity,
            pnl_pct: position.realized_pnl_pct,
            exit_reason: position
                .exit_reason
                .map(|r| format!("{:?}", r))
                .unwrap_or_default(),
        };
        self.append("trades.log", &record)
    }

    pub fn record_performance(&self, stats: &PerformanceStats, open_positions: usize) -> Result<()> {
        let record = PerformanceRecord {
            timestamp: Utc::now().to_rfc3339(),
            trade_count: stats.trade_count,
            win_rate: stats.win_rate,
            total_pnl_pct: stats.total_pnl_pct,
            open_positions,
        };
        self.append("performance.log", &record)
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let path = self.dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let line = serde_json::to_string(record).context("Failed to serialize journal record")?;
        writeln!(handle, "{}", line)
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExitReason, PositionStatus};
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("journal-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn closed_position() -> Position {
        Position {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            entry_price: 100.0,
            quantity: 1.5,
            target_price: 101.2,
            stop_price: 99.0,
            initial_stop: 99.0,
            highest_price: 101.2,
            high_volatility: false,
            status: PositionStatus::Closed,
            opened_at: Utc::now(),
            closed_at: Some(Utc::now()),
            exit_price: Some(101.2),
            realized_pnl_pct: Some(1.2),
            exit_reason: Some(ExitReason::TakeProfit),
            exit_attempts: 0,
            needs_review: false,
        }
    }

    #[test]
    fn test_trades_appended_as_json_lines() {
        let dir = temp_dir();
        let journal = TradeJournal::new(dir.clone()).unwrap();

        journal.record_trade(&closed_position()).unwrap();
        journal.record_trade(&closed_position()).unwrap();

        let contents = std::fs::read_to_string(dir.join("trades.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["symbol"], "BTCUSDT");
        assert_eq!(parsed["exit_reason"], "TakeProfit");
        assert_eq!(parsed["pnl_pct"], 1.2);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_performance_rollup_written() {
        let dir = temp_dir();
        let journal = TradeJournal::new(dir.clone()).unwrap();

        let stats = PerformanceStats {
            trade_count: 4,
            win_rate: 0.75,
            total_pnl_pct: 2.6,
        };
        journal.record_performance(&stats, 2).unwrap();

        let contents = std::fs::read_to_string(dir.join("performance.log")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(parsed["trade_count"], 4);
        assert_eq!(parsed["win_rate"], 0.75);
        assert_eq!(parsed["open_positions"], 2);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_nested_directory_created() {
        let dir = temp_dir().join("deeper/logs");
        let journal = TradeJournal::new(dir.clone());
        assert!(journal.is_ok());
        assert!(dir.exists());
        std::fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }
}
