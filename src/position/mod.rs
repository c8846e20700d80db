use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::BotConfig;
use crate::error::SizingError;
use crate::models::{
    Coin, ExitReason, Order, OrderKind, OrderStatus, Position, PositionStatus,
};
use crate::risk::RiskManager;

/// Exit submissions per position before it is flagged for manual review.
const MAX_EXIT_ATTEMPTS: u32 = 3;
/// No re-entry on a symbol this soon after its last fill.
const REENTRY_COOLDOWN_MINUTES: i64 = 15;

/// Aggregate over closed trades, published through the status interface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
    pub trade_count: usize,
    pub win_rate: f64,
    pub total_pnl_pct: f64,
}

/// Owns the position and order tables and drives the position state
/// machine: Open → TrailingArmed → Closing → Closed.
///
/// All mutation goes through here; the engine serializes access per coin,
/// so invariants (order-count limits, forward-only transitions) hold by
/// construction.
pub struct PositionManager {
    positions: Vec<Position>,
    orders: Vec<Order>,
    trading_amount_percent: f64,
    max_orders_per_coin: usize,
    min_balance_required: f64,
    fee_percentage: f64,
    last_fill: HashMap<String, DateTime<Utc>>,
}

impl PositionManager {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            positions: Vec::new(),
            orders: Vec::new(),
            trading_amount_percent: config.trading_amount_percent,
            max_orders_per_coin: config.max_orders_per_coin,
            min_balance_required: config.min_balance_required,
            fee_percentage: config.fee_percentage,
            last_fill: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    /// Size an entry and stage the position plus its entry order.
    ///
    /// The staged order is Pending; the caller submits it and reports back
    /// via `entry_filled` / `entry_failed`.
    pub fn prepare_entry(
        &mut self,
        coin: &Coin,
        entry_price: f64,
        free_balance: f64,
        volatility: Option<f64>,
        risk: &RiskManager,
    ) -> Result<(Uuid, Order), SizingError> {
        let working = self.working_orders(&coin.symbol);
        if working >= self.max_orders_per_coin {
            return Err(SizingError::OrderLimitReached {
                symbol: coin.symbol.clone(),
                count: working,
                limit: self.max_orders_per_coin,
            });
        }

        let quantity = self.size_entry(coin, entry_price, free_balance)?;
        let levels = risk.initial_levels(entry_price, volatility);

        let position = Position {
            id: Uuid::new_v4(),
            symbol: coin.symbol.clone(),
            entry_price,
            quantity,
            target_price: levels.target_price,
            stop_price: levels.stop_price,
            initial_stop: levels.stop_price,
            highest_price: entry_price,
            high_volatility: levels.high_volatility,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            exit_price: None,
            realized_pnl_pct: None,
            exit_reason: None,
            exit_attempts: 0,
            needs_review: false,
        };

        let order = self.stage_order(position.id, &coin.symbol, OrderKind::Entry, quantity);
        let position_id = position.id;
        self.positions.push(position);

        Ok((position_id, order))
    }

    fn size_entry(
        &self,
        coin: &Coin,
        price: f64,
        free_balance: f64,
    ) -> Result<f64, SizingError> {
        if free_balance < self.min_balance_required {
            return Err(SizingError::InsufficientFunds {
                available: free_balance,
                required: self.min_balance_required,
            });
        }

        let notional = free_balance * self.trading_amount_percent;
        let mut quantity = notional / price;

        if coin.step_size > 0.0 {
            quantity = (quantity / coin.step_size).floor() * coin.step_size;
        }

        if quantity <= 0.0 {
            return Err(SizingError::ZeroQuantity {
                step_size: coin.step_size,
            });
        }

        let sized_notional = quantity * price;
        if sized_notional < coin.min_notional {
            return Err(SizingError::BelowMinNotional {
                notional: sized_notional,
                min_notional: coin.min_notional,
            });
        }

        Ok(quantity)
    }

    /// Entry order confirmed. Fill price replaces the estimate when the
    /// exchange reported one.
    pub fn entry_filled(
        &mut self,
        position_id: Uuid,
        order_id: Uuid,
        fill_price: Option<f64>,
        exchange_order_id: Option<u64>,
    ) -> anyhow::Result<()> {
        self.mark_order(order_id, OrderStatus::Filled, exchange_order_id, fill_price);

        let position = self.position_mut(position_id)?;
        if let Some(price) = fill_price {
            // Keep target/stop anchored to what we actually paid
            let ratio = price / position.entry_price;
            position.entry_price = price;
            position.target_price *= ratio;
            position.stop_price *= ratio;
            position.initial_stop *= ratio;
            position.highest_price = price;
        }
        let symbol = position.symbol.clone();
        self.last_fill.insert(symbol, Utc::now());
        Ok(())
    }

    /// Entry order failed; the staged position never existed as far as
    /// the exchange is concerned.
    pub fn entry_failed(&mut self, position_id: Uuid, order_id: Uuid) {
        self.mark_order(order_id, OrderStatus::Rejected, None, None);
        self.positions.retain(|p| p.id != position_id);
    }

    pub fn in_cooldown(&self, symbol: &str) -> bool {
        self.last_fill.get(symbol).is_some_and(|at| {
            Utc::now() - *at < Duration::minutes(REENTRY_COOLDOWN_MINUTES)
        })
    }

    // ------------------------------------------------------------------
    // Exits
    // ------------------------------------------------------------------

    /// Advance trailing state and check target/stop for one position.
    /// Returns the exit trigger when breached.
    pub fn tick(
        &mut self,
        position_id: Uuid,
        current_price: f64,
        risk: &RiskManager,
    ) -> anyhow::Result<Option<ExitReason>> {
        let position = self.position_mut(position_id)?;

        if !matches!(
            position.status,
            PositionStatus::Open | PositionStatus::TrailingArmed
        ) {
            return Ok(None);
        }

        if let Some(new_stop) = risk.update_trailing(position, current_price) {
            tracing::debug!(
                "{} trailing stop advanced to {:.4}",
                position.symbol,
                new_stop
            );
        }

        if current_price >= position.target_price {
            return Ok(Some(ExitReason::TakeProfit));
        }
        if current_price <= position.stop_price {
            let reason = if position.status == PositionStatus::TrailingArmed {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            return Ok(Some(reason));
        }

        Ok(None)
    }

    /// Move a position to Closing and stage its exit order. Returns None
    /// if the position cannot exit (already closing/closed, or flagged).
    pub fn prepare_exit(&mut self, position_id: Uuid, reason: ExitReason) -> Option<Order> {
        let (symbol, quantity) = {
            let position = self.positions.iter_mut().find(|p| p.id == position_id)?;
            if position.needs_review
                || !matches!(
                    position.status,
                    PositionStatus::Open | PositionStatus::TrailingArmed
                )
            {
                return None;
            }
            position.status = PositionStatus::Closing;
            position.exit_reason = Some(reason);
            (position.symbol.clone(), position.quantity)
        };

        let kind = match reason {
            ExitReason::TakeProfit => OrderKind::TakeProfit,
            ExitReason::StopLoss => OrderKind::StopLoss,
            ExitReason::TrailingStop => OrderKind::TrailingStop,
            ExitReason::StrategySell | ExitReason::ForceSell | ExitReason::Reconciliation => {
                OrderKind::ForceSell
            }
        };

        Some(self.stage_order(position_id, &symbol, kind, quantity))
    }

    /// Exit order filled: the position is done.
    pub fn exit_filled(
        &mut self,
        position_id: Uuid,
        order_id: Uuid,
        exit_price: f64,
        exchange_order_id: Option<u64>,
    ) -> anyhow::Result<Position> {
        self.mark_order(order_id, OrderStatus::Filled, exchange_order_id, Some(exit_price));

        let fee = self.fee_percentage;
        let position = self.position_mut(position_id)?;
        if position.status != PositionStatus::Closing {
            anyhow::bail!(
                "exit fill for {} in state {:?}",
                position_id,
                position.status
            );
        }

        // Net of round-trip fees
        let net = exit_price * (1.0 - fee) / (position.entry_price * (1.0 + fee)) - 1.0;

        position.status = PositionStatus::Closed;
        position.closed_at = Some(Utc::now());
        position.exit_price = Some(exit_price);
        position.realized_pnl_pct = Some(net * 100.0);

        let closed = position.clone();
        self.last_fill.insert(closed.symbol.clone(), Utc::now());

        tracing::info!(
            "✓ Closed {} {:?} @ {:.4} ({:+.2}%)",
            closed.symbol,
            closed.exit_reason,
            exit_price,
            net * 100.0
        );

        Ok(closed)
    }

    /// Exit order rejected: step back to the pre-Closing state and count
    /// the attempt. After `MAX_EXIT_ATTEMPTS` the position is flagged for
    /// manual review and no longer retried.
    pub fn exit_rejected(&mut self, position_id: Uuid, order_id: Uuid) -> anyhow::Result<()> {
        self.mark_order(order_id, OrderStatus::Rejected, None, None);

        let position = self.position_mut(position_id)?;
        if position.status != PositionStatus::Closing {
            return Ok(());
        }

        // Armed state is recoverable from the stop having advanced
        position.status = if position.stop_price > position.initial_stop {
            PositionStatus::TrailingArmed
        } else {
            PositionStatus::Open
        };
        position.exit_reason = None;
        position.exit_attempts += 1;

        if position.exit_attempts >= MAX_EXIT_ATTEMPTS {
            position.needs_review = true;
            tracing::error!(
                "✗ {} exit rejected {} times, flagging position {} for manual review",
                position.symbol,
                position.exit_attempts,
                position.id
            );
        }

        Ok(())
    }

    /// Stage immediate market exits for every position still open,
    /// bypassing target/stop checks. Used by the sell-all control.
    pub fn force_close_all(&mut self) -> Vec<(Uuid, Order)> {
        let ids: Vec<Uuid> = self
            .positions
            .iter()
            .filter(|p| {
                matches!(
                    p.status,
                    PositionStatus::Open | PositionStatus::TrailingArmed
                ) && !p.needs_review
            })
            .map(|p| p.id)
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                self.prepare_exit(id, ExitReason::ForceSell)
                    .map(|order| (id, order))
            })
            .collect()
    }

    /// Compare tracked positions against exchange holdings and close out
    /// ghosts whose base asset is no longer there. Flagged for review:
    /// something happened outside the bot.
    pub fn reconcile(&mut self, base_holdings: &HashMap<String, f64>) -> Vec<Uuid> {
        let mut ghosts = Vec::new();

        for position in &mut self.positions {
            if !position.is_open() || position.status == PositionStatus::Closing {
                continue;
            }
            let held = base_holdings
                .get(&position.symbol)
                .copied()
                .unwrap_or(0.0);
            if held < position.quantity * 0.95 {
                tracing::warn!(
                    "⚠ {} position {} not backed by holdings ({:.6} < {:.6}), closing as ghost",
                    position.symbol,
                    position.id,
                    held,
                    position.quantity
                );
                position.status = PositionStatus::Closed;
                position.closed_at = Some(Utc::now());
                position.exit_reason = Some(ExitReason::Reconciliation);
                position.needs_review = true;
                ghosts.push(position.id);
            }
        }

        ghosts
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    fn stage_order(
        &mut self,
        position_id: Uuid,
        symbol: &str,
        kind: OrderKind,
        quantity: f64,
    ) -> Order {
        let order = Order {
            id: Uuid::new_v4(),
            position_id,
            symbol: symbol.to_string(),
            kind,
            status: OrderStatus::Pending,
            client_order_id: Uuid::new_v4().to_string(),
            exchange_order_id: None,
            quantity,
            price: None,
            created_at: Utc::now(),
        };
        self.orders.push(order.clone());
        order
    }

    fn mark_order(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
        exchange_order_id: Option<u64>,
        price: Option<f64>,
    ) {
        if let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) {
            order.status = status;
            order.exchange_order_id = exchange_order_id;
            order.price = price;
        }
    }

    /// Non-terminal orders currently tracked for a symbol.
    pub fn working_orders(&self, symbol: &str) -> usize {
        self.orders
            .iter()
            .filter(|o| o.symbol == symbol && !o.status.is_terminal())
            .count()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    fn position_mut(&mut self, position_id: Uuid) -> anyhow::Result<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| anyhow::anyhow!("position {} not found", position_id))
    }

    pub fn position(&self, position_id: Uuid) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == position_id)
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.is_open()).collect()
    }

    pub fn held_symbols(&self) -> HashSet<String> {
        self.positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| p.symbol.clone())
            .collect()
    }

    pub fn needs_review(&self) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.needs_review).collect()
    }

    pub fn performance(&self) -> PerformanceStats {
        let closed: Vec<f64> = self
            .positions
            .iter()
            .filter_map(|p| p.realized_pnl_pct)
            .collect();

        if closed.is_empty() {
            return PerformanceStats::default();
        }

        let wins = closed.iter().filter(|pnl| **pnl > 0.0).count();
        PerformanceStats {
            trade_count: closed.len(),
            win_rate: wins as f64 / closed.len() as f64,
            total_pnl_pct: closed.iter().sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> BotConfig {
        let mut base = vec![("EXCHANGE_API_KEY", "k")];
        base.extend_from_slice(pairs);
        BotConfig::from_lookup(move |key| {
            base.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    fn coin() -> Coin {
        Coin {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            min_notional: 10.0,
            step_size: 0.0001,
            tradable: true,
        }
    }

    fn setup() -> (PositionManager, RiskManager) {
        let cfg = config(&[
            // Entry 100 → target 101.2, stop 99.0 (defaults); 10% sizing
            ("TRADING_AMOUNT_PERCENT", "10"),
            ("FEE_PERCENTAGE", "0"),
        ]);
        (PositionManager::new(&cfg), RiskManager::new(&cfg))
    }

    fn open_position(pm: &mut PositionManager, risk: &RiskManager, price: f64) -> Uuid {
        let (id, order) = pm
            .prepare_entry(&coin(), price, 10_000.0, Some(1.0), risk)
            .unwrap();
        pm.entry_filled(id, order.id, None, Some(1)).unwrap();
        id
    }

    #[test]
    fn test_entry_sizing_and_levels() {
        let (mut pm, risk) = setup();
        let (id, order) = pm
            .prepare_entry(&coin(), 100.0, 10_000.0, Some(1.0), &risk)
            .unwrap();

        // 10% of 10k = $1000 at $100 → 10 units
        assert_eq!(order.quantity, 10.0);
        assert_eq!(order.kind, OrderKind::Entry);
        assert_eq!(order.status, OrderStatus::Pending);

        let position = pm.position(id).unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert!((position.target_price - 101.2).abs() < 1e-9);
        assert!((position.stop_price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_sizing_rejections() {
        let (mut pm, risk) = setup();

        // Below minimum account balance
        let result = pm.prepare_entry(&coin(), 100.0, 5.0, None, &risk);
        assert!(matches!(result, Err(SizingError::InsufficientFunds { .. })));

        // 10% of $50 = $5, below the $10 min notional
        let result = pm.prepare_entry(&coin(), 100.0, 50.0, None, &risk);
        assert!(matches!(result, Err(SizingError::BelowMinNotional { .. })));
    }

    #[test]
    fn test_quantity_floored_to_step() {
        let (mut pm, risk) = setup();
        let mut chunky = coin();
        chunky.step_size = 3.0;

        // $1000 at $100 = 10 units, floored to 9 at step 3
        let (_, order) = pm
            .prepare_entry(&chunky, 100.0, 10_000.0, None, &risk)
            .unwrap();
        assert_eq!(order.quantity, 9.0);
    }

    #[test]
    fn test_order_limit_per_coin() {
        let (mut pm, risk) = setup();

        // Default limit is 3 working orders per coin
        for _ in 0..3 {
            pm.prepare_entry(&coin(), 100.0, 10_000.0, None, &risk)
                .unwrap();
        }
        let result = pm.prepare_entry(&coin(), 100.0, 10_000.0, None, &risk);
        assert!(matches!(result, Err(SizingError::OrderLimitReached { .. })));
    }

    #[test]
    fn test_filled_entries_free_order_slots() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);
        assert_eq!(pm.working_orders("BTCUSDT"), 0);
        assert!(pm.position(id).is_some());
    }

    #[test]
    fn test_entry_failure_rolls_back() {
        let (mut pm, risk) = setup();
        let (id, order) = pm
            .prepare_entry(&coin(), 100.0, 10_000.0, None, &risk)
            .unwrap();
        pm.entry_failed(id, order.id);

        assert!(pm.position(id).is_none());
        assert_eq!(pm.working_orders("BTCUSDT"), 0);
    }

    #[test]
    fn test_entry_fill_price_reanchors_levels() {
        let (mut pm, risk) = setup();
        let (id, order) = pm
            .prepare_entry(&coin(), 100.0, 10_000.0, Some(1.0), &risk)
            .unwrap();
        // Filled 1% above the estimate
        pm.entry_filled(id, order.id, Some(101.0), Some(7)).unwrap();

        let position = pm.position(id).unwrap();
        assert_eq!(position.entry_price, 101.0);
        assert!((position.target_price - 101.2 * 1.01).abs() < 1e-9);
        assert!((position.stop_price - 99.0 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_cooldown_after_fill() {
        let (mut pm, risk) = setup();
        assert!(!pm.in_cooldown("BTCUSDT"));
        open_position(&mut pm, &risk, 100.0);
        assert!(pm.in_cooldown("BTCUSDT"));
        assert!(!pm.in_cooldown("ETHUSDT"));
    }

    #[test]
    fn test_take_profit_trigger() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);

        assert_eq!(pm.tick(id, 100.5, &risk).unwrap(), None);
        assert_eq!(
            pm.tick(id, 101.2, &risk).unwrap(),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_stop_loss_trigger() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);

        assert_eq!(
            pm.tick(id, 98.9, &risk).unwrap(),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_trailing_stop_trigger_after_arming() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);

        // Activation 0.40 of the 1.2 distance → arms around 100.48
        assert_eq!(pm.tick(id, 100.9, &risk).unwrap(), None);
        assert_eq!(
            pm.position(id).unwrap().status,
            PositionStatus::TrailingArmed
        );

        // Stop trails 0.25% under the 100.9 high ≈ 100.65
        let stop = pm.position(id).unwrap().stop_price;
        assert!(stop > 100.0);

        assert_eq!(
            pm.tick(id, stop - 0.01, &risk).unwrap(),
            Some(ExitReason::TrailingStop)
        );
    }

    #[test]
    fn test_full_exit_cycle() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);

        let order = pm.prepare_exit(id, ExitReason::TakeProfit).unwrap();
        assert_eq!(pm.position(id).unwrap().status, PositionStatus::Closing);

        // Tick is a no-op while Closing
        assert_eq!(pm.tick(id, 50.0, &risk).unwrap(), None);

        let closed = pm.exit_filled(id, order.id, 101.2, Some(2)).unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
        assert!((closed.realized_pnl_pct.unwrap() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_pnl_net_of_fees() {
        let cfg = config(&[
            ("TRADING_AMOUNT_PERCENT", "10"),
            ("FEE_PERCENTAGE", "0.1"),
        ]);
        let mut pm = PositionManager::new(&cfg);
        let risk = RiskManager::new(&cfg);
        let id = open_position(&mut pm, &risk, 100.0);

        let order = pm.prepare_exit(id, ExitReason::TakeProfit).unwrap();
        let closed = pm.exit_filled(id, order.id, 101.2, None).unwrap();

        // 1.2% gross minus ~0.2% round-trip fees
        let pnl = closed.realized_pnl_pct.unwrap();
        assert!(pnl < 1.2 && pnl > 0.9);
    }

    #[test]
    fn test_exit_rejection_reverts_and_flags_after_limit() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);

        for attempt in 1..=3u32 {
            let order = pm.prepare_exit(id, ExitReason::StopLoss).unwrap();
            pm.exit_rejected(id, order.id).unwrap();

            let position = pm.position(id).unwrap();
            assert_eq!(position.status, PositionStatus::Open);
            assert_eq!(position.exit_attempts, attempt);
        }

        let position = pm.position(id).unwrap();
        assert!(position.needs_review);
        // Flagged positions are not retried
        assert!(pm.prepare_exit(id, ExitReason::StopLoss).is_none());
    }

    #[test]
    fn test_exit_rejection_restores_armed_state() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);

        pm.tick(id, 100.9, &risk).unwrap(); // arms trailing
        let order = pm.prepare_exit(id, ExitReason::TrailingStop).unwrap();
        pm.exit_rejected(id, order.id).unwrap();

        assert_eq!(
            pm.position(id).unwrap().status,
            PositionStatus::TrailingArmed
        );
    }

    #[test]
    fn test_force_close_all_ignores_pnl() {
        let (mut pm, risk) = setup();
        let winner = open_position(&mut pm, &risk, 100.0);
        let loser = open_position(&mut pm, &risk, 200.0);
        let flat = open_position(&mut pm, &risk, 300.0);

        let intents = pm.force_close_all();
        assert_eq!(intents.len(), 3);
        for id in [winner, loser, flat] {
            assert_eq!(pm.position(id).unwrap().status, PositionStatus::Closing);
        }
        assert!(intents
            .iter()
            .all(|(_, order)| order.kind == OrderKind::ForceSell));
    }

    #[test]
    fn test_reconcile_closes_ghost_positions() {
        let (mut pm, risk) = setup();
        let backed = open_position(&mut pm, &risk, 100.0);
        let mut chunky = coin();
        chunky.symbol = "ETHUSDT".to_string();
        let (ghost, order) = pm
            .prepare_entry(&chunky, 100.0, 10_000.0, None, &risk)
            .unwrap();
        pm.entry_filled(ghost, order.id, None, None).unwrap();

        let mut holdings = HashMap::new();
        holdings.insert("BTCUSDT".to_string(), 10.0);
        // ETH holding vanished out from under us

        let ghosts = pm.reconcile(&holdings);
        assert_eq!(ghosts, vec![ghost]);

        let ghost_pos = pm.position(ghost).unwrap();
        assert_eq!(ghost_pos.status, PositionStatus::Closed);
        assert_eq!(ghost_pos.exit_reason, Some(ExitReason::Reconciliation));
        assert!(ghost_pos.needs_review);
        assert_eq!(pm.position(backed).unwrap().status, PositionStatus::Open);
    }

    #[test]
    fn test_performance_stats() {
        let (mut pm, risk) = setup();

        let a = open_position(&mut pm, &risk, 100.0);
        let order = pm.prepare_exit(a, ExitReason::TakeProfit).unwrap();
        pm.exit_filled(a, order.id, 101.2, None).unwrap();

        let b = open_position(&mut pm, &risk, 100.0);
        let order = pm.prepare_exit(b, ExitReason::StopLoss).unwrap();
        pm.exit_filled(b, order.id, 99.0, None).unwrap();

        let stats = pm.performance();
        assert_eq!(stats.trade_count, 2);
        assert_eq!(stats.win_rate, 0.5);
        assert!((stats.total_pnl_pct - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_held_symbols() {
        let (mut pm, risk) = setup();
        let id = open_position(&mut pm, &risk, 100.0);
        assert!(pm.held_symbols().contains("BTCUSDT"));

        let order = pm.prepare_exit(id, ExitReason::ForceSell).unwrap();
        pm.exit_filled(id, order.id, 100.0, None).unwrap();
        assert!(pm.held_symbols().is_empty());
    }
}
