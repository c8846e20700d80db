use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::BotConfig;
use crate::exchange::{ExchangeApi, MarketDataCache, OrderSide};
use crate::indicators::build_snapshot;
use crate::journal::TradeJournal;
use crate::models::{Coin, ExitReason, Position, SignalDirection};
use crate::position::{PerformanceStats, PositionManager};
use crate::risk::RiskManager;
use crate::selector::{CandidateStats, CoinSelector, SelectedCoin};
use crate::strategy::Strategy;

/// Concurrent per-coin evaluations per trading tick.
const MAX_CONCURRENT_COINS: usize = 4;
/// Reconciliation and performance journaling cadence.
const MAINTENANCE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Point-in-time view of the bot, published atomically after each cycle.
/// Readers always see a consistent pairing of coin set and positions.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub running: bool,
    pub active_coins: Vec<Coin>,
    pub open_positions: Vec<Position>,
    pub needs_review: usize,
}

/// Drives the three periodic loops (coin selection, trading, maintenance)
/// and exposes the control surface: start, stop, sell-all, status,
/// performance.
///
/// `running` gates new entries only. A stopped bot keeps refreshing data
/// and managing exits for whatever it still holds.
pub struct Engine<C> {
    config: BotConfig,
    client: Arc<C>,
    cache: MarketDataCache<C>,
    selector: CoinSelector,
    strategy: Strategy,
    risk: RiskManager,
    positions: Mutex<PositionManager>,
    coins: RwLock<Vec<Coin>>,
    journal: TradeJournal,
    running: AtomicBool,
    status_tx: watch::Sender<StatusSnapshot>,
    perf_tx: watch::Sender<PerformanceStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl<C: ExchangeApi + 'static> Engine<C> {
    pub fn new(config: BotConfig, client: Arc<C>) -> Result<Self> {
        let journal = TradeJournal::new(config.log_dir.clone())?;
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        let (perf_tx, _) = watch::channel(PerformanceStats::default());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            selector: CoinSelector::new(&config),
            strategy: Strategy::from_config(&config),
            risk: RiskManager::new(&config),
            positions: Mutex::new(PositionManager::new(&config)),
            coins: RwLock::new(Vec::new()),
            cache: MarketDataCache::new(client.clone()),
            client,
            journal,
            running: AtomicBool::new(false),
            status_tx,
            perf_tx,
            shutdown_tx,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Enable new entries. Returns false if already running.
    pub fn start(&self) -> bool {
        let was_stopped = !self.running.swap(true, Ordering::SeqCst);
        if was_stopped {
            tracing::info!("▶ Trading started ({} strategy)", self.strategy.name());
            self.publish_status();
        }
        was_stopped
    }

    /// Stop opening new positions. Existing positions keep being managed
    /// until they exit. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            tracing::info!("⏸ Trading stopped, managing open positions only");
            self.publish_status();
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Market-exit every open position immediately, regardless of PnL.
    /// Returns the number of exits submitted. The bot keeps running; the
    /// re-entry cooldown prevents immediate re-buys of the sold coins.
    pub async fn sell_all(&self) -> usize {
        let intents = {
            let mut pm = self.lock_positions();
            pm.force_close_all()
        };

        tracing::warn!("⚠ Sell-all requested, closing {} positions", intents.len());
        let count = intents.len();
        for (position_id, order) in intents {
            self.submit_staged_exit(position_id, order, None).await;
        }
        self.publish_status();
        count
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    pub fn performance(&self) -> PerformanceStats {
        self.perf_tx.borrow().clone()
    }

    /// Signal the loops in `run` to wind down.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    /// Run the three periodic loops until `shutdown` is called. Ticks that
    /// overrun their interval are skipped, not queued, so a slow exchange
    /// cannot cause a burst of catch-up cycles.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let selection = {
            let engine = self.clone();
            let mut shutdown = engine.shutdown_tx.subscribe();
            tokio::spawn(async move {
                // First selection immediately, then on the long interval
                let mut ticker =
                    interval_at(Instant::now(), engine.config.coin_selection_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.selection_cycle().await {
                                tracing::error!("Coin selection cycle failed: {:#}", e);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };

        let trading = {
            let engine = self.clone();
            let mut shutdown = engine.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let start = Instant::now() + engine.config.refresh_interval;
                let mut ticker = interval_at(start, engine.config.refresh_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => engine.trading_cycle().await,
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };

        let maintenance = {
            let engine = self.clone();
            let mut shutdown = engine.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let start = Instant::now() + MAINTENANCE_INTERVAL;
                let mut ticker = interval_at(start, MAINTENANCE_INTERVAL);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.maintenance_cycle().await {
                                tracing::warn!("Maintenance cycle failed: {:#}", e);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };

        let _ = tokio::join!(selection, trading, maintenance);
        tracing::info!("Engine loops stopped");
        Ok(())
    }

    /// Re-rank the market and replace the monitored coin set.
    async fn selection_cycle(&self) -> Result<()> {
        let tickers = self.cache.tickers().await?;
        let candidates: Vec<CandidateStats> = tickers
            .value
            .iter()
            .filter_map(|t| CandidateStats::from_ticker(t, &self.config.quote_asset))
            .collect();

        let held = self.lock_positions().held_symbols();
        let selected = self.selector.select(&candidates, &held);

        let mut coins = Vec::with_capacity(selected.len());
        for pick in selected {
            match self.hydrate_coin(&pick).await {
                Some(coin) => coins.push(coin),
                None => tracing::warn!("Skipping {}: trading rules unavailable", pick.symbol),
            }
        }

        tracing::info!(
            "🔍 Monitoring {} coins: {}",
            coins.len(),
            coins
                .iter()
                .map(|c| c.symbol.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        *self.coins.write().unwrap_or_else(|e| e.into_inner()) = coins;
        self.publish_status();
        Ok(())
    }

    /// Attach exchange trading rules to a selected coin. Exit-only coins
    /// never place entries, so missing rules are not fatal for them.
    async fn hydrate_coin(&self, pick: &SelectedCoin) -> Option<Coin> {
        match self.cache.symbol_rules(&pick.symbol).await {
            Ok(rules) => Some(Coin {
                symbol: pick.symbol.clone(),
                base_asset: pick.base_asset.clone(),
                quote_asset: self.config.quote_asset.clone(),
                min_notional: rules.value.min_notional,
                step_size: rules.value.step_size,
                tradable: pick.tradable,
            }),
            Err(e) if !pick.tradable => {
                tracing::warn!("Rules unavailable for exit-only {}: {}", pick.symbol, e);
                Some(Coin {
                    symbol: pick.symbol.clone(),
                    base_asset: pick.base_asset.clone(),
                    quote_asset: self.config.quote_asset.clone(),
                    min_notional: 0.0,
                    step_size: 0.0,
                    tradable: false,
                })
            }
            Err(_) => None,
        }
    }

    /// Evaluate every monitored coin concurrently, bounded so a wide coin
    /// set cannot flood the request budget all at once.
    async fn trading_cycle(self: &Arc<Self>) {
        let coins = self
            .coins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if coins.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_COINS));
        let mut tasks = JoinSet::new();

        for coin in coins {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                if let Err(e) = engine.process_coin(&coin).await {
                    tracing::warn!("Cycle failed for {}: {:#}", coin.symbol, e);
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        self.publish_status();
    }

    /// One coin, one tick: refresh data, manage exits, then consider an
    /// entry. Exits always run; entries only while running and tradable.
    async fn process_coin(&self, coin: &Coin) -> Result<()> {
        let klines = self.cache.klines(&coin.symbol).await?;
        let Some(snapshot) = build_snapshot(&self.config, &coin.symbol, klines.value) else {
            return Ok(());
        };
        let price = snapshot.last_price;
        let signal = self.strategy.evaluate(&snapshot);

        // Exits first: collect triggers under the lock, submit after.
        let triggered: Vec<(uuid::Uuid, ExitReason)> = {
            let mut pm = self.lock_positions();
            let ids: Vec<uuid::Uuid> = pm
                .open_positions()
                .iter()
                .filter(|p| p.symbol == coin.symbol)
                .map(|p| p.id)
                .collect();

            ids.into_iter()
                .filter_map(|id| {
                    let reason = pm
                        .tick(id, price, &self.risk)
                        .ok()
                        .flatten()
                        .or_else(|| {
                            (signal.direction == SignalDirection::Sell)
                                .then_some(ExitReason::StrategySell)
                        });
                    reason.map(|r| (id, r))
                })
                .collect()
        };

        for (position_id, reason) in triggered {
            self.submit_exit(position_id, reason, Some(price)).await;
        }

        if signal.direction == SignalDirection::Buy {
            tracing::debug!("{}: buy signal ({})", coin.symbol, signal.reason);
            self.try_enter(coin, price, snapshot.volatility).await?;
        }

        Ok(())
    }

    async fn try_enter(&self, coin: &Coin, price: f64, volatility: Option<f64>) -> Result<()> {
        if !self.is_running() || !coin.tradable {
            return Ok(());
        }
        if self.lock_positions().in_cooldown(&coin.symbol) {
            tracing::debug!("{}: in re-entry cooldown, skipping buy", coin.symbol);
            return Ok(());
        }

        let free = self.cache.free_balance(&self.config.quote_asset).await?;
        if free.stale {
            // Never size an order off a balance we could not refresh
            tracing::warn!("{}: balance data stale, skipping entry", coin.symbol);
            return Ok(());
        }

        let staged = {
            let mut pm = self.lock_positions();
            pm.prepare_entry(coin, price, free.value, volatility, &self.risk)
        };
        let (position_id, order) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                tracing::debug!("{}: entry skipped ({})", coin.symbol, e);
                return Ok(());
            }
        };

        match self
            .client
            .place_market_order(
                &coin.symbol,
                OrderSide::Buy,
                order.quantity,
                &order.client_order_id,
            )
            .await
        {
            Ok(ack) if ack.is_filled() => {
                let fill_price = ack.avg_fill_price();
                self.lock_positions().entry_filled(
                    position_id,
                    order.id,
                    fill_price,
                    Some(ack.order_id),
                )?;
                self.cache.invalidate_balances();
                tracing::info!(
                    "🟢 Opened {} {:.6} @ {:.4}",
                    coin.symbol,
                    order.quantity,
                    fill_price.unwrap_or(price)
                );
            }
            Ok(ack) => {
                tracing::warn!(
                    "{}: entry order not filled (status {}), discarding",
                    coin.symbol,
                    ack.status
                );
                self.lock_positions().entry_failed(position_id, order.id);
            }
            Err(e) => {
                tracing::warn!("{}: entry order failed: {}", coin.symbol, e);
                self.lock_positions().entry_failed(position_id, order.id);
            }
        }

        Ok(())
    }

    /// Stage and submit a market exit for one position. `market_price` is
    /// the price the trigger was observed at, used as a fill-price
    /// fallback when the ack omits the fill breakdown.
    async fn submit_exit(
        &self,
        position_id: uuid::Uuid,
        reason: ExitReason,
        market_price: Option<f64>,
    ) {
        let staged = self.lock_positions().prepare_exit(position_id, reason);
        if let Some(order) = staged {
            self.submit_staged_exit(position_id, order, market_price).await;
        }
    }

    async fn submit_staged_exit(
        &self,
        position_id: uuid::Uuid,
        order: crate::models::Order,
        market_price: Option<f64>,
    ) {
        let result = self
            .client
            .place_market_order(
                &order.symbol,
                OrderSide::Sell,
                order.quantity,
                &order.client_order_id,
            )
            .await;

        match result {
            Ok(ack) if ack.is_filled() => {
                // Acks may omit the fill breakdown; fall back to the
                // observed market price, then the entry price, never zero.
                let fallback = market_price.or_else(|| {
                    self.lock_positions()
                        .position(position_id)
                        .map(|p| p.entry_price)
                });
                let exit_price = ack.avg_fill_price().or(fallback).unwrap_or_default();
                let closed = self.lock_positions().exit_filled(
                    position_id,
                    order.id,
                    exit_price,
                    Some(ack.order_id),
                );
                self.cache.invalidate_balances();
                match closed {
                    Ok(position) => {
                        if let Err(e) = self.journal.record_trade(&position) {
                            tracing::warn!("Journal write failed: {:#}", e);
                        }
                    }
                    Err(e) => tracing::error!("Exit bookkeeping failed: {:#}", e),
                }
            }
            Ok(ack) => {
                tracing::warn!(
                    "{}: exit order not filled (status {}), keeping position",
                    order.symbol,
                    ack.status
                );
                if let Err(e) = self.lock_positions().exit_rejected(position_id, order.id) {
                    tracing::error!("Exit rollback failed: {:#}", e);
                }
            }
            Err(e) => {
                tracing::warn!("{}: exit order rejected: {}", order.symbol, e);
                if let Err(e) = self.lock_positions().exit_rejected(position_id, order.id) {
                    tracing::error!("Exit rollback failed: {:#}", e);
                }
            }
        }
    }

    /// Reconcile tracked positions against exchange holdings and journal
    /// a performance rollup.
    async fn maintenance_cycle(&self) -> Result<()> {
        let balances = self.cache.balances().await?;
        let coins = self
            .coins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        // symbol → how much of its base asset the account actually holds
        let holdings: HashMap<String, f64> = coins
            .iter()
            .map(|coin| {
                let held = balances
                    .value
                    .iter()
                    .find(|b| b.asset == coin.base_asset)
                    .map(|b| b.free + b.locked)
                    .unwrap_or(0.0);
                (coin.symbol.clone(), held)
            })
            .collect();

        let (ghosts, stats, open_count) = {
            let mut pm = self.lock_positions();
            let ghosts: Vec<Position> = pm
                .reconcile(&holdings)
                .into_iter()
                .filter_map(|id| pm.position(id).cloned())
                .collect();
            (ghosts, pm.performance(), pm.open_positions().len())
        };

        for ghost in &ghosts {
            if let Err(e) = self.journal.record_trade(ghost) {
                tracing::warn!("Journal write failed: {:#}", e);
            }
        }

        if let Err(e) = self.journal.record_performance(&stats, open_count) {
            tracing::warn!("Journal write failed: {:#}", e);
        }

        self.perf_tx.send_replace(stats);
        self.publish_status();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_positions(&self) -> std::sync::MutexGuard<'_, PositionManager> {
        self.positions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish one consistent snapshot; readers never see a half-updated
    /// coin set and position list.
    fn publish_status(&self) {
        let (open_positions, needs_review) = {
            let pm = self.lock_positions();
            (
                pm.open_positions().into_iter().cloned().collect(),
                pm.needs_review().len(),
            )
        };
        let snapshot = StatusSnapshot {
            running: self.is_running(),
            active_coins: self.coins.read().unwrap_or_else(|e| e.into_inner()).clone(),
            open_positions,
            needs_review,
        };
        // send_replace updates the stored value even with no subscribers
        self.status_tx.send_replace(snapshot);
    }
}
