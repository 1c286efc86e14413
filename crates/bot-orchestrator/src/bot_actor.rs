//! The bot actor: one task, one writer.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cycle_trade_bitfinex::book::BookStore;
use cycle_trade_bitfinex::messages::OrderRequest;
use cycle_trade_bitfinex::orders::OrderStore;
use cycle_trade_bitfinex::transport::{ExchangeEvent, Notifier, Transport};
use cycle_trade_bitfinex::wallet::WalletStore;
use cycle_trade_core::config::AppConfig;
use cycle_trade_core::constants::{NotificationStatus, OrderType, WalletType};
use cycle_trade_execution::chain::{
    ChainAction, ChainContext, ChainEvent, OrderChain, TimerToken,
};
use cycle_trade_solver::solver::{CycleSolver, SolveReport, SolverConfig};
use cycle_trade_solver::pricing::SpreadNudge;

use crate::events::BotEvent;

enum TimerKind {
    Cancel,
    Retry,
}

/// The trading bot. All store and chain mutation happens inside this
/// struct's methods, which are only ever called from one task.
pub struct Bot<T: Transport, N: Notifier> {
    config: AppConfig,
    books: BookStore,
    wallets: WalletStore,
    orders: OrderStore,
    chain: OrderChain,
    transport: T,
    notifier: N,
    /// Sender side of the bot's own channel, used to post timer events.
    events_tx: mpsc::Sender<BotEvent>,
    /// Set while a cycle's solve+execute is in progress; ticks arriving
    /// meanwhile are skipped, not queued.
    trading: bool,
    /// Set during an exchange maintenance window.
    maintenance: bool,
    cycle_seq: i64,
    timers: HashMap<TimerToken, JoinHandle<()>>,
}

impl<T: Transport, N: Notifier> Bot<T, N> {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: T,
        notifier: N,
        events_tx: mpsc::Sender<BotEvent>,
    ) -> Self {
        let chain = OrderChain::new(config.chain.clone());
        Self {
            config,
            books: BookStore::new(),
            wallets: WalletStore::new(),
            orders: OrderStore::new(),
            chain,
            transport,
            notifier,
            events_tx,
            trading: false,
            maintenance: false,
            cycle_seq: 0,
            timers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn books(&self) -> &BookStore {
        &self.books
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn is_trading(&self) -> bool {
        self.trading
    }

    /// Runs the bot until the channel closes or [`BotEvent::Shutdown`]
    /// arrives. Cycle ticks and snapshot saves are driven by intervals;
    /// a tick is skipped while a previous cycle is still executing.
    pub async fn run(mut self, mut events_rx: mpsc::Receiver<BotEvent>) {
        let mut cycle = tokio::time::interval(Duration::from_secs(
            self.config.trading.cycle_interval_secs.max(1),
        ));
        cycle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut save = tokio::time::interval(Duration::from_secs(
            self.config.exchange.snapshot_interval_secs.max(1),
        ));
        save.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            start = %self.config.trading.start_currency,
            symbols = self.config.exchange.symbols.len(),
            enabled = self.config.trading.enabled,
            "bot started"
        );

        loop {
            tokio::select! {
                maybe_event = events_rx.recv() => match maybe_event {
                    None | Some(BotEvent::Shutdown) => break,
                    Some(event) => self.handle_event(event).await,
                },
                _ = cycle.tick() => self.trading_cycle().await,
                _ = save.tick() => self.save_snapshot(),
            }
        }

        info!("bot stopped");
    }

    /// Dispatches one event. Public so tests and replay harnesses can
    /// drive the bot without the interval loop.
    pub async fn handle_event(&mut self, event: BotEvent) {
        match event {
            BotEvent::Exchange(exchange_event) => {
                self.handle_exchange_event(exchange_event).await;
            }
            BotEvent::CancelTimeout(token) => {
                self.timers.remove(&token);
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions =
                    self.chain
                        .handle_event(&ChainEvent::CancelTimeout { token }, &ctx, Utc::now());
                self.apply_actions(actions).await;
            }
            BotEvent::RetryTimer(token) => {
                self.timers.remove(&token);
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions =
                    self.chain
                        .handle_event(&ChainEvent::RetryTimer { token }, &ctx, Utc::now());
                self.apply_actions(actions).await;
            }
            BotEvent::Shutdown => {}
        }
    }

    async fn handle_exchange_event(&mut self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::Book { symbol, update } => {
                self.books.update(&symbol, &update);
            }
            ExchangeEvent::WalletSnapshot(records) => {
                self.wallets.update_all(&records);
                self.request_missing_balances().await;
            }
            ExchangeEvent::WalletUpdate(record) => {
                let unknown_available = record.available.is_none();
                self.wallets.update(&record);
                if unknown_available {
                    self.request_balance(record.wallet_type, &record.currency).await;
                }
            }
            ExchangeEvent::OrderSnapshot(records) => {
                self.orders.update_all(&records);
            }
            ExchangeEvent::OrderNew(record) => {
                self.orders.update(&record);
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions =
                    self.chain
                        .handle_event(&ChainEvent::OrderNew(&record), &ctx, Utc::now());
                self.apply_actions(actions).await;
            }
            ExchangeEvent::OrderUpdate(record) => {
                self.orders.update(&record);
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions =
                    self.chain
                        .handle_event(&ChainEvent::OrderUpdate(&record), &ctx, Utc::now());
                self.apply_actions(actions).await;
            }
            ExchangeEvent::OrderCancel(record) => {
                self.orders.update(&record);
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions =
                    self.chain
                        .handle_event(&ChainEvent::OrderCanceled(&record), &ctx, Utc::now());
                self.apply_actions(actions).await;
            }
            ExchangeEvent::OrderCancelRequested(record) => {
                self.orders.update(&record);
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions = self.chain.handle_event(
                    &ChainEvent::OrderCancelRequested(&record),
                    &ctx,
                    Utc::now(),
                );
                self.apply_actions(actions).await;
            }
            ExchangeEvent::TradeExecuted(trade) => {
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions =
                    self.chain
                        .handle_event(&ChainEvent::TradeExecuted(&trade), &ctx, Utc::now());
                self.apply_actions(actions).await;
            }
            ExchangeEvent::TradeExecutionUpdate(trade) => {
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions = self.chain.handle_event(
                    &ChainEvent::TradeExecutionUpdate(&trade),
                    &ctx,
                    Utc::now(),
                );
                self.apply_actions(actions).await;
            }
            ExchangeEvent::Notification(notification) => {
                if matches!(
                    notification.status,
                    NotificationStatus::Error | NotificationStatus::Failure
                ) {
                    self.notifier
                        .alert(&format!(
                            "order rejected: {} ({})",
                            notification.text, notification.kind
                        ))
                        .await;
                }
                let ctx = ChainContext {
                    books: &self.books,
                    wallets: &self.wallets,
                    orders: &self.orders,
                };
                let actions = self.chain.handle_event(
                    &ChainEvent::Notification(&notification),
                    &ctx,
                    Utc::now(),
                );
                self.apply_actions(actions).await;
            }
            ExchangeEvent::MaintenanceStart => {
                warn!("exchange maintenance window started; trading paused");
                self.maintenance = true;
            }
            ExchangeEvent::MaintenanceEnd => {
                info!("exchange maintenance window ended");
                self.maintenance = false;
            }
        }
    }

    /// One trading-cycle tick: gate, solve, pick the best cycle, and
    /// start the order chain. Solver failures skip the tick; they never
    /// take the process down.
    pub async fn trading_cycle(&mut self) {
        if self.trading {
            debug!("cycle tick skipped: previous cycle still executing");
            return;
        }
        if self.maintenance || !self.config.trading.enabled {
            return;
        }
        if !self.books.has_all_symbols(&self.config.exchange.symbols) {
            debug!("cycle tick skipped: subscriptions not ready");
            return;
        }

        let solver_config = SolverConfig::from(&self.config.trading);
        let policy = SpreadNudge::from_fee(
            self.config.trading.transition_fee,
            self.config.trading.nudge_fraction,
        );
        let report = match CycleSolver::new(&self.books, solver_config, policy)
            .and_then(|solver| solver.solve())
        {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "solve failed; skipping this cycle");
                return;
            }
        };
        self.save_solutions(&report);

        let Some(best) = report.solutions.first() else {
            debug!(
                unprofitable = report.unprofitable,
                unexecutable = report.unexecutable,
                "no profitable cycle this tick"
            );
            return;
        };

        info!(
            path = %best.path.join(" -> "),
            profit = %best.estimated_profit,
            profit_usd = %best.estimated_profit_usd,
            amount = %best.used_amount,
            "executing cycle"
        );
        self.notifier
            .alert(&format!(
                "executing {} for an estimated {} {} ({} USD)",
                best.path.join(" -> "),
                best.estimated_profit,
                self.config.trading.start_currency,
                best.estimated_profit_usd,
            ))
            .await;

        self.cycle_seq += 1;
        let gid = self.cycle_seq;
        let base_cid = Utc::now().timestamp_millis();
        let now = Utc::now();
        for (i, instruction) in best.instructions.iter().enumerate() {
            self.chain.enqueue(
                OrderRequest {
                    gid,
                    cid: base_cid + i as i64,
                    order_type: OrderType::ExchangeLimit,
                    symbol: instruction.symbol.clone(),
                    price: instruction.price,
                    amount: instruction.amount,
                },
                now,
            );
        }
        self.trading = true;

        let ctx = ChainContext {
            books: &self.books,
            wallets: &self.wallets,
            orders: &self.orders,
        };
        let actions = self.chain.process(&ctx, now);
        self.apply_actions(actions).await;
    }

    async fn apply_actions(&mut self, actions: Vec<ChainAction>) {
        for action in actions {
            match action {
                ChainAction::Submit(request) => {
                    if let Err(err) = self.transport.submit_order(&request).await {
                        error!(cid = request.cid, error = %err, "order submission failed");
                    }
                }
                ChainAction::CancelOrder { order_id } => {
                    if let Err(err) = self.transport.cancel_order(order_id).await {
                        error!(order_id, error = %err, "cancel request failed");
                    }
                }
                ChainAction::ArmCancelTimer { token, after } => {
                    self.arm_timer(token, after, TimerKind::Cancel);
                }
                ChainAction::ArmRetryTimer { token, after } => {
                    self.arm_timer(token, after, TimerKind::Retry);
                }
                ChainAction::ClearTimer { token } => {
                    if let Some(handle) = self.timers.remove(&token) {
                        handle.abort();
                    }
                }
                ChainAction::RefreshBalance {
                    wallet_type,
                    currency,
                } => {
                    self.request_balance(wallet_type, &currency).await;
                }
                ChainAction::Complete => self.finish_cycle().await,
            }
        }
    }

    fn arm_timer(&mut self, token: TimerToken, after: Duration, kind: TimerKind) {
        let tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let event = match kind {
                TimerKind::Cancel => BotEvent::CancelTimeout(token),
                TimerKind::Retry => BotEvent::RetryTimer(token),
            };
            if tx.send(event).await.is_err() {
                debug!(?token, "timer fired after bot shutdown");
            }
        });
        self.timers.insert(token, handle);
    }

    async fn finish_cycle(&mut self) {
        info!(cycle = self.cycle_seq, "trading cycle complete");
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        self.chain.clear();
        self.trading = false;
        self.notifier
            .alert(&format!("cycle {} complete", self.cycle_seq))
            .await;
    }

    async fn request_balance(&self, wallet_type: WalletType, currency: &str) {
        if currency.is_empty() {
            return;
        }
        if let Err(err) = self
            .transport
            .request_balance_recalculation(wallet_type, currency)
            .await
        {
            warn!(
                wallet = wallet_type.as_str(),
                currency,
                error = %err,
                "balance recalculation request failed"
            );
        }
    }

    async fn request_missing_balances(&self) {
        for (wallet_type, currency) in self.wallets.missing_available() {
            self.request_balance(wallet_type, &currency).await;
        }
    }

    /// Periodic book dump for offline replay; a no-op without a data dir.
    pub fn save_snapshot(&self) {
        let Some(dir) = &self.config.exchange.data_dir else {
            return;
        };
        let snapshot = self.books.snapshot();
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let path = dir.join(format!("book-{stamp}.json"));
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&path, bytes) {
                    warn!(path = %path.display(), error = %err, "book snapshot write failed");
                } else {
                    debug!(path = %path.display(), "book snapshot saved");
                }
            }
            Err(err) => warn!(error = %err, "book snapshot serialization failed"),
        }
    }

    /// Persists a solve report next to the book snapshots.
    fn save_solutions(&self, report: &SolveReport) {
        let Some(dir) = &self.config.exchange.data_dir else {
            return;
        };
        if report.solutions.is_empty() {
            return;
        }
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let path = dir.join(format!(
            "solutions-{}-{stamp}.json",
            self.config.trading.start_currency
        ));
        match serde_json::to_vec(report) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&path, bytes) {
                    warn!(path = %path.display(), error = %err, "solve report write failed");
                }
            }
            Err(err) => warn!(error = %err, "solve report serialization failed"),
        }
    }
}
