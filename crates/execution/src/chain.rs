//! The order-chain state machine.
//!
//! Legs execute strictly one at a time: each hop's proceeds fund the
//! next, so at most one leg is ever in flight. The chain never performs
//! I/O itself — [`OrderChain::process`] and [`OrderChain::handle_event`]
//! return [`ChainAction`]s for the orchestrator to carry out, and timers
//! come back as events carrying the token they were armed with. A token
//! that no longer matches the leg's current timer is stale and ignored,
//! which is what makes duplicate or late timer fires harmless.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, warn};

use cycle_trade_bitfinex::book::BookStore;
use cycle_trade_bitfinex::messages::{
    NotificationRecord, OrderRecord, OrderRequest, TradeRecord,
};
use cycle_trade_bitfinex::orders::OrderStore;
use cycle_trade_bitfinex::wallet::WalletStore;
use cycle_trade_core::config::ChainConfig;
use cycle_trade_core::constants::{
    min_order_size, NotificationStatus, OrderAction, OrderStatus, WalletType,
};
use cycle_trade_core::symbol::symbol_to_pair;

use crate::leg::OrderLeg;

/// Decimal places used when comparing executed against requested amounts.
const AMOUNT_PRECISION: u32 = 8;

/// Identifies one armed timer. Tokens are never reused within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u64);

/// Read access to the shared stores the chain consults while deciding.
#[derive(Clone, Copy)]
pub struct ChainContext<'a> {
    pub books: &'a BookStore,
    pub wallets: &'a WalletStore,
    pub orders: &'a OrderStore,
}

/// Exchange and timer input to the chain.
#[derive(Debug)]
pub enum ChainEvent<'a> {
    OrderNew(&'a OrderRecord),
    OrderUpdate(&'a OrderRecord),
    OrderCanceled(&'a OrderRecord),
    OrderCancelRequested(&'a OrderRecord),
    TradeExecuted(&'a TradeRecord),
    TradeExecutionUpdate(&'a TradeRecord),
    Notification(&'a NotificationRecord),
    CancelTimeout { token: TimerToken },
    RetryTimer { token: TimerToken },
}

/// Effects the orchestrator must perform on the chain's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainAction {
    /// Submit this order via the transport.
    Submit(OrderRequest),
    /// Request cancellation of an order by exchange id.
    CancelOrder { order_id: i64 },
    /// Schedule a cancel-timeout; deliver [`ChainEvent::CancelTimeout`]
    /// with the token when it fires.
    ArmCancelTimer { token: TimerToken, after: Duration },
    /// Schedule a retry delay; deliver [`ChainEvent::RetryTimer`] with
    /// the token when it fires.
    ArmRetryTimer { token: TimerToken, after: Duration },
    /// Abort a previously armed timer.
    ClearTimer { token: TimerToken },
    /// Ask the exchange to recompute an available balance.
    RefreshBalance {
        wallet_type: WalletType,
        currency: String,
    },
    /// Every leg is done; the cycle is complete.
    Complete,
}

/// Sequential executor for the legs of one trading cycle.
#[derive(Debug)]
pub struct OrderChain {
    config: ChainConfig,
    legs: Vec<OrderLeg>,
    completed: bool,
    next_token: u64,
}

impl OrderChain {
    #[must_use]
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            legs: Vec::new(),
            completed: false,
            next_token: 0,
        }
    }

    /// Drops all legs; ready for the next cycle.
    pub fn clear(&mut self) {
        self.legs.clear();
        self.completed = false;
    }

    /// Adds a leg to the end of the chain.
    pub fn enqueue(&mut self, request: OrderRequest, now: DateTime<Utc>) {
        self.legs.push(OrderLeg::new(request, now));
    }

    #[must_use]
    pub fn legs(&self) -> &[OrderLeg] {
        &self.legs
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Starts or resumes the chain: sends the next pending leg unless one
    /// is already in flight.
    pub fn process(&mut self, ctx: &ChainContext<'_>, now: DateTime<Utc>) -> Vec<ChainAction> {
        let mut actions = Vec::new();
        self.advance(ctx, now, &mut actions);
        actions
    }

    /// Single entry point for everything that happens to the chain.
    pub fn handle_event(
        &mut self,
        event: &ChainEvent<'_>,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
    ) -> Vec<ChainAction> {
        let mut actions = Vec::new();
        match event {
            ChainEvent::OrderNew(record) => self.on_order_new(record, now, &mut actions),
            ChainEvent::OrderUpdate(record) => self.on_order_update(record, now),
            ChainEvent::OrderCanceled(record) => {
                self.on_order_canceled(record, ctx, now, &mut actions);
            }
            ChainEvent::OrderCancelRequested(record) => {
                self.on_order_cancel_requested(record, now);
            }
            ChainEvent::TradeExecuted(trade) => {
                self.on_trade_executed(trade, ctx, now, &mut actions);
            }
            ChainEvent::TradeExecutionUpdate(trade) => {
                self.on_trade_execution_update(trade, now);
            }
            ChainEvent::Notification(notification) => {
                self.on_notification(notification, ctx, now, &mut actions);
            }
            ChainEvent::CancelTimeout { token } => {
                self.on_cancel_timeout(*token, ctx, now, &mut actions);
            }
            ChainEvent::RetryTimer { token } => {
                self.on_retry_timer(*token, ctx, now, &mut actions);
            }
        }
        actions
    }

    // -------------------------------------------------------------------------
    // Sending
    // -------------------------------------------------------------------------

    /// Sends the first pending leg, applying the skip rules, or emits
    /// [`ChainAction::Complete`] once when nothing is left.
    fn advance(&mut self, _ctx: &ChainContext<'_>, now: DateTime<Utc>, actions: &mut Vec<ChainAction>) {
        loop {
            let Some(index) = self.legs.iter().position(|l| !l.processed) else {
                if !self.completed && !self.legs.is_empty() {
                    self.completed = true;
                    info!(legs = self.legs.len(), "order chain complete");
                    actions.push(ChainAction::Complete);
                }
                return;
            };

            if self.legs[index].processing {
                // A leg is mid-flight; the next event or timeout moves it.
                return;
            }

            let leg = &mut self.legs[index];
            let magnitude = leg.request.amount.abs().round_dp(AMOUNT_PRECISION);

            // Repeated adjustment can legitimately shrink a leftover to
            // nothing; after enough attempts the leg is retired instead
            // of resubmitted.
            if magnitude.is_zero() && leg.attempts >= self.config.zero_amount_attempts {
                info!(
                    cid = leg.request.cid,
                    attempts = leg.attempts,
                    "skipping leg: amount rounded to zero"
                );
                leg.skipped = true;
                leg.processed = true;
                leg.processing = false;
                continue;
            }

            if let Some(pair) = symbol_to_pair(&leg.request.symbol) {
                let minimum = min_order_size(&pair.base);
                if !magnitude.is_zero() && magnitude < minimum {
                    info!(
                        cid = leg.request.cid,
                        %magnitude,
                        %minimum,
                        "skipping leg: below minimum order size"
                    );
                    leg.skipped = true;
                    leg.processed = true;
                    leg.processing = false;
                    continue;
                }
            }

            leg.processing = true;
            leg.sent_at = Some(now);
            leg.attempts += 1;
            info!(
                cid = leg.request.cid,
                symbol = %leg.request.symbol,
                price = %leg.request.price,
                amount = %leg.request.amount,
                attempt = leg.attempts,
                "placing order"
            );
            actions.push(ChainAction::Submit(leg.request.clone()));
            return;
        }
    }

    // -------------------------------------------------------------------------
    // Exchange events
    // -------------------------------------------------------------------------

    /// Index of the leg currently in flight.
    fn sending_leg(&self) -> Option<usize> {
        self.legs.iter().position(|l| l.processing)
    }

    /// Resolves an order event to the in-flight leg, requiring the client
    /// order id to match. Legs run strictly one at a time, so anything
    /// else is unexpected traffic.
    fn leg_for_order(&self, record: &OrderRecord) -> Option<usize> {
        let index = self.sending_leg()?;
        if self.legs[index].request.cid == record.cid {
            Some(index)
        } else {
            warn!(
                cid = record.cid,
                expected = self.legs[index].request.cid,
                "order event for a cid that is not in flight"
            );
            None
        }
    }

    fn on_order_new(
        &mut self,
        record: &OrderRecord,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        let Some(index) = self.leg_for_order(record) else {
            return;
        };
        let token = self.alloc_token();
        let leg = &mut self.legs[index];
        leg.placed_at = Some(now);
        leg.order_id = Some(record.id);
        debug!(cid = record.cid, order_id = record.id, "order placed");

        // Give the order a bounded time to fill before cancel-and-retry.
        if let Some(stale) = leg.cancel_timer.replace(token) {
            actions.push(ChainAction::ClearTimer { token: stale });
        }
        actions.push(ChainAction::ArmCancelTimer {
            token,
            after: self.config.cancel_timeout(),
        });
    }

    fn on_order_update(&mut self, record: &OrderRecord, now: DateTime<Utc>) {
        if let Some(index) = self.leg_for_order(record) {
            self.legs[index].updated_at = Some(now);
            self.legs[index].order_id = Some(record.id);
        }
    }

    fn on_order_canceled(
        &mut self,
        record: &OrderRecord,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        let Some(index) = self.leg_for_order(record) else {
            return;
        };
        self.legs[index].canceled_at = Some(now);

        let canceled_in_store = record.status == OrderStatus::Canceled
            || ctx
                .orders
                .order_by_cid(record.cid)
                .is_some_and(|o| o.status == OrderStatus::Canceled);
        if !canceled_in_store {
            return;
        }

        // Cancellation frees reserved funds; refresh the balance and give
        // the exchange a settle delay before re-pricing the leg.
        let (wallet_type, currency) = self.funding_source(index);
        actions.push(ChainAction::RefreshBalance {
            wallet_type,
            currency,
        });
        let token = self.alloc_token();
        let leg = &mut self.legs[index];
        if let Some(stale) = leg.retry_timer.replace(token) {
            actions.push(ChainAction::ClearTimer { token: stale });
        }
        actions.push(ChainAction::ArmRetryTimer {
            token,
            after: self.config.retry_delay(),
        });
    }

    fn on_order_cancel_requested(&mut self, record: &OrderRecord, now: DateTime<Utc>) {
        if let Some(index) = self.leg_for_order(record) {
            self.legs[index].cancel_requested_at = Some(now);
        }
    }

    fn on_trade_executed(
        &mut self,
        trade: &TradeRecord,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        let Some(index) = self.leg_for_trade(trade) else {
            warn!(order_id = trade.order_id, "trade event with no matching leg");
            return;
        };
        if self.legs[index].processed {
            debug!(order_id = trade.order_id, "duplicate trade event for settled leg");
            return;
        }

        let leg = &mut self.legs[index];
        leg.executed_amount += trade.exec_amount.abs();

        let requested = leg.request.amount.abs().round_dp(AMOUNT_PRECISION);
        let executed = leg.executed_amount.round_dp(AMOUNT_PRECISION);

        if executed >= requested {
            leg.executed_at = Some(now);
            leg.processed = true;
            leg.processing = false;
            info!(
                cid = leg.request.cid,
                %executed,
                "leg fully executed"
            );
            for token in [leg.cancel_timer.take(), leg.retry_timer.take()]
                .into_iter()
                .flatten()
            {
                actions.push(ChainAction::ClearTimer { token });
            }
            // Move straight on to the next leg.
            self.advance(ctx, now, actions);
        } else {
            leg.partially_executed_at = Some(now);
            info!(
                cid = leg.request.cid,
                %executed,
                %requested,
                "leg partially executed"
            );
            // The remainder gets a longer window before cancel-and-retry.
            let token = self.alloc_token();
            let leg = &mut self.legs[index];
            if let Some(stale) = leg.cancel_timer.replace(token) {
                actions.push(ChainAction::ClearTimer { token: stale });
            }
            actions.push(ChainAction::ArmCancelTimer {
                token,
                after: self.config.partial_fill_timeout(),
            });
        }
    }

    fn on_trade_execution_update(&mut self, trade: &TradeRecord, now: DateTime<Utc>) {
        // Fee and settlement detail; no state transition.
        if let Some(index) = self.leg_for_trade(trade) {
            self.legs[index].execution_updated_at = Some(now);
        } else {
            debug!(order_id = trade.order_id, "execution update with no matching leg");
        }
    }

    /// Resolves a trade to a leg by exchange order id; falls back to the
    /// in-flight leg when the trade races ahead of its placement event.
    fn leg_for_trade(&self, trade: &TradeRecord) -> Option<usize> {
        self.legs
            .iter()
            .position(|l| l.order_id == Some(trade.order_id))
            .or_else(|| {
                self.sending_leg()
                    .filter(|i| self.legs[*i].order_id.is_none())
            })
    }

    fn on_notification(
        &mut self,
        notification: &NotificationRecord,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        match notification.status {
            NotificationStatus::Success => {
                debug!(kind = %notification.kind, text = %notification.text, "notification ok");
            }
            NotificationStatus::Error | NotificationStatus::Failure => {
                // Rejected order: same recovery as a timeout on a dead
                // order — adjust and resubmit.
                let index = notification
                    .order_cid
                    .and_then(|cid| self.legs.iter().position(|l| l.request.cid == cid))
                    .or_else(|| self.sending_leg());
                warn!(
                    kind = %notification.kind,
                    text = %notification.text,
                    "order rejected by exchange"
                );
                if let Some(index) = index {
                    self.retry_leg(index, ctx, now, actions);
                }
            }
            NotificationStatus::Unknown => {
                warn!(
                    status = %notification.status_raw,
                    text = %notification.text,
                    "unrecognized notification status; upstream API contract may have changed"
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Timers and retries
    // -------------------------------------------------------------------------

    fn on_cancel_timeout(
        &mut self,
        token: TimerToken,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        let Some(index) = self
            .legs
            .iter()
            .position(|l| l.cancel_timer == Some(token))
        else {
            debug!(?token, "stale cancel timeout");
            return;
        };
        self.legs[index].cancel_timer = None;
        if self.legs[index].processed {
            return;
        }

        let cid = self.legs[index].request.cid;
        if let Some(order) = ctx.orders.order_by_cid(cid) {
            if order.status == OrderStatus::Active {
                // Still resting on the book: cancel it and wait for the
                // cancellation event to drive the retry.
                info!(cid, order_id = order.id, "cancel timeout: canceling resting order");
                self.legs[index].cancel_requested_at = Some(now);
                actions.push(ChainAction::CancelOrder { order_id: order.id });
                return;
            }
        }

        // The order is already gone (filled elsewhere, rejected, never
        // placed): re-price against current state and resubmit.
        self.retry_leg(index, ctx, now, actions);
    }

    fn on_retry_timer(
        &mut self,
        token: TimerToken,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        let Some(index) = self
            .legs
            .iter()
            .position(|l| l.retry_timer == Some(token))
        else {
            debug!(?token, "stale retry timer");
            return;
        };
        self.legs[index].retry_timer = None;
        if self.legs[index].processed {
            return;
        }
        self.retry_leg(index, ctx, now, actions);
    }

    /// Adjust-and-resubmit path shared by timeouts, cancellations, and
    /// rejections.
    fn retry_leg(
        &mut self,
        index: usize,
        ctx: &ChainContext<'_>,
        now: DateTime<Utc>,
        actions: &mut Vec<ChainAction>,
    ) {
        if self.legs[index].processed {
            return;
        }

        if self.adjust_price_and_amount(index, ctx) {
            self.legs[index].reset_for_retry();
            // The leg is first in line again; advance applies the skip
            // rules and re-sends it.
            self.advance(ctx, now, actions);
        } else {
            // Balance or price unknown; ask for a recalculation and try
            // again shortly.
            debug!(
                cid = self.legs[index].request.cid,
                "adjustment impossible; refreshing balance and rearming"
            );
            let (wallet_type, currency) = self.funding_source(index);
            actions.push(ChainAction::RefreshBalance {
                wallet_type,
                currency,
            });
            let token = self.alloc_token();
            let leg = &mut self.legs[index];
            if let Some(stale) = leg.retry_timer.replace(token) {
                actions.push(ChainAction::ClearTimer { token: stale });
            }
            actions.push(ChainAction::ArmRetryTimer {
                token,
                after: self.config.retry_delay(),
            });
        }
    }

    /// Re-derives price and amount for a retry from the live book and the
    /// available balance. Returns false when either input is unknown; the
    /// leg must not be resubmitted in that case.
    fn adjust_price_and_amount(&mut self, index: usize, ctx: &ChainContext<'_>) -> bool {
        let leg = &self.legs[index];
        if symbol_to_pair(&leg.request.symbol).is_none() {
            return false;
        }
        let action = OrderAction::from_signed_amount(leg.request.amount);
        let (wallet_type, funding_currency) = self.funding_source(index);

        let Some(available) = ctx
            .wallets
            .available_balance(wallet_type, &funding_currency)
        else {
            return false;
        };
        let Some(best) = ctx.books.best_limit_price(&leg.request.symbol, action) else {
            return false;
        };

        // Walk the price toward the spread to improve the fill odds.
        let nudge = self.config.retry_price_nudge;
        let price = match action {
            OrderAction::Buy => best * (Decimal::ONE + nudge),
            OrderAction::Sell => best * (Decimal::ONE - nudge),
        };
        if price <= Decimal::ZERO {
            return false;
        }

        // Fit the amount inside the available balance, keeping the fee
        // headroom and the original direction.
        let affordable = match action {
            OrderAction::Buy => available / price,
            OrderAction::Sell => available,
        };
        let magnitude = leg.request.amount.abs().min(affordable)
            * (Decimal::ONE - self.config.transition_fee);
        let amount = match action {
            OrderAction::Buy => magnitude,
            OrderAction::Sell => -magnitude,
        };

        let leg = &mut self.legs[index];
        debug!(
            cid = leg.request.cid,
            old_price = %leg.request.price,
            new_price = %price,
            old_amount = %leg.request.amount,
            new_amount = %amount,
            "adjusted order for retry"
        );
        leg.request.price = price;
        leg.request.amount = amount;
        true
    }

    /// The wallet slot that funds a leg: the quote currency for a buy,
    /// the base for a sell. Exchange-wallet order types spend from the
    /// exchange wallet.
    fn funding_source(&self, index: usize) -> (WalletType, String) {
        let leg = &self.legs[index];
        let currency = match symbol_to_pair(&leg.request.symbol) {
            Some(pair) => match OrderAction::from_signed_amount(leg.request.amount) {
                OrderAction::Buy => pair.quote,
                OrderAction::Sell => pair.base,
            },
            None => String::new(),
        };
        (WalletType::Exchange, currency)
    }

    fn alloc_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cycle_trade_bitfinex::messages::{BookLevel, BookUpdate, WalletRecord};
    use cycle_trade_core::constants::OrderType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn request(cid: i64, symbol: &str, price: Decimal, amount: Decimal) -> OrderRequest {
        OrderRequest {
            gid: 1,
            cid,
            order_type: OrderType::ExchangeLimit,
            symbol: symbol.to_string(),
            price,
            amount,
        }
    }

    fn order_record(id: i64, cid: i64, symbol: &str, status: OrderStatus) -> OrderRecord {
        OrderRecord {
            id,
            gid: Some(1),
            cid,
            symbol: symbol.to_string(),
            mts_create: 0,
            mts_update: 0,
            amount: dec!(50),
            amount_orig: dec!(50),
            order_type: "EXCHANGE LIMIT".to_string(),
            status,
            price: dec!(0.48),
            price_avg: Decimal::ZERO,
        }
    }

    fn trade(order_id: i64, exec_amount: Decimal) -> TradeRecord {
        TradeRecord {
            id: order_id * 10,
            symbol: "tIOTUSD".to_string(),
            mts: 0,
            order_id,
            exec_amount,
            exec_price: dec!(0.48),
            maker: Some(true),
            fee: None,
            fee_currency: None,
        }
    }

    fn notification(status: &str, cid: Option<i64>) -> NotificationRecord {
        NotificationRecord {
            mts: 0,
            kind: "on-req".to_string(),
            status: NotificationStatus::parse(status),
            status_raw: status.to_string(),
            text: "Invalid order".to_string(),
            order_id: None,
            order_cid: cid,
        }
    }

    struct Stores {
        books: BookStore,
        wallets: WalletStore,
        orders: OrderStore,
    }

    impl Stores {
        fn seeded() -> Self {
            let mut books = BookStore::new();
            books.update(
                "tIOTUSD",
                &BookUpdate::Snapshot(vec![
                    BookLevel {
                        price: dec!(0.48),
                        count: 2,
                        amount: dec!(500),
                    },
                    BookLevel {
                        price: dec!(0.50),
                        count: 2,
                        amount: dec!(-500),
                    },
                ]),
            );
            let mut wallets = WalletStore::new();
            wallets.update(&WalletRecord {
                wallet_type: WalletType::Exchange,
                currency: "IOT".to_string(),
                balance: dec!(45),
                unsettled: Decimal::ZERO,
                available: Some(dec!(45)),
            });
            wallets.update(&WalletRecord {
                wallet_type: WalletType::Exchange,
                currency: "USD".to_string(),
                balance: dec!(100),
                unsettled: Decimal::ZERO,
                available: Some(dec!(100)),
            });
            Self {
                books,
                wallets,
                orders: OrderStore::new(),
            }
        }

        fn ctx(&self) -> ChainContext<'_> {
            ChainContext {
                books: &self.books,
                wallets: &self.wallets,
                orders: &self.orders,
            }
        }
    }

    fn submitted_cid(actions: &[ChainAction]) -> Option<i64> {
        actions.iter().find_map(|a| match a {
            ChainAction::Submit(request) => Some(request.cid),
            _ => None,
        })
    }

    fn cancel_token(actions: &[ChainAction]) -> Option<TimerToken> {
        actions.iter().find_map(|a| match a {
            ChainAction::ArmCancelTimer { token, .. } => Some(*token),
            _ => None,
        })
    }

    fn retry_token(actions: &[ChainAction]) -> Option<TimerToken> {
        actions.iter().find_map(|a| match a {
            ChainAction::ArmRetryTimer { token, .. } => Some(*token),
            _ => None,
        })
    }

    #[test]
    fn test_full_fill_sequence_completes_once() {
        let stores = Stores::seeded();
        let ctx = stores.ctx();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.48), dec!(-50)), now());
        chain.enqueue(request(101, "tIOTUSD", dec!(0.49), dec!(50)), now());

        let actions = chain.process(&ctx, now());
        assert_eq!(submitted_cid(&actions), Some(100));

        let mut completions = 0;
        let mut all_actions = Vec::new();
        for (id, cid) in [(1i64, 100i64), (2, 101)] {
            let placed = order_record(id, cid, "tIOTUSD", OrderStatus::Active);
            let actions = chain.handle_event(&ChainEvent::OrderNew(&placed), &ctx, now());
            assert!(cancel_token(&actions).is_some());

            let actions =
                chain.handle_event(&ChainEvent::TradeExecuted(&trade(id, dec!(-50))), &ctx, now());
            completions += actions
                .iter()
                .filter(|a| matches!(a, ChainAction::Complete))
                .count();
            all_actions.extend(actions);
        }

        assert_eq!(completions, 1);
        assert!(chain.is_completed());
        assert!(chain.legs().iter().all(|l| l.processed && !l.processing));
        // The second leg was submitted as part of the first fill's actions.
        assert!(all_actions
            .iter()
            .any(|a| matches!(a, ChainAction::Submit(r) if r.cid == 101)));
    }

    #[test]
    fn test_partial_fill_holds_leg_open_until_remainder() {
        let stores = Stores::seeded();
        let ctx = stores.ctx();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.48), dec!(-50)), now());

        chain.process(&ctx, now());
        let placed = order_record(1, 100, "tIOTUSD", OrderStatus::Active);
        chain.handle_event(&ChainEvent::OrderNew(&placed), &ctx, now());

        let actions =
            chain.handle_event(&ChainEvent::TradeExecuted(&trade(1, dec!(-30))), &ctx, now());
        let leg = &chain.legs()[0];
        assert!(leg.trade_executed_partially());
        assert!(!leg.processed);
        assert!(leg.processing);
        // The partial fill re-arms a longer cancel window.
        let rearmed = actions.iter().find_map(|a| match a {
            ChainAction::ArmCancelTimer { after, .. } => Some(*after),
            _ => None,
        });
        assert_eq!(rearmed, Some(Duration::from_secs(60)));

        let actions =
            chain.handle_event(&ChainEvent::TradeExecuted(&trade(1, dec!(-20))), &ctx, now());
        assert!(actions.iter().any(|a| matches!(a, ChainAction::Complete)));
        let leg = &chain.legs()[0];
        assert!(leg.processed);
        assert!(!leg.trade_executed_partially() || leg.trade_executed());
        assert_eq!(leg.executed_amount, dec!(50));
    }

    #[test]
    fn test_cancel_timeout_cancels_active_order_then_retries() {
        let mut stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.50), dec!(-50)), now());

        chain.process(&stores.ctx(), now());
        stores
            .orders
            .update(&order_record(1, 100, "tIOTUSD", OrderStatus::Active));
        let placed = order_record(1, 100, "tIOTUSD", OrderStatus::Active);
        let actions = chain.handle_event(&ChainEvent::OrderNew(&placed), &stores.ctx(), now());
        let token = cancel_token(&actions).unwrap();

        // Timeout fires while the order is still resting: cancel it.
        let actions = chain.handle_event(
            &ChainEvent::CancelTimeout { token },
            &stores.ctx(),
            now(),
        );
        assert!(actions
            .iter()
            .any(|a| matches!(a, ChainAction::CancelOrder { order_id: 1 })));
        assert!(chain.legs()[0].cancel_requested_at.is_some());

        // The cancellation lands: balance refresh plus a settle delay.
        stores
            .orders
            .update(&order_record(1, 100, "tIOTUSD", OrderStatus::Canceled));
        let canceled = order_record(1, 100, "tIOTUSD", OrderStatus::Canceled);
        let actions =
            chain.handle_event(&ChainEvent::OrderCanceled(&canceled), &stores.ctx(), now());
        assert!(actions.iter().any(|a| matches!(
            a,
            ChainAction::RefreshBalance { wallet_type: WalletType::Exchange, currency } if currency == "IOT"
        )));
        let token = retry_token(&actions).unwrap();

        // After the delay the leg is re-priced and resubmitted.
        let actions =
            chain.handle_event(&ChainEvent::RetryTimer { token }, &stores.ctx(), now());
        let resubmitted = actions
            .iter()
            .find_map(|a| match a {
                ChainAction::Submit(request) => Some(request.clone()),
                _ => None,
            })
            .expect("leg resubmitted");
        // Sell re-priced just under the best ask, amount fitted to the
        // 45 IOT available less fee headroom.
        assert_eq!(resubmitted.price, dec!(0.50) * dec!(0.9995));
        assert_eq!(resubmitted.amount, dec!(-45) * dec!(0.998));
        let leg = &chain.legs()[0];
        assert_eq!(leg.attempts, 2);
        assert!(leg.processing);
        assert!(!leg.order_placed());
        assert!(!leg.order_canceled());
    }

    #[test]
    fn test_cancel_timeout_on_dead_order_resubmits_directly() {
        let mut stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.50), dec!(-50)), now());

        chain.process(&stores.ctx(), now());
        stores
            .orders
            .update(&order_record(1, 100, "tIOTUSD", OrderStatus::Canceled));
        let placed = order_record(1, 100, "tIOTUSD", OrderStatus::Active);
        let actions = chain.handle_event(&ChainEvent::OrderNew(&placed), &stores.ctx(), now());
        let token = cancel_token(&actions).unwrap();

        let actions = chain.handle_event(
            &ChainEvent::CancelTimeout { token },
            &stores.ctx(),
            now(),
        );
        assert!(submitted_cid(&actions).is_some());
        assert_eq!(chain.legs()[0].attempts, 2);
    }

    #[test]
    fn test_adjustment_failure_requests_balance_and_rearms() {
        let stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        // ETH balance was never reported, so adjustment cannot price it.
        chain.enqueue(request(100, "tETHUSD", dec!(450), dec!(-1)), now());

        chain.process(&stores.ctx(), now());
        let placed = order_record(1, 100, "tETHUSD", OrderStatus::Active);
        let actions = chain.handle_event(&ChainEvent::OrderNew(&placed), &stores.ctx(), now());
        let token = cancel_token(&actions).unwrap();

        let actions = chain.handle_event(
            &ChainEvent::CancelTimeout { token },
            &stores.ctx(),
            now(),
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            ChainAction::RefreshBalance { currency, .. } if currency == "ETH"
        )));
        assert!(retry_token(&actions).is_some());
        // Still in flight; nothing was resubmitted blind.
        assert!(submitted_cid(&actions).is_none());
        assert!(chain.legs()[0].processing);
    }

    #[test]
    fn test_notification_error_routes_into_retry() {
        let stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.50), dec!(-50)), now());
        chain.process(&stores.ctx(), now());

        let rejected = notification("ERROR", Some(100));
        let actions =
            chain.handle_event(&ChainEvent::Notification(&rejected), &stores.ctx(), now());
        assert!(submitted_cid(&actions).is_some());
        assert_eq!(chain.legs()[0].attempts, 2);
    }

    #[test]
    fn test_unknown_notification_status_is_surfaced_but_inert() {
        let stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.50), dec!(-50)), now());
        chain.process(&stores.ctx(), now());

        let odd = notification("DEFERRED", Some(100));
        let actions = chain.handle_event(&ChainEvent::Notification(&odd), &stores.ctx(), now());
        assert!(actions.is_empty());
        assert_eq!(chain.legs()[0].attempts, 1);
    }

    #[test]
    fn test_below_minimum_leg_is_skipped() {
        let stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        // 0.05 IOT is under the 0.1 minimum for IOT pairs.
        chain.enqueue(request(100, "tIOTUSD", dec!(0.48), dec!(0.05)), now());
        chain.enqueue(request(101, "tIOTUSD", dec!(0.48), dec!(-50)), now());

        let actions = chain.process(&stores.ctx(), now());
        assert!(chain.legs()[0].skipped);
        assert!(chain.legs()[0].processed);
        assert_eq!(submitted_cid(&actions), Some(101));
    }

    #[test]
    fn test_zero_amount_leg_retires_after_attempt_cutoff() {
        let stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.48), Decimal::ZERO), now());

        let actions = chain.process(&stores.ctx(), now());
        assert_eq!(submitted_cid(&actions), Some(100));

        // Each rejection adjusts (to a still-zero amount) and resends,
        // until the attempt cutoff retires the leg.
        let rejected = notification("ERROR", Some(100));
        let mut complete = false;
        for _ in 0..3 {
            let actions =
                chain.handle_event(&ChainEvent::Notification(&rejected), &stores.ctx(), now());
            complete |= actions.iter().any(|a| matches!(a, ChainAction::Complete));
        }
        assert!(complete);
        let leg = &chain.legs()[0];
        assert!(leg.skipped);
        assert!(leg.processed);
        assert_eq!(leg.attempts, 3);
    }

    #[test]
    fn test_stale_timer_tokens_are_ignored() {
        let stores = Stores::seeded();
        let mut chain = OrderChain::new(ChainConfig::default());
        chain.enqueue(request(100, "tIOTUSD", dec!(0.48), dec!(-50)), now());
        chain.process(&stores.ctx(), now());

        let actions = chain.handle_event(
            &ChainEvent::CancelTimeout {
                token: TimerToken(999),
            },
            &stores.ctx(),
            now(),
        );
        assert!(actions.is_empty());
        let actions = chain.handle_event(
            &ChainEvent::RetryTimer {
                token: TimerToken(998),
            },
            &stores.ctx(),
            now(),
        );
        assert!(actions.is_empty());
    }

    /// Property: no interleaving of per-leg event streams ever puts two
    /// legs in flight at once, and every run completes the chain.
    #[test]
    fn test_single_flight_invariant_under_random_interleavings() {
        for seed in 0..32u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let stores = Stores::seeded();
            let ctx = stores.ctx();
            let mut chain = OrderChain::new(ChainConfig::default());
            let cids = [100i64, 101, 102];
            for (i, cid) in cids.iter().enumerate() {
                let amount = if i % 2 == 0 { dec!(-50) } else { dec!(50) };
                chain.enqueue(request(*cid, "tIOTUSD", dec!(0.48), amount), now());
            }

            // Per-leg causal event queues, created when the leg is
            // actually submitted. Partial fills make the streams uneven.
            let mut queues: Vec<VecDeque<(i64, &str)>> = Vec::new();
            let open_queue = |cid: i64, queues: &mut Vec<VecDeque<(i64, &str)>>| {
                let order_id = cid - 99; // 100 -> 1, 101 -> 2, ...
                queues.push(VecDeque::from(vec![
                    (order_id, "on"),
                    (order_id, "ou"),
                    (order_id, "te-partial"),
                    (order_id, "te-rest"),
                    (order_id, "tu"),
                ]));
            };

            let actions = chain.process(&ctx, now());
            open_queue(submitted_cid(&actions).unwrap(), &mut queues);

            let mut steps = 0;
            while queues.iter().any(|q| !q.is_empty()) {
                steps += 1;
                assert!(steps < 1000, "interleaving did not converge");

                let candidates: Vec<usize> = queues
                    .iter()
                    .enumerate()
                    .filter(|(_, q)| !q.is_empty())
                    .map(|(i, _)| i)
                    .collect();
                let pick = candidates[rng.gen_range(0..candidates.len())];
                let (order_id, kind) = queues[pick].pop_front().unwrap();
                let cid = order_id + 99;

                let record = order_record(order_id, cid, "tIOTUSD", OrderStatus::Active);
                let actions = match kind {
                    "on" => chain.handle_event(&ChainEvent::OrderNew(&record), &ctx, now()),
                    "ou" => chain.handle_event(&ChainEvent::OrderUpdate(&record), &ctx, now()),
                    "te-partial" => chain.handle_event(
                        &ChainEvent::TradeExecuted(&trade(order_id, dec!(-30))),
                        &ctx,
                        now(),
                    ),
                    "te-rest" => chain.handle_event(
                        &ChainEvent::TradeExecuted(&trade(order_id, dec!(-20))),
                        &ctx,
                        now(),
                    ),
                    "tu" => chain.handle_event(
                        &ChainEvent::TradeExecutionUpdate(&trade(order_id, dec!(-50))),
                        &ctx,
                        now(),
                    ),
                    _ => unreachable!(),
                };

                // The invariant under test: at most one leg in flight.
                let in_flight = chain.legs().iter().filter(|l| l.processing).count();
                assert!(in_flight <= 1, "seed {seed}: {in_flight} legs in flight");

                if let Some(cid) = submitted_cid(&actions) {
                    open_queue(cid, &mut queues);
                }
            }

            assert!(chain.is_completed(), "seed {seed}: chain did not complete");
            assert!(chain.legs().iter().all(|l| l.processed));
        }
    }
}

