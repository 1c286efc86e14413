//! Paper transport: a simulated exchange for replay and tests.
//!
//! Every submitted order is acknowledged and fully filled at its limit
//! price as a maker, with the matching account events posted back into
//! the bot's channel in wire order (`on`, `te`, `tu`). No real I/O.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use cycle_trade_bitfinex::messages::{OrderRecord, OrderRequest, TradeRecord};
use cycle_trade_bitfinex::transport::{ExchangeEvent, Transport};
use cycle_trade_core::constants::{OrderStatus, WalletType};

use crate::events::BotEvent;

pub struct PaperTransport {
    events: mpsc::Sender<BotEvent>,
    next_order_id: AtomicI64,
    submitted: Arc<Mutex<Vec<OrderRequest>>>,
}

impl PaperTransport {
    #[must_use]
    pub fn new(events: mpsc::Sender<BotEvent>) -> Self {
        Self {
            events,
            next_order_id: AtomicI64::new(1),
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request submitted so far, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().expect("submission log poisoned").clone()
    }

    async fn emit(&self, event: ExchangeEvent) -> anyhow::Result<()> {
        self.events
            .send(BotEvent::Exchange(event))
            .await
            .map_err(|_| anyhow::anyhow!("bot event channel closed"))
    }
}

#[async_trait]
impl Transport for PaperTransport {
    async fn submit_order(&self, request: &OrderRequest) -> anyhow::Result<()> {
        self.submitted
            .lock()
            .expect("submission log poisoned")
            .push(request.clone());

        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now().timestamp_millis();

        let placed = OrderRecord {
            id: order_id,
            gid: Some(request.gid),
            cid: request.cid,
            symbol: request.symbol.clone(),
            mts_create: now,
            mts_update: now,
            amount: request.amount,
            amount_orig: request.amount,
            order_type: request.order_type.as_str().to_string(),
            status: OrderStatus::Active,
            price: request.price,
            price_avg: Decimal::ZERO,
        };
        self.emit(ExchangeEvent::OrderNew(placed)).await?;

        let trade = TradeRecord {
            id: order_id * 10,
            symbol: request.symbol.clone(),
            mts: now,
            order_id,
            exec_amount: request.amount,
            exec_price: request.price,
            maker: Some(true),
            fee: None,
            fee_currency: None,
        };
        self.emit(ExchangeEvent::TradeExecuted(trade.clone())).await?;
        self.emit(ExchangeEvent::TradeExecutionUpdate(trade)).await?;
        Ok(())
    }

    async fn cancel_order(&self, order_id: i64) -> anyhow::Result<()> {
        // Paper orders fill instantly, so there is never anything to cancel.
        debug!(order_id, "paper cancel ignored");
        Ok(())
    }

    async fn request_balance_recalculation(
        &self,
        wallet_type: WalletType,
        currency: &str,
    ) -> anyhow::Result<()> {
        debug!(wallet = wallet_type.as_str(), currency, "paper balance recalculation");
        Ok(())
    }
}
