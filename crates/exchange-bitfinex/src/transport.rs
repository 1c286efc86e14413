//! Collaborator seams: the connection layer and the operator channel.
//!
//! The websocket/REST plumbing lives outside this workspace's core; it
//! implements [`Transport`] and feeds decoded [`ExchangeEvent`]s into the
//! bot's channel. Sends are fire-and-forget: outcomes arrive later as
//! account or notification events.

use async_trait::async_trait;

use cycle_trade_core::constants::WalletType;

use crate::messages::{
    BookUpdate, NotificationRecord, OrderRecord, OrderRequest, TradeRecord, WalletRecord,
};

/// Everything the exchange pushes that the core consumes.
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    Book {
        symbol: String,
        update: BookUpdate,
    },
    WalletSnapshot(Vec<WalletRecord>),
    WalletUpdate(WalletRecord),
    OrderSnapshot(Vec<OrderRecord>),
    OrderNew(OrderRecord),
    OrderUpdate(OrderRecord),
    OrderCancel(OrderRecord),
    OrderCancelRequested(OrderRecord),
    TradeExecuted(TradeRecord),
    TradeExecutionUpdate(TradeRecord),
    Notification(NotificationRecord),
    /// The exchange entered a maintenance window; trading must pause.
    MaintenanceStart,
    MaintenanceEnd,
}

/// Outbound order operations, implemented by the connection layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submits a new order. The placement outcome arrives asynchronously.
    async fn submit_order(&self, request: &OrderRequest) -> anyhow::Result<()>;

    /// Requests cancellation of an order by exchange id.
    async fn cancel_order(&self, order_id: i64) -> anyhow::Result<()>;

    /// Asks the exchange to recompute an available balance that arrived
    /// as null.
    async fn request_balance_recalculation(
        &self,
        wallet_type: WalletType,
        currency: &str,
    ) -> anyhow::Result<()>;
}

/// Operator alerting channel (e.g. a messenger bot); delivery is best
/// effort and must never block trading.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alert(&self, text: &str);
}

/// Default notifier that routes alerts into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, text: &str) {
        tracing::info!(alert = text, "operator alert");
    }
}
