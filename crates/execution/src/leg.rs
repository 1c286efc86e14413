//! One leg of an order chain.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use cycle_trade_bitfinex::messages::OrderRequest;

use crate::chain::TimerToken;

/// A planned order plus everything observed about it so far.
///
/// The lifecycle flags are not mutually exclusive; together they form the
/// leg's compound state. Each flag is the timestamp of the event that set
/// it, so "flag set" and "when" are one field.
#[derive(Debug, Clone)]
pub struct OrderLeg {
    /// The request as it will next be (or was last) submitted; retries
    /// adjust price and amount in place.
    pub request: OrderRequest,

    pub enqueued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Submission attempts so far.
    pub attempts: u32,

    /// True from send until the trade settles or the leg is retired.
    pub processing: bool,
    /// Terminal: the leg needs no further work.
    pub processed: bool,
    /// Terminal without execution (zero amount or below minimum size).
    pub skipped: bool,

    pub placed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub partially_executed_at: Option<DateTime<Utc>>,
    pub execution_updated_at: Option<DateTime<Utc>>,

    /// Exchange order id, learned from the placement event.
    pub order_id: Option<i64>,
    /// Cumulative executed magnitude across partial fills.
    pub executed_amount: Decimal,

    pub(crate) cancel_timer: Option<TimerToken>,
    pub(crate) retry_timer: Option<TimerToken>,
}

impl OrderLeg {
    #[must_use]
    pub fn new(request: OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            request,
            enqueued_at: now,
            sent_at: None,
            attempts: 0,
            processing: false,
            processed: false,
            skipped: false,
            placed_at: None,
            updated_at: None,
            canceled_at: None,
            cancel_requested_at: None,
            executed_at: None,
            partially_executed_at: None,
            execution_updated_at: None,
            order_id: None,
            executed_amount: Decimal::ZERO,
            cancel_timer: None,
            retry_timer: None,
        }
    }

    #[must_use]
    pub fn order_placed(&self) -> bool {
        self.placed_at.is_some()
    }

    #[must_use]
    pub fn order_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }

    #[must_use]
    pub fn trade_executed(&self) -> bool {
        self.executed_at.is_some()
    }

    #[must_use]
    pub fn trade_executed_partially(&self) -> bool {
        self.partially_executed_at.is_some()
    }

    /// Resets placement state before a re-submission. The retried order
    /// is a fresh one, so partial-fill accounting starts over.
    pub(crate) fn reset_for_retry(&mut self) {
        self.placed_at = None;
        self.updated_at = None;
        self.canceled_at = None;
        self.cancel_requested_at = None;
        self.partially_executed_at = None;
        self.order_id = None;
        self.executed_amount = Decimal::ZERO;
        self.processing = false;
    }
}
