//! Order record store.
//!
//! Keeps every order the account channel has reported, keyed by exchange
//! order id with a secondary client-order-id index. Records are updated
//! in place and never deleted; the session history stays queryable.

use std::collections::HashMap;

use cycle_trade_core::constants::OrderStatus;

use crate::messages::OrderRecord;

#[derive(Debug, Default)]
pub struct OrderStore {
    orders: HashMap<i64, OrderRecord>,
    by_cid: HashMap<i64, i64>,
}

impl OrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts one order record by id.
    pub fn update(&mut self, record: &OrderRecord) {
        self.by_cid.insert(record.cid, record.id);
        self.orders.insert(record.id, record.clone());
    }

    /// Upserts every record of an order snapshot.
    pub fn update_all(&mut self, records: &[OrderRecord]) {
        for record in records {
            self.update(record);
        }
    }

    #[must_use]
    pub fn order_by_id(&self, id: i64) -> Option<&OrderRecord> {
        self.orders.get(&id)
    }

    #[must_use]
    pub fn order_by_cid(&self, cid: i64) -> Option<&OrderRecord> {
        self.orders.get(self.by_cid.get(&cid)?)
    }

    #[must_use]
    pub fn orders_by_gid(&self, gid: i64) -> Vec<&OrderRecord> {
        self.orders
            .values()
            .filter(|o| o.gid == Some(gid))
            .collect()
    }

    #[must_use]
    pub fn active_orders(&self) -> Vec<&OrderRecord> {
        self.orders
            .values()
            .filter(|o| o.status == OrderStatus::Active)
            .collect()
    }

    #[must_use]
    pub fn has_active_orders(&self) -> bool {
        self.orders
            .values()
            .any(|o| o.status == OrderStatus::Active)
    }

    #[must_use]
    pub fn is_order_active_by_cid(&self, cid: i64) -> bool {
        self.order_by_cid(cid)
            .is_some_and(|o| o.status == OrderStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(id: i64, cid: i64, status: OrderStatus) -> OrderRecord {
        OrderRecord {
            id,
            gid: Some(7),
            cid,
            symbol: "tIOTUSD".to_string(),
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

    #[test]
    fn test_update_indexes_by_id_and_cid() {
        let mut store = OrderStore::new();
        store.update(&order(1, 100, OrderStatus::Active));

        assert_eq!(store.order_by_id(1).unwrap().cid, 100);
        assert_eq!(store.order_by_cid(100).unwrap().id, 1);
        assert!(store.order_by_cid(999).is_none());
    }

    #[test]
    fn test_update_in_place_changes_status() {
        let mut store = OrderStore::new();
        store.update(&order(1, 100, OrderStatus::Active));
        assert!(store.is_order_active_by_cid(100));

        store.update(&order(1, 100, OrderStatus::Canceled));
        assert!(!store.is_order_active_by_cid(100));
        assert_eq!(store.order_by_id(1).unwrap().status, OrderStatus::Canceled);
    }

    #[test]
    fn test_active_order_queries() {
        let mut store = OrderStore::new();
        store.update_all(&[
            order(1, 100, OrderStatus::Active),
            order(2, 101, OrderStatus::Executed),
            order(3, 102, OrderStatus::Canceled),
        ]);

        assert!(store.has_active_orders());
        assert_eq!(store.active_orders().len(), 1);
        assert_eq!(store.orders_by_gid(7).len(), 3);
    }
}
