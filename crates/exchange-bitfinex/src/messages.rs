//! Typed wire records.
//!
//! The exchange sends positional JSON arrays; every record kind here owns
//! a `decode` that validates arity and field types before anything else
//! touches the data. Indices follow the v2 wire layout.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cycle_trade_core::constants::{BookSide, NotificationStatus, OrderStatus, OrderType, WalletType};

use crate::error::DecodeError;

fn as_array<'a>(value: &'a Value, record: &'static str) -> Result<&'a [Value], DecodeError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or(DecodeError::NotArray(record))
}

fn require_len(
    fields: &[Value],
    expected: usize,
    record: &'static str,
) -> Result<(), DecodeError> {
    if fields.len() < expected {
        return Err(DecodeError::Arity {
            record,
            expected,
            actual: fields.len(),
        });
    }
    Ok(())
}

fn decimal_at(
    fields: &[Value],
    index: usize,
    record: &'static str,
    name: &'static str,
) -> Result<Decimal, DecodeError> {
    let value = &fields[index];
    if let Some(i) = value.as_i64() {
        return Ok(Decimal::from(i));
    }
    value
        .as_f64()
        .and_then(Decimal::from_f64)
        .ok_or_else(|| DecodeError::field(record, index, name, "number"))
}

fn optional_decimal_at(
    fields: &[Value],
    index: usize,
    record: &'static str,
    name: &'static str,
) -> Result<Option<Decimal>, DecodeError> {
    if fields.get(index).map_or(true, Value::is_null) {
        return Ok(None);
    }
    decimal_at(fields, index, record, name).map(Some)
}

fn i64_at(
    fields: &[Value],
    index: usize,
    record: &'static str,
    name: &'static str,
) -> Result<i64, DecodeError> {
    fields[index]
        .as_i64()
        .ok_or_else(|| DecodeError::field(record, index, name, "integer"))
}

fn optional_i64_at(fields: &[Value], index: usize) -> Option<i64> {
    fields.get(index).and_then(Value::as_i64)
}

fn str_at<'a>(
    fields: &'a [Value],
    index: usize,
    record: &'static str,
    name: &'static str,
) -> Result<&'a str, DecodeError> {
    fields[index]
        .as_str()
        .ok_or_else(|| DecodeError::field(record, index, name, "string"))
}

// =============================================================================
// Book levels
// =============================================================================

/// One price level from a book channel: `[PRICE, COUNT, AMOUNT]`.
///
/// The sign of `amount` selects the side (positive bids, negative asks);
/// `count == 0` is a deletion instruction for the price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

impl BookLevel {
    const RECORD: &'static str = "BookLevel";

    /// Decodes a single `[PRICE, COUNT, AMOUNT]` array.
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let fields = as_array(value, Self::RECORD)?;
        require_len(fields, 3, Self::RECORD)?;
        let price = decimal_at(fields, 0, Self::RECORD, "PRICE")?;
        let count = i64_at(fields, 1, Self::RECORD, "COUNT")?;
        let count = u32::try_from(count)
            .map_err(|_| DecodeError::field(Self::RECORD, 1, "COUNT", "non-negative integer"))?;
        let amount = decimal_at(fields, 2, Self::RECORD, "AMOUNT")?;
        Ok(Self {
            price,
            count,
            amount,
        })
    }

    /// The side this level belongs to, implied by the amount's sign.
    #[must_use]
    pub fn side(&self) -> BookSide {
        if self.amount >= Decimal::ZERO {
            BookSide::Bids
        } else {
            BookSide::Asks
        }
    }

    /// Level size with the side sign stripped.
    #[must_use]
    pub fn size(&self) -> Decimal {
        self.amount.abs()
    }
}

/// A book message: either the initial full snapshot or one level change.
#[derive(Debug, Clone, PartialEq)]
pub enum BookUpdate {
    Snapshot(Vec<BookLevel>),
    Delta(BookLevel),
}

impl BookUpdate {
    /// Decodes a book payload, distinguishing snapshot (array of arrays)
    /// from a single level update.
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let fields = as_array(value, "BookUpdate")?;
        if fields.first().is_some_and(Value::is_array) {
            let levels = fields
                .iter()
                .map(BookLevel::decode)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Self::Snapshot(levels))
        } else {
            Ok(Self::Delta(BookLevel::decode(value)?))
        }
    }
}

// =============================================================================
// Wallets
// =============================================================================

/// A wallet row: `[WALLET_TYPE, CURRENCY, BALANCE, UNSETTLED, AVAILABLE?]`.
///
/// `available` arrives as null until the exchange computes it; that state
/// is preserved, never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub wallet_type: WalletType,
    pub currency: String,
    pub balance: Decimal,
    pub unsettled: Decimal,
    pub available: Option<Decimal>,
}

impl WalletRecord {
    const RECORD: &'static str = "WalletRecord";

    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let fields = as_array(value, Self::RECORD)?;
        require_len(fields, 4, Self::RECORD)?;
        let wallet_type = str_at(fields, 0, Self::RECORD, "WALLET_TYPE")?;
        let wallet_type = WalletType::parse(wallet_type)
            .ok_or_else(|| DecodeError::WalletType(wallet_type.to_string()))?;
        Ok(Self {
            wallet_type,
            currency: str_at(fields, 1, Self::RECORD, "CURRENCY")?.to_string(),
            balance: decimal_at(fields, 2, Self::RECORD, "BALANCE")?,
            unsettled: decimal_at(fields, 3, Self::RECORD, "UNSETTLED_INTEREST")?,
            available: optional_decimal_at(fields, 4, Self::RECORD, "AVAILABLE_BALANCE")?,
        })
    }

    /// Decodes a wallet snapshot (array of wallet rows).
    pub fn decode_snapshot(value: &Value) -> Result<Vec<Self>, DecodeError> {
        as_array(value, Self::RECORD)?
            .iter()
            .map(Self::decode)
            .collect()
    }
}

// =============================================================================
// Orders
// =============================================================================

/// An order row from the account channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub gid: Option<i64>,
    pub cid: i64,
    pub symbol: String,
    pub mts_create: i64,
    pub mts_update: i64,
    /// Remaining (signed) amount.
    pub amount: Decimal,
    /// Originally requested (signed) amount.
    pub amount_orig: Decimal,
    pub order_type: String,
    pub status: OrderStatus,
    pub price: Decimal,
    pub price_avg: Decimal,
}

impl OrderRecord {
    const RECORD: &'static str = "OrderRecord";

    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let fields = as_array(value, Self::RECORD)?;
        require_len(fields, 18, Self::RECORD)?;
        Ok(Self {
            id: i64_at(fields, 0, Self::RECORD, "ID")?,
            gid: optional_i64_at(fields, 1),
            cid: i64_at(fields, 2, Self::RECORD, "CID")?,
            symbol: str_at(fields, 3, Self::RECORD, "SYMBOL")?.to_string(),
            mts_create: i64_at(fields, 4, Self::RECORD, "MTS_CREATE")?,
            mts_update: i64_at(fields, 5, Self::RECORD, "MTS_UPDATE")?,
            amount: decimal_at(fields, 6, Self::RECORD, "AMOUNT")?,
            amount_orig: decimal_at(fields, 7, Self::RECORD, "AMOUNT_ORIG")?,
            order_type: str_at(fields, 8, Self::RECORD, "TYPE")?.to_string(),
            status: OrderStatus::parse(str_at(fields, 13, Self::RECORD, "ORDER_STATUS")?),
            price: decimal_at(fields, 16, Self::RECORD, "PRICE")?,
            price_avg: decimal_at(fields, 17, Self::RECORD, "PRICE_AVG")?,
        })
    }

    /// Decodes an order snapshot (array of order rows).
    pub fn decode_snapshot(value: &Value) -> Result<Vec<Self>, DecodeError> {
        as_array(value, Self::RECORD)?
            .iter()
            .map(Self::decode)
            .collect()
    }
}

// =============================================================================
// Trades
// =============================================================================

/// A trade execution row (`te`/`tu`).
///
/// `te` stops after `ORDER_PRICE`; `tu` carries the fee fields as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub mts: i64,
    pub order_id: i64,
    /// Signed executed amount.
    pub exec_amount: Decimal,
    pub exec_price: Decimal,
    pub maker: Option<bool>,
    pub fee: Option<Decimal>,
    pub fee_currency: Option<String>,
}

impl TradeRecord {
    const RECORD: &'static str = "TradeRecord";

    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let fields = as_array(value, Self::RECORD)?;
        require_len(fields, 6, Self::RECORD)?;
        Ok(Self {
            id: i64_at(fields, 0, Self::RECORD, "ID")?,
            symbol: str_at(fields, 1, Self::RECORD, "SYMBOL")?.to_string(),
            mts: i64_at(fields, 2, Self::RECORD, "MTS_CREATE")?,
            order_id: i64_at(fields, 3, Self::RECORD, "ORDER_ID")?,
            exec_amount: decimal_at(fields, 4, Self::RECORD, "EXEC_AMOUNT")?,
            exec_price: decimal_at(fields, 5, Self::RECORD, "EXEC_PRICE")?,
            maker: optional_i64_at(fields, 8).map(|m| m == 1),
            fee: optional_decimal_at(fields, 9, Self::RECORD, "FEE")?,
            fee_currency: fields
                .get(10)
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// A notification row:
/// `[MTS, TYPE, MESSAGE_ID, null, NOTIFY_INFO, CODE, STATUS, TEXT]`.
///
/// When the notification concerns an order (`on-req`, `oc-req`), the
/// embedded info array carries the order id and client order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub mts: i64,
    pub kind: String,
    pub status: NotificationStatus,
    pub status_raw: String,
    pub text: String,
    pub order_id: Option<i64>,
    pub order_cid: Option<i64>,
}

impl NotificationRecord {
    const RECORD: &'static str = "NotificationRecord";

    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let fields = as_array(value, Self::RECORD)?;
        require_len(fields, 8, Self::RECORD)?;
        let status_raw = str_at(fields, 6, Self::RECORD, "STATUS")?.to_string();
        let info = fields[4].as_array();
        Ok(Self {
            mts: i64_at(fields, 0, Self::RECORD, "MTS")?,
            kind: str_at(fields, 1, Self::RECORD, "TYPE")?.to_string(),
            status: NotificationStatus::parse(&status_raw),
            status_raw,
            text: fields[7].as_str().unwrap_or_default().to_string(),
            order_id: info.and_then(|i| i.first()).and_then(Value::as_i64),
            order_cid: info.and_then(|i| i.get(2)).and_then(Value::as_i64),
        })
    }
}

// =============================================================================
// Outbound order requests
// =============================================================================

/// A new-order request handed to the transport.
///
/// `amount` keeps the wire's sign convention: positive buys the base,
/// negative sells it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub gid: i64,
    pub cid: i64,
    pub order_type: OrderType,
    pub symbol: String,
    pub price: Decimal,
    pub amount: Decimal,
}

impl OrderRequest {
    /// Serializes to the `[0, "on", null, {..}]` frame the exchange expects.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        serde_json::json!([
            0,
            "on",
            null,
            {
                "gid": self.gid,
                "cid": self.cid,
                "type": self.order_type.as_str(),
                "symbol": self.symbol,
                "price": self.price.to_string(),
                "amount": self.amount.to_string(),
            }
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_book_level_decode() {
        let level = BookLevel::decode(&json!([0.48, 3, 120.5])).unwrap();
        assert_eq!(level.price, dec!(0.48));
        assert_eq!(level.count, 3);
        assert_eq!(level.side(), BookSide::Bids);
        assert_eq!(level.size(), dec!(120.5));

        let ask = BookLevel::decode(&json!([0.49, 1, -7])).unwrap();
        assert_eq!(ask.side(), BookSide::Asks);
        assert_eq!(ask.size(), dec!(7));
    }

    #[test]
    fn test_book_level_decode_rejects_short_and_typed_wrong() {
        assert!(matches!(
            BookLevel::decode(&json!([0.48, 3])),
            Err(DecodeError::Arity { .. })
        ));
        assert!(matches!(
            BookLevel::decode(&json!(["x", 3, 1.0])),
            Err(DecodeError::Field { .. })
        ));
        assert!(matches!(
            BookLevel::decode(&json!({"price": 1})),
            Err(DecodeError::NotArray(_))
        ));
    }

    #[test]
    fn test_book_update_distinguishes_snapshot_from_delta() {
        let snapshot = BookUpdate::decode(&json!([[0.48, 2, 10], [0.49, 1, -5]])).unwrap();
        assert!(matches!(snapshot, BookUpdate::Snapshot(ref levels) if levels.len() == 2));

        let delta = BookUpdate::decode(&json!([0.48, 0, 1])).unwrap();
        assert!(matches!(delta, BookUpdate::Delta(_)));
    }

    #[test]
    fn test_wallet_record_preserves_null_available() {
        let record =
            WalletRecord::decode(&json!(["exchange", "IOT", 120.0, 0, null])).unwrap();
        assert_eq!(record.wallet_type, WalletType::Exchange);
        assert_eq!(record.balance, dec!(120));
        assert_eq!(record.available, None);

        let record = WalletRecord::decode(&json!(["exchange", "IOT", 120.0, 0, 95.5])).unwrap();
        assert_eq!(record.available, Some(dec!(95.5)));
    }

    #[test]
    fn test_wallet_record_unknown_type() {
        assert!(matches!(
            WalletRecord::decode(&json!(["deposit", "IOT", 1.0, 0])),
            Err(DecodeError::WalletType(_))
        ));
    }

    fn order_row() -> Value {
        json!([
            42, null, 1510000000001i64, "tIOTUSD", 1510000000000i64, 1510000000002i64,
            50.0, 50.0, "EXCHANGE LIMIT", null, null, null, null, "ACTIVE",
            null, null, 0.48, 0.0
        ])
    }

    #[test]
    fn test_order_record_decode() {
        let order = OrderRecord::decode(&order_row()).unwrap();
        assert_eq!(order.id, 42);
        assert_eq!(order.gid, None);
        assert_eq!(order.cid, 1510000000001);
        assert_eq!(order.symbol, "tIOTUSD");
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.price, dec!(0.48));
    }

    #[test]
    fn test_trade_record_decode_short_and_full() {
        let te = TradeRecord::decode(&json!([7, "tIOTUSD", 1510000000000i64, 42, 50.0, 0.48]))
            .unwrap();
        assert_eq!(te.order_id, 42);
        assert_eq!(te.exec_amount, dec!(50));
        assert_eq!(te.fee, None);

        let tu = TradeRecord::decode(&json!([
            7, "tIOTUSD", 1510000000000i64, 42, 50.0, 0.48, "EXCHANGE LIMIT", 0.48, 1,
            -0.048, "USD"
        ]))
        .unwrap();
        assert_eq!(tu.maker, Some(true));
        assert_eq!(tu.fee, Some(dec!(-0.048)));
        assert_eq!(tu.fee_currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_notification_decode() {
        let n = NotificationRecord::decode(&json!([
            1510000000000i64,
            "on-req",
            null,
            null,
            [null, null, 1510000000001i64],
            null,
            "ERROR",
            "Invalid order: not enough exchange balance"
        ]))
        .unwrap();
        assert_eq!(n.status, NotificationStatus::Error);
        assert_eq!(n.order_cid, Some(1510000000001));
        assert_eq!(n.order_id, None);
        assert!(n.text.contains("balance"));
    }

    #[test]
    fn test_order_request_wire_shape() {
        let request = OrderRequest {
            gid: 1,
            cid: 99,
            order_type: OrderType::ExchangeLimit,
            symbol: "tIOTUSD".into(),
            price: dec!(0.48),
            amount: dec!(-50),
        };
        let wire = request.to_wire();
        assert_eq!(wire[1], "on");
        assert_eq!(wire[3]["type"], "EXCHANGE LIMIT");
        assert_eq!(wire[3]["amount"], "-50");
    }
}
