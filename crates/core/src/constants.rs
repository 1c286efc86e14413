//! Exchange-level constants and shared enums.
//!
//! Fee rates, minimum order sizes, and the order/notification vocabulary
//! the exchange speaks. Status strings arrive as free text (sometimes with
//! a suffix like `EXECUTED @ 0.48(50.0)`), so parsing matches on prefix.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fee paid when an order adds liquidity (posts on the passive side).
pub const MAKER_FEE: Decimal = dec!(0.001);

/// Fee paid when an order removes liquidity (crosses the spread).
pub const TAKER_FEE: Decimal = dec!(0.002);

/// Minimum order size for an asset, in units of that asset.
#[must_use]
pub fn min_order_size(currency: &str) -> Decimal {
    match currency {
        "BTC" => dec!(0.005),
        "ETH" => dec!(0.02),
        "ZEC" => dec!(0.01),
        _ => dec!(0.1),
    }
}

/// Direction of a trade from the submitting side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    /// The action implied by a signed order amount (positive buys, negative sells).
    #[must_use]
    pub fn from_signed_amount(amount: Decimal) -> Self {
        if amount >= Decimal::ZERO {
            Self::Buy
        } else {
            Self::Sell
        }
    }
}

/// One side of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookSide {
    Bids,
    Asks,
}

/// Wallet buckets the exchange keeps per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Exchange,
    Margin,
    Funding,
}

impl WalletType {
    /// Parses the lowercase wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exchange" => Some(Self::Exchange),
            "margin" => Some(Self::Margin),
            "funding" => Some(Self::Funding),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::Margin => "margin",
            Self::Funding => "funding",
        }
    }
}

/// Order types accepted by the exchange.
///
/// The `EXCHANGE` prefix targets the exchange wallet; the bare variants
/// operate on margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    ExchangeMarket,
    Limit,
    ExchangeLimit,
    Stop,
    ExchangeStop,
    Fok,
    ExchangeFok,
}

impl OrderType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::ExchangeMarket => "EXCHANGE MARKET",
            Self::Limit => "LIMIT",
            Self::ExchangeLimit => "EXCHANGE LIMIT",
            Self::Stop => "STOP",
            Self::ExchangeStop => "EXCHANGE STOP",
            Self::Fok => "FOK",
            Self::ExchangeFok => "EXCHANGE FOK",
        }
    }
}

/// Lifecycle status carried on order records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    Executed,
    PartiallyFilled,
    Canceled,
    Unknown,
}

impl OrderStatus {
    /// Parses a status string by prefix; the exchange appends fill detail
    /// after the keyword (`PARTIALLY FILLED @ 0.48(12.0)`).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.starts_with("ACTIVE") {
            Self::Active
        } else if s.starts_with("EXECUTED") {
            Self::Executed
        } else if s.starts_with("PARTIALLY") {
            Self::PartiallyFilled
        } else if s.starts_with("CANCELED") {
            Self::Canceled
        } else {
            Self::Unknown
        }
    }
}

/// Outcome status on notification messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Success,
    Error,
    Failure,
    Unknown,
}

impl NotificationStatus {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "SUCCESS" => Self::Success,
            "ERROR" => Self::Error,
            "FAILURE" => Self::Failure,
            _ => Self::Unknown,
        }
    }
}
