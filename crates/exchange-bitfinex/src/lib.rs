//! Exchange-side state for the cycle trading system.
//!
//! Holds the typed wire records decoded from the exchange's positional
//! arrays, the three stores mirroring exchange state (order books,
//! wallets, orders), and the [`Transport`]/[`Notifier`] traits the
//! surrounding connection code implements.

pub mod book;
pub mod error;
pub mod messages;
pub mod orders;
pub mod transport;
pub mod wallet;

pub use book::{BookSnapshot, BookStore, PriceLevel, SymbolBook};
pub use error::DecodeError;
pub use messages::{
    BookLevel, BookUpdate, NotificationRecord, OrderRecord, OrderRequest, TradeRecord,
    WalletRecord,
};
pub use orders::OrderStore;
pub use transport::{ExchangeEvent, LogNotifier, Notifier, Transport};
pub use wallet::{WalletEntry, WalletStore};
