pub mod config;
pub mod config_loader;
pub mod constants;
pub mod symbol;

pub use config::{AppConfig, ChainConfig, ExchangeConfig, TradingConfig};
pub use config_loader::ConfigLoader;
pub use constants::{
    min_order_size, BookSide, NotificationStatus, OrderAction, OrderStatus, OrderType, WalletType,
    MAKER_FEE, TAKER_FEE,
};
pub use symbol::{pair_to_symbol, symbol_action, symbol_to_pair, CurrencyPair};
