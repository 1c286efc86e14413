//! Application configuration.
//!
//! Defaults mirror the exchange constants (taker fee, minimum sizes) and
//! the retry windows the execution pipeline was tuned with. Everything
//! here is overridable from `config/Config.toml` or `CYCLE_TRADE_*`
//! environment variables via [`crate::ConfigLoader`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::TAKER_FEE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub chain: ChainConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            trading: TradingConfig::default(),
            chain: ChainConfig::default(),
        }
    }
}

/// Exchange subscription and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Book channels the bot subscribes to. Trading does not start until
    /// every one of these has delivered at least one update.
    pub symbols: Vec<String>,
    /// Directory for periodic book snapshots; `None` disables persistence.
    pub data_dir: Option<PathBuf>,
    /// Seconds between snapshot dumps.
    pub snapshot_interval_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "tBTCUSD".into(),
                "tETHUSD".into(),
                "tETHBTC".into(),
                "tIOTUSD".into(),
                "tIOTBTC".into(),
                "tIOTETH".into(),
                "tNEOUSD".into(),
                "tNEOBTC".into(),
                "tNEOETH".into(),
                "tOMGUSD".into(),
                "tOMGBTC".into(),
                "tOMGETH".into(),
                "tXRPUSD".into(),
                "tXRPBTC".into(),
                "tEOSUSD".into(),
                "tEOSBTC".into(),
                "tEOSETH".into(),
            ],
            data_dir: None,
            snapshot_interval_secs: 60,
        }
    }
}

/// Solver and trading-cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Currency every cycle starts and ends in.
    pub start_currency: String,
    /// Cap on the amount of start currency committed per cycle.
    pub max_amount: Decimal,
    /// Minimum number of hops in a cycle.
    pub min_path_length: usize,
    /// Maximum number of hops in a cycle.
    pub max_path_length: usize,
    /// Solutions below this estimated USD profit are discarded.
    pub min_profit_usd: Decimal,
    /// Fee fraction charged per hop.
    pub transition_fee: Decimal,
    /// Fraction of the fee used to nudge limit prices toward the spread.
    pub nudge_fraction: Decimal,
    /// Width of the depth-inspection band, percent of the top price.
    pub depth_band_pct: Decimal,
    /// Required counter-side depth as a multiple of the hop size.
    pub depth_multiple: Decimal,
    /// Seconds between trading-cycle ticks.
    pub cycle_interval_secs: u64,
    /// Master switch; when false the bot only maintains its stores.
    pub enabled: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            start_currency: "IOT".into(),
            max_amount: dec!(50),
            min_path_length: 3,
            max_path_length: 5,
            min_profit_usd: dec!(1.0),
            transition_fee: TAKER_FEE,
            nudge_fraction: dec!(0.25),
            depth_band_pct: dec!(0.25),
            depth_multiple: dec!(3),
            cycle_interval_secs: 5,
            enabled: false,
        }
    }
}

/// Retry and timeout windows for the order chain.
///
/// The windows are tunable rather than contractual; these defaults are
/// the ones the pipeline was operated with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Cancel an order that has not fully executed within this window.
    pub cancel_timeout_secs: u64,
    /// Extended window granted after a partial fill.
    pub partial_fill_timeout_secs: u64,
    /// Settle delay before re-submitting after a cancellation or failed
    /// adjustment.
    pub retry_delay_ms: u64,
    /// Price nudge applied when re-pricing a retried order.
    pub retry_price_nudge: Decimal,
    /// Attempts after which a zero-amount leg is skipped instead of sent.
    pub zero_amount_attempts: u32,
    /// Fee fraction reserved when fitting an amount to a balance.
    pub transition_fee: Decimal,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cancel_timeout_secs: 30,
            partial_fill_timeout_secs: 60,
            retry_delay_ms: 2000,
            retry_price_nudge: dec!(0.0005),
            zero_amount_attempts: 3,
            transition_fee: TAKER_FEE,
        }
    }
}

impl ChainConfig {
    #[must_use]
    pub fn cancel_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cancel_timeout_secs)
    }

    #[must_use]
    pub fn partial_fill_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.partial_fill_timeout_secs)
    }

    #[must_use]
    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms)
    }
}
