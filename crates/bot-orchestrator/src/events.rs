//! Events delivered to the bot's loop.

use cycle_trade_bitfinex::transport::ExchangeEvent;
use cycle_trade_execution::chain::TimerToken;

/// Everything that can wake the bot: exchange traffic, chain timers, and
/// shutdown.
#[derive(Debug)]
pub enum BotEvent {
    Exchange(ExchangeEvent),
    /// A cancel-timeout armed by the order chain fired.
    CancelTimeout(TimerToken),
    /// A retry delay armed by the order chain elapsed.
    RetryTimer(TimerToken),
    Shutdown,
}
