//! Limit-price selection for passive orders.
//!
//! How far to walk a posted price toward the spread is a tuning choice,
//! not a law of the strategy, so it sits behind a trait.

use rust_decimal::Decimal;

use cycle_trade_core::constants::OrderAction;

/// Chooses the limit price to post, given the best resting level on the
/// passive side for the action.
pub trait PricingPolicy {
    fn limit_price(&self, best: Decimal, action: OrderAction) -> Decimal;
}

/// Nudges the best passive price toward the spread to gain queue
/// priority: up for a buy, down for a sell.
///
/// The default magnitude is a quarter of the per-hop fee, so the edge
/// given up on price stays well inside the edge the simulation already
/// charges for the hop.
#[derive(Debug, Clone, Copy)]
pub struct SpreadNudge {
    nudge: Decimal,
}

impl SpreadNudge {
    #[must_use]
    pub fn new(nudge: Decimal) -> Self {
        Self { nudge }
    }

    /// Builds the policy from the fee and the configured fraction of it.
    #[must_use]
    pub fn from_fee(fee: Decimal, fraction: Decimal) -> Self {
        Self { nudge: fee * fraction }
    }
}

impl PricingPolicy for SpreadNudge {
    fn limit_price(&self, best: Decimal, action: OrderAction) -> Decimal {
        match action {
            OrderAction::Buy => best * (Decimal::ONE + self.nudge),
            OrderAction::Sell => best * (Decimal::ONE - self.nudge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_nudge_walks_toward_the_spread() {
        let policy = SpreadNudge::from_fee(dec!(0.002), dec!(0.25));
        assert_eq!(
            policy.limit_price(dec!(0.48), OrderAction::Buy),
            dec!(0.48024)
        );
        assert_eq!(
            policy.limit_price(dec!(0.48), OrderAction::Sell),
            dec!(0.47976)
        );
    }
}
