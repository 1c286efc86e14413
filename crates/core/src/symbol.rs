//! Symbol and currency-pair string helpers.
//!
//! Trading symbols look like `tIOTUSD`: a `t` prefix (funding books use
//! `f`) followed by two 3-letter currency codes. These helpers are the
//! only place that format is known; everything else works with
//! [`CurrencyPair`] values.

use serde::{Deserialize, Serialize};

use crate::constants::OrderAction;

const CURRENCY_LEN: usize = 3;

/// A trading pair split into its two currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    /// The symbol for this pair on the trading (`t`) channel.
    #[must_use]
    pub fn symbol(&self) -> String {
        pair_to_symbol(&self.base, &self.quote)
    }
}

/// Splits `tIOTUSD` into `IOT`/`USD`. Returns `None` for funding symbols,
/// symbols of unexpected length, or non-ASCII input.
#[must_use]
pub fn symbol_to_pair(symbol: &str) -> Option<CurrencyPair> {
    if !symbol.is_ascii() || symbol.len() != 1 + 2 * CURRENCY_LEN {
        return None;
    }
    if !symbol.starts_with('t') {
        return None;
    }
    let base = &symbol[1..1 + CURRENCY_LEN];
    let quote = &symbol[1 + CURRENCY_LEN..];
    Some(CurrencyPair {
        base: base.to_string(),
        quote: quote.to_string(),
    })
}

/// Joins `IOT`/`USD` into `tIOTUSD`.
#[must_use]
pub fn pair_to_symbol(base: &str, quote: &str) -> String {
    format!("t{base}{quote}")
}

/// The action that converts `from_currency` through `symbol`.
///
/// Selling the base produces quote; buying with the quote produces base:
/// `tIOTUSD` + `IOT` → sell, `tIOTUSD` + `USD` → buy. `None` when the
/// currency is not part of the symbol.
#[must_use]
pub fn symbol_action(symbol: &str, from_currency: &str) -> Option<OrderAction> {
    let pair = symbol_to_pair(symbol)?;
    if pair.base == from_currency {
        Some(OrderAction::Sell)
    } else if pair.quote == from_currency {
        Some(OrderAction::Buy)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_to_pair() {
        let pair = symbol_to_pair("tIOTUSD").unwrap();
        assert_eq!(pair.base, "IOT");
        assert_eq!(pair.quote, "USD");
        assert_eq!(pair.symbol(), "tIOTUSD");
    }

    #[test]
    fn test_symbol_to_pair_rejects_funding_and_malformed() {
        assert!(symbol_to_pair("fUSD").is_none());
        assert!(symbol_to_pair("IOTUSD").is_none());
        assert!(symbol_to_pair("tIOTUSDX").is_none());
        assert!(symbol_to_pair("").is_none());
    }

    #[test]
    fn test_symbol_action() {
        assert_eq!(symbol_action("tIOTUSD", "IOT"), Some(OrderAction::Sell));
        assert_eq!(symbol_action("tIOTUSD", "USD"), Some(OrderAction::Buy));
        assert_eq!(symbol_action("tIOTUSD", "ETH"), None);
    }
}
