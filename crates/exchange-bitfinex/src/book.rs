//! Level-2 order book store.
//!
//! One [`SymbolBook`] per subscribed symbol, updated incrementally from
//! the book channel. Bids sort descending (via [`Reverse`] keys), asks
//! ascending, so the map iteration order is the price snapshot and the
//! best level is always the first entry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use cycle_trade_core::constants::{BookSide, OrderAction};
use cycle_trade_core::symbol::pair_to_symbol;

use crate::messages::{BookLevel, BookUpdate};

/// Aggregated book entry at one price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Number of orders resting at this price.
    pub count: u32,
    /// Total size at this price, always positive.
    pub size: Decimal,
}

/// The two sides of one symbol's book plus bookkeeping counters.
#[derive(Debug, Clone, Default)]
pub struct SymbolBook {
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    update_count: u64,
}

impl SymbolBook {
    /// Best (highest) bid level.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.values().next()
    }

    /// Best (lowest) ask level.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.values().next()
    }

    /// Bid prices in descending order.
    #[must_use]
    pub fn sorted_bid_prices(&self) -> Vec<Decimal> {
        self.bids.keys().map(|r| r.0).collect()
    }

    /// Ask prices in ascending order.
    #[must_use]
    pub fn sorted_ask_prices(&self) -> Vec<Decimal> {
        self.asks.keys().copied().collect()
    }

    /// Levels of one side in standing sort order (best first).
    pub fn levels(&self, side: BookSide) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match side {
            BookSide::Bids => Box::new(self.bids.values()),
            BookSide::Asks => Box::new(self.asks.values()),
        }
    }

    /// Number of updates applied to this book.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    fn upsert(&mut self, level: &BookLevel) {
        let entry = PriceLevel {
            price: level.price,
            count: level.count,
            size: level.size(),
        };
        match level.side() {
            BookSide::Bids => {
                self.bids.insert(Reverse(level.price), entry);
            }
            BookSide::Asks => {
                self.asks.insert(level.price, entry);
            }
        }
    }

    /// Removes the price implied by a count-0 level. Returns whether the
    /// key existed.
    fn remove(&mut self, level: &BookLevel) -> bool {
        match level.side() {
            BookSide::Bids => self.bids.remove(&Reverse(level.price)).is_some(),
            BookSide::Asks => self.asks.remove(&level.price).is_some(),
        }
    }

    fn apply_snapshot(&mut self, levels: &[BookLevel]) {
        self.bids.clear();
        self.asks.clear();
        for level in levels {
            self.upsert(level);
        }
    }
}

/// Serializable dump of every book, for offline replay and analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub books: HashMap<String, SymbolBookSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolBookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub update_count: u64,
}

/// Owns every [`SymbolBook`] seen this session. Symbols are never removed
/// once subscribed.
#[derive(Debug, Default)]
pub struct BookStore {
    books: HashMap<String, SymbolBook>,
}

impl BookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one book message.
    ///
    /// Snapshots replace both sides. Deltas upsert the implied side, or
    /// delete the price when `count == 0` (a delete for an absent price
    /// is a data-quality anomaly: logged, not fatal). After every update
    /// the bid/ask cross check runs.
    pub fn update(&mut self, symbol: &str, update: &BookUpdate) {
        let book = self.books.entry(symbol.to_string()).or_default();

        match update {
            BookUpdate::Snapshot(levels) => book.apply_snapshot(levels),
            BookUpdate::Delta(level) => {
                if level.count == 0 {
                    if !book.remove(level) {
                        warn!(
                            symbol,
                            price = %level.price,
                            side = ?level.side(),
                            "book delete for absent price level"
                        );
                    }
                } else {
                    book.upsert(level);
                }
            }
        }

        book.update_count += 1;
        Self::check_cross(symbol, book);
    }

    fn check_cross(symbol: &str, book: &SymbolBook) {
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            if bid.price >= ask.price {
                warn!(
                    symbol,
                    bid = %bid.price,
                    ask = %ask.price,
                    "crossed book: best bid >= best ask"
                );
            }
        }
    }

    /// The book for a symbol, if any updates have been seen.
    #[must_use]
    pub fn book(&self, symbol: &str) -> Option<&SymbolBook> {
        self.books.get(symbol)
    }

    /// All symbols seen this session.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        self.books.keys().map(String::as_str).collect()
    }

    /// Whether every required symbol has a book. Used as the
    /// subscription-readiness gate before trading starts.
    #[must_use]
    pub fn has_all_symbols(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.books.contains_key(s))
    }

    /// Best price when crossing the spread: asks for a buy, bids for a sell.
    #[must_use]
    pub fn best_market_price(&self, symbol: &str, action: OrderAction) -> Option<Decimal> {
        let book = self.books.get(symbol)?;
        match action {
            OrderAction::Buy => book.best_ask().map(|l| l.price),
            OrderAction::Sell => book.best_bid().map(|l| l.price),
        }
    }

    /// Best price when posting passively: bids for a buy, asks for a sell.
    #[must_use]
    pub fn best_limit_price(&self, symbol: &str, action: OrderAction) -> Option<Decimal> {
        self.best_limit_level(symbol, action).map(|l| l.price)
    }

    /// The full best passive-side level (price, count, size).
    #[must_use]
    pub fn best_limit_level(&self, symbol: &str, action: OrderAction) -> Option<&PriceLevel> {
        let book = self.books.get(symbol)?;
        match action {
            OrderAction::Buy => book.best_bid(),
            OrderAction::Sell => book.best_ask(),
        }
    }

    /// First `n` levels of a side in standing sort order.
    #[must_use]
    pub fn first_levels_by_count(
        &self,
        symbol: &str,
        side: BookSide,
        n: usize,
    ) -> Option<Vec<PriceLevel>> {
        let book = self.books.get(symbol)?;
        Some(book.levels(side).take(n).copied().collect())
    }

    /// All levels of a side whose price deviates from the top level by at
    /// most `pct` percent.
    #[must_use]
    pub fn first_levels_by_percent(
        &self,
        symbol: &str,
        side: BookSide,
        pct: Decimal,
    ) -> Option<Vec<PriceLevel>> {
        let book = self.books.get(symbol)?;
        let top = book.levels(side).next()?.price;
        if top == Decimal::ZERO {
            return Some(Vec::new());
        }
        let hundred = Decimal::from(100);
        Some(
            book.levels(side)
                .take_while(|l| ((l.price - top).abs() / top) * hundred <= pct)
                .copied()
                .collect(),
        )
    }

    /// Absolute distance between best bid and best ask.
    #[must_use]
    pub fn spread(&self, symbol: &str) -> Option<Decimal> {
        let book = self.books.get(symbol)?;
        let bid = book.best_bid()?.price;
        let ask = book.best_ask()?.price;
        Some((bid - ask).abs())
    }

    /// The single `t<CUR>USD` symbol for a currency, if exactly one exists.
    fn usd_symbol(&self, currency: &str) -> Option<String> {
        let candidates: Vec<&String> = self
            .books
            .keys()
            .filter(|s| s.as_str() == pair_to_symbol(currency, "USD"))
            .collect();
        match candidates.as_slice() {
            [one] => Some((*one).clone()),
            _ => None,
        }
    }

    /// Converts an amount of `currency` to USD at the best bid.
    ///
    /// Identity for USD itself. Requires exactly one `<currency>USD`
    /// market; zero or ambiguous markets make the conversion fail, not
    /// approximate.
    #[must_use]
    pub fn convert_to_usd(&self, currency: &str, amount: Decimal) -> Option<Decimal> {
        if currency == "USD" {
            return Some(amount);
        }
        let symbol = self.usd_symbol(currency)?;
        let bid = self.books.get(&symbol)?.best_bid()?.price;
        Some(amount * bid)
    }

    /// Converts a USD amount into `currency` at the best ask.
    #[must_use]
    pub fn convert_from_usd(&self, usd_amount: Decimal, currency: &str) -> Option<Decimal> {
        if currency == "USD" {
            return Some(usd_amount);
        }
        let symbol = self.usd_symbol(currency)?;
        let ask = self.books.get(&symbol)?.best_ask()?.price;
        if ask == Decimal::ZERO {
            return None;
        }
        Some(usd_amount / ask)
    }

    /// The symbol connecting two currencies, whichever orientation is
    /// actually traded.
    #[must_use]
    pub fn symbol_for_pair(&self, a: &str, b: &str) -> Option<String> {
        let forward = pair_to_symbol(a, b);
        if self.books.contains_key(&forward) {
            return Some(forward);
        }
        let backward = pair_to_symbol(b, a);
        if self.books.contains_key(&backward) {
            return Some(backward);
        }
        None
    }

    /// Dumps every book into a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BookSnapshot {
        let books = self
            .books
            .iter()
            .map(|(symbol, book)| {
                (
                    symbol.clone(),
                    SymbolBookSnapshot {
                        bids: book.bids.values().copied().collect(),
                        asks: book.asks.values().copied().collect(),
                        update_count: book.update_count,
                    },
                )
            })
            .collect();
        BookSnapshot { books }
    }

    /// Rebuilds a store from a snapshot dump.
    #[must_use]
    pub fn from_snapshot(snapshot: &BookSnapshot) -> Self {
        let mut store = Self::new();
        for (symbol, dump) in &snapshot.books {
            let mut book = SymbolBook {
                update_count: dump.update_count,
                ..SymbolBook::default()
            };
            for level in &dump.bids {
                book.bids.insert(Reverse(level.price), *level);
            }
            for level in &dump.asks {
                book.asks.insert(level.price, *level);
            }
            store.books.insert(symbol.clone(), book);
        }
        store
    }
}
