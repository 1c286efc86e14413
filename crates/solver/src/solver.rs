//! Closed-walk enumeration and profit estimation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use cycle_trade_bitfinex::book::BookStore;
use cycle_trade_core::config::TradingConfig;
use cycle_trade_core::constants::{BookSide, OrderAction};
use cycle_trade_core::symbol::{symbol_action, symbol_to_pair};

use crate::graph::PathGraph;
use crate::pricing::PricingPolicy;

/// Hard floor on the cycle length: a 2-hop walk is a round trip through
/// one pair and cannot profit net of fees.
pub const MIN_PATH_LENGTH: usize = 3;

/// Hard ceiling on the cycle length, bounding the search space.
pub const MAX_PATH_LENGTH: usize = 6;

/// Floor on the profit threshold, protecting against noise-level "profit"
/// from rounding.
pub const MIN_PROFIT_USD: Decimal = dec!(0.01);

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("book store holds no symbols to build a graph from")]
    EmptyBookStore,

    #[error("trade amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("min path length must be at least {MIN_PATH_LENGTH}, got {0}")]
    MinPathLength(usize),

    #[error("max path length must be at most {MAX_PATH_LENGTH}, got {0}")]
    MaxPathLength(usize),

    #[error("min profit threshold must be at least {MIN_PROFIT_USD} USD, got {0}")]
    MinProfitThreshold(Decimal),

    #[error("no circular paths exist from {0}")]
    NoCircularPaths(String),

    #[error("cannot convert {0} to USD: zero or ambiguous USD market")]
    Conversion(String),

    #[error("no symbol connects {0} and {1}")]
    MissingSymbol(String, String),
}

/// Solver parameters, usually derived from [`TradingConfig`].
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub start_currency: String,
    pub max_amount: Decimal,
    pub min_path_length: usize,
    pub max_path_length: usize,
    pub min_profit_usd: Decimal,
    pub transition_fee: Decimal,
    /// Depth-inspection band as a percent of the top price.
    pub depth_band_pct: Decimal,
    /// Required counter-side depth as a multiple of the hop size.
    pub depth_multiple: Decimal,
}

impl From<&TradingConfig> for SolverConfig {
    fn from(trading: &TradingConfig) -> Self {
        Self {
            start_currency: trading.start_currency.clone(),
            max_amount: trading.max_amount,
            min_path_length: trading.min_path_length,
            max_path_length: trading.max_path_length,
            min_profit_usd: trading.min_profit_usd,
            transition_fee: trading.transition_fee,
            depth_band_pct: trading.depth_band_pct,
            depth_multiple: trading.depth_multiple,
        }
    }
}

/// One executable hop of a solved cycle.
#[derive(Debug, Clone, Serialize)]
pub struct HopInstruction {
    pub from: String,
    pub to: String,
    pub symbol: String,
    pub action: OrderAction,
    /// Nudged limit price to post.
    pub price: Decimal,
    /// Signed order amount in base units: positive buys, negative sells.
    pub amount: Decimal,
}

/// A profitable cycle, priced and ready for execution.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSolution {
    /// Currency sequence, start currency first and last.
    pub path: Vec<String>,
    pub instructions: Vec<HopInstruction>,
    /// Start-currency amount the simulation committed.
    pub used_amount: Decimal,
    /// Estimated gain in start-currency units.
    pub estimated_profit: Decimal,
    pub estimated_profit_usd: Decimal,
}

/// Outcome of a solve: ranked solutions plus counts of the discarded
/// candidates, by reason.
#[derive(Debug, Default, Serialize)]
pub struct SolveReport {
    pub solutions: Vec<CycleSolution>,
    /// Cycles priced but not profitable enough.
    pub unprofitable: usize,
    /// Cycles discarded for insufficient counter-side liquidity.
    pub unexecutable: usize,
    /// Closed walks considered after the start-revisit filter.
    pub candidates: usize,
}

enum Priced {
    Solution(CycleSolution),
    Unprofitable,
    Unexecutable,
}

/// Depth-first enumerator and pricer for circular conversion paths.
pub struct CycleSolver<'a, P: PricingPolicy> {
    books: &'a BookStore,
    graph: PathGraph,
    config: SolverConfig,
    policy: P,
}

impl<'a, P: PricingPolicy> CycleSolver<'a, P> {
    /// Validates the configuration and builds the currency graph.
    ///
    /// # Errors
    ///
    /// Each bad parameter fails with its own [`SolverError`] variant;
    /// nothing is silently clamped.
    pub fn new(books: &'a BookStore, config: SolverConfig, policy: P) -> Result<Self, SolverError> {
        if config.max_amount <= Decimal::ZERO {
            return Err(SolverError::NonPositiveAmount(config.max_amount));
        }
        if config.min_path_length < MIN_PATH_LENGTH {
            return Err(SolverError::MinPathLength(config.min_path_length));
        }
        if config.max_path_length > MAX_PATH_LENGTH {
            return Err(SolverError::MaxPathLength(config.max_path_length));
        }
        if config.min_profit_usd < MIN_PROFIT_USD {
            return Err(SolverError::MinProfitThreshold(config.min_profit_usd));
        }

        let graph = PathGraph::from_symbols(&books.symbols());
        if graph.is_empty() {
            return Err(SolverError::EmptyBookStore);
        }

        Ok(Self {
            books,
            graph,
            config,
            policy,
        })
    }

    /// Enumerates, prices, filters, and ranks cycles from the start
    /// currency.
    ///
    /// # Errors
    ///
    /// [`SolverError::NoCircularPaths`] when the graph has no closed walk
    /// from the start currency at all; [`SolverError::Conversion`] when a
    /// required USD conversion is impossible. Either aborts this solve
    /// attempt only.
    pub fn solve(&self) -> Result<SolveReport, SolverError> {
        let raw_paths = self.enumerate_paths();
        if raw_paths.is_empty() {
            return Err(SolverError::NoCircularPaths(
                self.config.start_currency.clone(),
            ));
        }

        // Only one full circuit per path: the start currency may appear
        // exactly twice (first and last). Intermediate repeats of other
        // currencies are fine.
        let start = &self.config.start_currency;
        let candidates: Vec<Vec<String>> = raw_paths
            .into_iter()
            .filter(|path| path.iter().filter(|s| *s == start).count() == 2)
            .collect();

        let mut report = SolveReport {
            candidates: candidates.len(),
            ..SolveReport::default()
        };

        for path in candidates {
            match self.price_path(&path)? {
                Priced::Solution(solution) => report.solutions.push(solution),
                Priced::Unprofitable => report.unprofitable += 1,
                Priced::Unexecutable => report.unexecutable += 1,
            }
        }

        report
            .solutions
            .sort_by(|a, b| b.estimated_profit.cmp(&a.estimated_profit));

        debug!(
            start = %self.config.start_currency,
            candidates = report.candidates,
            solutions = report.solutions.len(),
            unprofitable = report.unprofitable,
            unexecutable = report.unexecutable,
            "solve finished"
        );

        Ok(report)
    }

    /// Walks the graph depth-first with an explicit frame stack, emitting
    /// each completed circuit directly.
    ///
    /// A walk may pass through the start state before `min_path_length`
    /// transitions; from `min_path_length` on, reaching the start
    /// terminates the walk. At `max_path_length` only walks landing
    /// exactly on the start survive.
    fn enumerate_paths(&self) -> Vec<Vec<String>> {
        struct Frame {
            neighbors: Vec<String>,
            next: usize,
        }

        let start = self.config.start_currency.clone();
        let mut paths = Vec::new();
        let mut walk = vec![start.clone()];
        let mut stack = vec![Frame {
            neighbors: self.graph.neighbors(&start),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.neighbors.len() {
                stack.pop();
                walk.pop();
                continue;
            }
            let next_state = frame.neighbors[frame.next].clone();
            frame.next += 1;

            // Transitions performed once we step onto next_state.
            let path_length = walk.len();

            if next_state == start && path_length >= self.config.min_path_length {
                let mut path = walk.clone();
                path.push(next_state);
                paths.push(path);
                continue;
            }
            if path_length >= self.config.max_path_length {
                // Walk is full and did not land on the start state.
                continue;
            }

            walk.push(next_state.clone());
            stack.push(Frame {
                neighbors: self.graph.neighbors(&next_state),
                next: 0,
            });
        }

        paths
    }

    /// Prices one candidate cycle against the live book.
    fn price_path(&self, path: &[String]) -> Result<Priced, SolverError> {
        let fee = self.config.transition_fee;
        let hops = path.len() - 1;

        // Resolve symbol, action, and the best passive level per hop.
        let mut resolved = Vec::with_capacity(hops);
        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let symbol = self
                .books
                .symbol_for_pair(from, to)
                .ok_or_else(|| SolverError::MissingSymbol(from.clone(), to.clone()))?;
            let action = symbol_action(&symbol, from)
                .ok_or_else(|| SolverError::MissingSymbol(from.clone(), to.clone()))?;
            let Some(best) = self.books.best_limit_level(&symbol, action).copied() else {
                return Ok(Priced::Unexecutable);
            };
            if best.price <= Decimal::ZERO {
                return Ok(Priced::Unexecutable);
            }
            resolved.push((from.clone(), to.clone(), symbol, action, best));
        }

        // Feasibility ceiling: the weakest hop's best-level size, in USD,
        // bounds how much of the cycle can realistically fill.
        let mut min_usd: Option<Decimal> = None;
        for (_, _, symbol, _, best) in &resolved {
            let base = symbol_to_pair(symbol)
                .map(|p| p.base)
                .ok_or_else(|| SolverError::MissingSymbol(symbol.clone(), String::new()))?;
            let usd = self
                .books
                .convert_to_usd(&base, best.size)
                .ok_or_else(|| SolverError::Conversion(base.clone()))?;
            min_usd = Some(min_usd.map_or(usd, |m| m.min(usd)));
        }
        let min_usd = min_usd.unwrap_or(Decimal::ZERO);
        let ceiling = self
            .books
            .convert_from_usd(min_usd, &self.config.start_currency)
            .ok_or_else(|| SolverError::Conversion(self.config.start_currency.clone()))?;

        let used_amount = self.config.max_amount.min(ceiling);
        if used_amount <= Decimal::ZERO {
            return Ok(Priced::Unexecutable);
        }

        // Simulate the cycle hop by hop, compounding the fee.
        let mut instructions = Vec::with_capacity(hops);
        let mut amount = used_amount;
        for (from, to, symbol, action, best) in &resolved {
            let limit = self.policy.limit_price(best.price, *action);
            if limit <= Decimal::ZERO {
                return Ok(Priced::Unexecutable);
            }

            // Size of this hop's order in the symbol's base units.
            let base_size = match action {
                OrderAction::Buy => amount / limit,
                OrderAction::Sell => amount,
            };

            // Thin-book guard: the side the order executes against must
            // hold several times the hop size near the top, or a passive
            // order has no realistic counterparty.
            let counter_side = match action {
                OrderAction::Buy => BookSide::Asks,
                OrderAction::Sell => BookSide::Bids,
            };
            let depth: Decimal = self
                .books
                .first_levels_by_percent(symbol, counter_side, self.config.depth_band_pct)
                .map(|levels| levels.iter().map(|l| l.size).sum())
                .unwrap_or(Decimal::ZERO);
            if depth < self.config.depth_multiple * base_size {
                debug!(
                    symbol = %symbol,
                    hop = %format!("{from}->{to}"),
                    %depth,
                    required = %(self.config.depth_multiple * base_size),
                    "cycle discarded: counter-side too thin"
                );
                return Ok(Priced::Unexecutable);
            }

            instructions.push(HopInstruction {
                from: from.clone(),
                to: to.clone(),
                symbol: symbol.clone(),
                action: *action,
                price: limit,
                amount: match action {
                    OrderAction::Buy => base_size,
                    OrderAction::Sell => -base_size,
                },
            });

            amount = match action {
                OrderAction::Buy => (amount / limit) * (Decimal::ONE - fee),
                OrderAction::Sell => amount * limit * (Decimal::ONE - fee),
            };
        }

        let profit = amount - used_amount;
        let profit_usd = self
            .books
            .convert_to_usd(&self.config.start_currency, profit)
            .ok_or_else(|| SolverError::Conversion(self.config.start_currency.clone()))?;

        if profit > Decimal::ZERO && profit_usd >= self.config.min_profit_usd {
            Ok(Priced::Solution(CycleSolution {
                path: path.to_vec(),
                instructions,
                used_amount,
                estimated_profit: profit,
                estimated_profit_usd: profit_usd,
            }))
        } else {
            Ok(Priced::Unprofitable)
        }
    }
}
