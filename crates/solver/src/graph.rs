//! Currency graph derived from tradable symbols.
//!
//! States are the 3-letter currency codes embedded in trading symbols;
//! every symbol contributes one bidirectional transition between its two
//! currencies. The graph is rebuilt per solve from whatever the book
//! store currently holds — it is never stored.

use cycle_trade_core::symbol::symbol_to_pair;

/// One tradable edge between two currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub symbol: String,
    pub state1: String,
    pub state2: String,
}

/// The currency graph for one solve.
#[derive(Debug, Clone, Default)]
pub struct PathGraph {
    states: Vec<String>,
    transitions: Vec<Transition>,
}

impl PathGraph {
    /// Builds the graph from trading symbols; funding and malformed
    /// symbols are ignored.
    #[must_use]
    pub fn from_symbols<S: AsRef<str>>(symbols: &[S]) -> Self {
        let mut states: Vec<String> = Vec::new();
        let mut transitions = Vec::new();

        for symbol in symbols {
            let Some(pair) = symbol_to_pair(symbol.as_ref()) else {
                continue;
            };
            if !states.contains(&pair.base) {
                states.push(pair.base.clone());
            }
            if !states.contains(&pair.quote) {
                states.push(pair.quote.clone());
            }
            transitions.push(Transition {
                symbol: symbol.as_ref().to_string(),
                state1: pair.base,
                state2: pair.quote,
            });
        }

        Self {
            states,
            transitions,
        }
    }

    #[must_use]
    pub fn states(&self) -> &[String] {
        &self.states
    }

    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    #[must_use]
    pub fn contains_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    /// States reachable from `state` in one transition. A pair traded on
    /// several symbols yields the neighbor once.
    #[must_use]
    pub fn neighbors(&self, state: &str) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for t in &self.transitions {
            let other = if t.state1 == state {
                &t.state2
            } else if t.state2 == state {
                &t.state1
            } else {
                continue;
            };
            if !result.contains(other) {
                result.push(other.clone());
            }
        }
        result
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
