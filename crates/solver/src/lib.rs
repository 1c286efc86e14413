//! Circular-path arbitrage solver.
//!
//! Builds a currency graph from the symbols the book store knows,
//! enumerates bounded closed walks from a start currency, prices every
//! hop against the live book, and ranks the surviving cycles by
//! estimated profit net of fees and liquidity guards.

pub mod graph;
pub mod pricing;
pub mod solver;

pub use graph::{PathGraph, Transition};
pub use pricing::{PricingPolicy, SpreadNudge};
pub use solver::{
    CycleSolution, CycleSolver, HopInstruction, SolveReport, SolverConfig, SolverError,
};
