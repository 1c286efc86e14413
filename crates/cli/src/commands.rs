//! CLI command implementations.

use anyhow::{Context, Result};
use tracing::info;

use cycle_trade_bitfinex::book::{BookSnapshot, BookStore};
use cycle_trade_bitfinex::messages::{BookLevel, BookUpdate};
use cycle_trade_bitfinex::transport::{ExchangeEvent, LogNotifier};
use cycle_trade_bot_orchestrator::{Bot, BotEvent, PaperTransport};
use cycle_trade_core::config::AppConfig;
use cycle_trade_core::ConfigLoader;
use cycle_trade_solver::pricing::SpreadNudge;
use cycle_trade_solver::solver::{CycleSolver, SolverConfig};

fn load_snapshot(path: &str) -> Result<BookSnapshot> {
    let bytes = std::fs::read(path).with_context(|| format!("reading snapshot {path}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing snapshot {path}"))
}

/// Turns a snapshot dump back into the book events the bot would have
/// received live.
fn snapshot_events(snapshot: &BookSnapshot) -> Vec<ExchangeEvent> {
    snapshot
        .books
        .iter()
        .map(|(symbol, book)| {
            let levels = book
                .bids
                .iter()
                .map(|l| BookLevel {
                    price: l.price,
                    count: l.count,
                    amount: l.size,
                })
                .chain(book.asks.iter().map(|l| BookLevel {
                    price: l.price,
                    count: l.count,
                    amount: -l.size,
                }))
                .collect();
            ExchangeEvent::Book {
                symbol: symbol.clone(),
                update: BookUpdate::Snapshot(levels),
            }
        })
        .collect()
}

/// Offline solve over a saved snapshot: print the ranked cycles.
pub fn solve(snapshot_path: &str, start: Option<&str>, config_path: &str) -> Result<()> {
    let config: AppConfig = ConfigLoader::load_from(config_path)?;
    let snapshot = load_snapshot(snapshot_path)?;
    let books = BookStore::from_snapshot(&snapshot);

    let mut solver_config = SolverConfig::from(&config.trading);
    if let Some(start) = start {
        solver_config.start_currency = start.to_string();
    }
    let start_currency = solver_config.start_currency.clone();
    let policy = SpreadNudge::from_fee(
        config.trading.transition_fee,
        config.trading.nudge_fraction,
    );

    let report = CycleSolver::new(&books, solver_config, policy)?.solve()?;

    println!(
        "{} candidate cycles from {start_currency}: {} solutions, {} unprofitable, {} unexecutable",
        report.candidates,
        report.solutions.len(),
        report.unprofitable,
        report.unexecutable,
    );
    for (rank, solution) in report.solutions.iter().enumerate() {
        println!(
            "#{} {}  profit {} {} ({} USD) on {} {}",
            rank + 1,
            solution.path.join(" -> "),
            solution.estimated_profit,
            start_currency,
            solution.estimated_profit_usd,
            solution.used_amount,
            start_currency,
        );
        for instruction in &solution.instructions {
            println!(
                "    {:?} {} @ {} amount {}",
                instruction.action, instruction.symbol, instruction.price, instruction.amount,
            );
        }
    }
    Ok(())
}

/// Replays a snapshot through a full paper cycle: seed books, solve, and
/// execute every leg against the simulated exchange.
pub async fn replay(snapshot_path: &str, config_path: &str) -> Result<()> {
    let mut config: AppConfig = ConfigLoader::load_from(config_path)?;
    let snapshot = load_snapshot(snapshot_path)?;

    // The replay target is the snapshot's symbols, and paper trading is
    // always allowed to run.
    config.exchange.symbols = snapshot.books.keys().cloned().collect();
    config.trading.enabled = true;

    let (tx, mut rx) = tokio::sync::mpsc::channel(256);
    let transport = PaperTransport::new(tx.clone());
    let mut bot = Bot::new(config, transport, LogNotifier, tx);

    for event in snapshot_events(&snapshot) {
        bot.handle_event(BotEvent::Exchange(event)).await;
    }

    bot.trading_cycle().await;
    if !bot.is_trading() {
        println!("no profitable cycle in this snapshot");
        return Ok(());
    }

    while bot.is_trading() {
        let Some(event) = rx.recv().await else {
            break;
        };
        bot.handle_event(event).await;
    }

    let submitted = bot.transport().submitted();
    info!(orders = submitted.len(), "replay complete");
    for request in submitted {
        println!(
            "{} {} @ {} amount {} (cid {})",
            request.order_type.as_str(),
            request.symbol,
            request.price,
            request.amount,
            request.cid,
        );
    }
    Ok(())
}
