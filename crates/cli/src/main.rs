use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cycle-trade")]
#[command(about = "Circular-arbitrage trading system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve for profitable cycles over a saved book snapshot
    Solve {
        /// Book snapshot JSON produced by the bot's periodic dump
        #[arg(short, long)]
        snapshot: String,
        /// Start currency (defaults to the configured one)
        #[arg(long)]
        start: Option<String>,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Replay a saved snapshot through a full paper trading cycle
    Replay {
        /// Book snapshot JSON to seed the books from
        #[arg(short, long)]
        snapshot: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Solve {
            snapshot,
            start,
            config,
        } => commands::solve(&snapshot, start.as_deref(), &config),
        Commands::Replay { snapshot, config } => commands::replay(&snapshot, &config).await,
    }
}
