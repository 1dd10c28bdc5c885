//! GM Points CLI
//!
//! Read the leaderboard, inspect a wallet and trigger reindexing.

mod client;
mod commands;
mod style;

use clap::{Parser, Subcommand};
use style::*;

#[derive(Parser)]
#[command(name = "gm")]
#[command(version)]
#[command(about = "GM Points - daily check-in rewards", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// GM Points server URL
    #[arg(
        short,
        long,
        env = "GM_SERVER_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    server: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View the leaderboard
    #[command(visible_alias = "lb")]
    Leaderboard {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a wallet's points and streak
    #[command(visible_alias = "p")]
    Points {
        /// Wallet address (0x...)
        wallet: String,
    },

    /// Reconcile new claims into the leaderboard now
    Reindex,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let result = match cli.command {
        Commands::Leaderboard { limit } => commands::leaderboard::run(&cli.server, limit).await,
        Commands::Points { wallet } => commands::points::run(&cli.server, &wallet).await,
        Commands::Reindex => commands::reindex::run(&cli.server).await,
    };

    if let Err(e) = result {
        print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
