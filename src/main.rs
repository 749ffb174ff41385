use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::*;

use pricefeed::{logs, EventBus, LocalBackend, LogWatcher, MarketSnapshot, MarketStore};

#[derive(Parser)]
#[command(name = "pricefeed")]
#[command(
    about = "Watch market log exports and keep a live, synchronized view of item pricing",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the log directory and report every price change
    Watch {
        /// Log directory (defaults to Documents/EVE/logs/Marketlogs)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Parse one market log export and print it as JSON
    Parse {
        /// Path to the export file
        file: PathBuf,
    },

    /// Parse the newest export in the log directory and print a summary
    Status {
        /// Log directory (defaults to Documents/EVE/logs/Marketlogs)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricefeed=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { dir } => watch(resolve_dir(dir)?).await,
        Commands::Parse { file } => {
            let snapshot = logs::parse_log_file(&file)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Commands::Status { dir } => {
            let snapshot = logs::parse_latest(&resolve_dir(dir)?)?;
            print_snapshot_line(&snapshot);
            Ok(())
        }
    }
}

fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    dir.or_else(logs::default_logs_dir)
        .ok_or_else(|| anyhow!("no log directory given and no Documents directory found"))
}

async fn watch(dir: PathBuf) -> Result<()> {
    let bus = EventBus::new();
    let backend = LocalBackend::new(dir.clone(), bus.clone());
    backend.prime()?;

    let store = MarketStore::new(Arc::new(backend.clone()), bus.clone());
    let _subscriptions = store.initialize().await?;

    let watcher = LogWatcher::new(&dir)?;
    tokio::spawn(watcher.run(backend));

    println!(
        "{} Watching {}",
        "✓".green(),
        dir.display().to_string().bright_blue()
    );
    print_store_line(&store);

    let mut snapshots = bus.subscribe_snapshots();
    let mut modes = bus.subscribe_modes();

    loop {
        tokio::select! {
            result = snapshots.recv() => {
                if result.is_err() {
                    break;
                }
                // Give the store's own subscription a turn to absorb the
                // push before reading the derived price back out.
                tokio::task::yield_now().await;
                print_store_line(&store);
            }
            result = modes.recv() => {
                if result.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
                print_store_line(&store);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{} Stopped", "✓".green());
                break;
            }
        }
    }

    Ok(())
}

fn print_store_line(store: &MarketStore) {
    let state = store.state();
    let item = state
        .snapshot
        .item_name
        .as_deref()
        .unwrap_or("(no item tracked)");
    let price = match state.snapshot.active_price(state.mode) {
        Some(p) => format!("{:.2}", p).bright_green().to_string(),
        None => "-".dimmed().to_string(),
    };
    let retained = match state.last_active_price {
        Some(p) => format!("{:.2}", p),
        None => "-".into(),
    };

    println!(
        "{} {} [{}] active {} (last known {})",
        "→".cyan(),
        item.bold(),
        state.mode,
        price,
        retained
    );
}

fn print_snapshot_line(snapshot: &MarketSnapshot) {
    if !snapshot.is_tracked() {
        println!("{} No market log found", "!".yellow());
        return;
    }

    println!(
        "{} {} sell {} / buy {} ({} sell orders, {} buy orders)",
        "✓".green(),
        snapshot.item_name.as_deref().unwrap_or("?").bold(),
        snapshot
            .adjusted_sell
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".into()),
        snapshot
            .adjusted_buy
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".into()),
        snapshot.sell_order_count,
        snapshot.buy_order_count,
    );
}
