//! ombindex CLI: decode Ombuds transactions, inspect and manage an index.
//!
//! # Commands
//! ```bash
//! ombindex info
//! ombindex decode   <rawtx-hex> [--testnet]
//! ombindex tip      --db <path> [--config <file>]
//! ombindex rollback --db <path> [--config <file>] --height <h>
//! ombindex sql      --db <path> [--config <file>] "<select>"
//! ombindex censor   --db <path> [--config <file>] <txid> <reason>
//! ombindex uncensor --db <path> [--config <file>] <txid>
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use bitcoin::{Network, Transaction};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use ombindex_core::config::{MAINNET_PEG_HASH, MAINNET_PEG_HEIGHT, TESTNET_PEG_HASH};
use ombindex_core::StoreConfig;
use ombindex_storage::SqliteStorage;
use ombindex_wire::{extract, CHUNK_LEN, MAGIC, MAX_FRAME_LEN};

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "ombindex",
    about = "Index Ombuds bulletins and endorsements from Bitcoin transactions",
    long_about = "
ombindex: decode Ombuds records carried in Bitcoin transactions and manage
the SQLite index built from them.

ENVIRONMENT VARIABLES:
  OMBINDEX_DB   Path to the SQLite index (instead of --db)
  RUST_LOG      Log filter, e.g. `info,ombindex_storage=debug`
",
    version
)]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Path to the SQLite index
    #[arg(long, env = "OMBINDEX_DB")]
    db: String,

    /// JSON store configuration (network, peg, query limits)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show format constants and defaults
    Info,

    /// Decode the Ombuds record carried by a raw transaction
    Decode {
        /// Consensus-serialized transaction, hex encoded
        rawtx: String,
        /// Render the author as a testnet address
        #[arg(long)]
        testnet: bool,
    },

    /// Print the current tip of an index
    Tip {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Remove every block above a height
    Rollback {
        #[command(flatten)]
        store: StoreArgs,
        /// Keep blocks up to and including this height
        #[arg(long)]
        height: u64,
    },

    /// Run a read-only SQL query and print the rows as JSON
    Sql {
        #[command(flatten)]
        store: StoreArgs,
        query: String,
    },

    /// Blacklist a bulletin
    Censor {
        #[command(flatten)]
        store: StoreArgs,
        txid: String,
        reason: String,
    },

    /// Lift a bulletin's blacklisting
    Uncensor {
        #[command(flatten)]
        store: StoreArgs,
        txid: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        json: cli.json_logs,
    });

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Decode { rawtx, testnet } => cmd_decode(&rawtx, testnet),
        Commands::Tip { store } => {
            let store = open_store(&store).await?;
            let tip = store.current_tip().await?;
            println!("{}", serde_json::to_string_pretty(&tip)?);
            Ok(())
        }
        Commands::Rollback { store, height } => {
            let store = open_store(&store).await?;
            let removed = store.drop_after_height(height).await?;
            let tip = store.current_tip().await?;
            println!("Removed {removed} block(s); tip is now {} at height {}", tip.hash, tip.height);
            Ok(())
        }
        Commands::Sql { store, query } => {
            let store = open_store(&store).await?;
            let rows = store.execute_read_only(&query).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
        Commands::Censor { store, txid, reason } => {
            let store = open_store(&store).await?;
            store.censor(&txid, &reason).await?;
            println!("Censored {txid}");
            Ok(())
        }
        Commands::Uncensor { store, txid } => {
            let store = open_store(&store).await?;
            if store.uncensor(&txid).await? {
                println!("Uncensored {txid}");
            } else {
                println!("{txid} was not censored");
            }
            Ok(())
        }
    }
}

async fn open_store(args: &StoreArgs) -> Result<SqliteStorage> {
    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<StoreConfig>(&raw)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => StoreConfig::default(),
    };
    info!(db = %args.db, network = %config.network, "Opening index");
    let store = SqliteStorage::open(&args.db, config)
        .await
        .with_context(|| format!("opening {}", args.db))?;
    Ok(store)
}

fn cmd_decode(rawtx: &str, testnet: bool) -> Result<()> {
    let bytes = hex::decode(rawtx.trim()).context("transaction is not valid hex")?;
    let tx: Transaction =
        bitcoin::consensus::deserialize(&bytes).context("bytes are not a transaction")?;
    let network = if testnet {
        Network::Testnet
    } else {
        Network::Bitcoin
    };

    let extracted = extract(&tx, network)?;
    let out = serde_json::json!({
        "txid": tx.compute_txid().to_string(),
        "author": extracted.author,
        "record": extracted.record,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = StoreConfig::default();
    println!("ombindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Magic prefix:       {:?}", String::from_utf8_lossy(&MAGIC));
    println!("  Max frame length:   {MAX_FRAME_LEN} bytes");
    println!("  Chunk length:       {CHUNK_LEN} bytes per output");
    println!("  Mainnet peg:        {MAINNET_PEG_HASH} (height {MAINNET_PEG_HEIGHT})");
    println!("  Testnet peg:        {TESTNET_PEG_HASH}");
    println!("  Default network:    {}", defaults.network);
    println!("  Max query limit:    {}", defaults.max_query_limit);
    Ok(())
}
