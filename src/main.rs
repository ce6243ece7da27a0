//! Lottery client: interactive session
//!
//! Drives a `LotteryClient` against the in-process ledger. The cache lives in
//! a sled database under `--data-dir`, so cached references survive restarts
//! (and are purged by reconciliation, since the simulated ledger does not).

use clap::Parser;
use lottery_client::{
    Address, KvStore, LotteryClient, LotteryConfig, LotteryState, MemoryStore, PollPolicy,
    SimLedger, SledStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package id the simulated ledger publishes the lottery module under
const SIM_PACKAGE: &str = "0x2c427943bf77390b52d046421a239598e20585fee6581f5ef566f59dd5b74481";

#[derive(Parser)]
#[command(name = "lottery", version, about = "Lottery client: buy, draw, check")]
struct Args {
    /// Wallet address to connect on start
    #[arg(short, long, default_value = "0xA1")]
    address: String,

    /// Lottery package id
    #[arg(short, long, default_value = SIM_PACKAGE)]
    package: String,

    /// Cache directory (sled)
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Keep the cache in memory only
    #[arg(long)]
    memory: bool,

    /// Seconds between two draws from the same address
    #[arg(long, default_value = "30")]
    cooldown_secs: u64,

    /// Seed for the simulated draw
    #[arg(long, default_value = "7")]
    seed: u64,
}

type Client = LotteryClient<SimLedger, SimLedger>;

fn print_state(state: &LotteryState) {
    let address = state.address.as_ref().map(|a| a.to_string()).unwrap_or_else(|| "-".into());
    info!("Account: {} | round: {:?}", address, state.round());
    match &state.ticket {
        Some(t) => info!(
            "  Ticket: {} (#{})",
            t.id,
            t.number.map(|n| n.to_string()).unwrap_or_else(|| "?".into())
        ),
        None => info!("  Ticket: none"),
    }
    if let Some(lucky) = &state.lucky_ref {
        info!("  Lucky:  {} = {:?}", lucky, state.lucky_number);
    }
    if let Some(winner) = &state.winner_ref {
        info!("  Winner badge: {}", winner);
    }
    if let Some(tx) = &state.last_tx {
        info!("  Last tx: {}", tx);
    }
    if let Some(e) = &state.last_error {
        warn!("  Last error: {}", e);
    }
}

/// Returns false when the session should end
async fn handle_command(client: &Client, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return true;
    };

    let result = match cmd {
        "buy" => match parts.next() {
            Some(n) => client.buy_ticket_input(n).await,
            None => {
                warn!("Usage: buy <0-65535>");
                return true;
            }
        },
        "draw" => client.draw_lucky().await,
        "check" => client.check_winner().await,
        "status" => Ok(()),
        "objects" => {
            match client.owned_objects().await {
                Ok(objects) => {
                    info!("{} owned objects", objects.len());
                    for o in objects {
                        info!("  {} {}", o.id, o.object_type);
                    }
                }
                Err(e) => warn!("{}", e),
            }
            return true;
        }
        "account" => {
            let address = match parts.next() {
                Some("none") | None => None,
                Some(a) => Some(Address::from(a)),
            };
            client.set_account(address).await;
            Ok(())
        }
        "quit" | "exit" => return false,
        other => {
            warn!("Unknown command '{}'. Commands: buy <n>, draw, check, status, objects, account <addr|none>, quit", other);
            return true;
        }
    };

    if let Err(e) = result {
        error!("{} failed: {}", cmd, e);
    }
    print_state(&client.state());
    true
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lottery_client=info,lottery=info")),
        )
        .init();

    let args = Args::parse();

    info!("════════════════════════════════════════════════════════════");
    info!("  Lottery client v{}", VERSION);
    info!("════════════════════════════════════════════════════════════");

    let store: Arc<dyn KvStore> = if args.memory {
        Arc::new(MemoryStore::new())
    } else {
        if let Err(e) = std::fs::create_dir_all(&args.data_dir) {
            error!("Cannot create data dir {}: {}", args.data_dir.display(), e);
            return;
        }
        match SledStore::open(&args.data_dir) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!("Cannot open cache at {}: {}", args.data_dir.display(), e);
                return;
            }
        }
    };

    let ledger = Arc::new(SimLedger::new(args.package.clone(), args.seed));
    let config = LotteryConfig {
        package_id: Some(args.package),
        draw_cooldown: Duration::from_secs(args.cooldown_secs),
        poll: PollPolicy::default(),
    };
    let client = LotteryClient::new(ledger.clone(), ledger, store, config);

    client.set_account(Some(Address::from(args.address.as_str()))).await;
    print_state(&client.state());
    info!("Commands: buy <n>, draw, check, status, objects, account <addr|none>, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !handle_command(&client, line.trim()).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("stdin: {}", e);
                break;
            }
        }
    }

    info!("Shutting down...");
}
