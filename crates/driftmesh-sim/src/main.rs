//! driftmesh-sim -- runs a relay-line scenario over an in-memory radio hub.
//!
//! Usage:
//!
//!   driftmesh-sim [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>          Load scenario config from a JSON file
//!   --nodes <N>              Nodes in the line (default: 4)
//!   --hop-budget <N>         Initial hop budget of new envelopes
//!   --ttl-ms <MS>            Envelope lifetime
//!   --storage-limit <N>      Per-node store capacity
//!   --message <TEXT>         Text sent from the first node to the last
//!   --timeout-secs <S>       Link-up and delivery timeout
//!   --data-dir <PATH>        Persist each node's store with sled
//!
//! Exit status is 0 when the message reaches the last node, 2 when it
//! does not, and 1 on any setup error.

use std::path::PathBuf;

use clap::Parser;

mod config;
mod scenario;

use config::{ScenarioArgs, SimConfig};

#[derive(Parser, Debug)]
#[command(name = "driftmesh-sim", version, about = "Relay-line scenario runner for driftmesh")]
struct Cli {
    /// JSON scenario config. Flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    scenario: ScenarioArgs,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let sim_config = match &cli.config {
        Some(path) => match SimConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli.scenario),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => SimConfig::default().merge_cli(&cli.scenario),
    };

    tracing::info!(
        nodes = sim_config.nodes,
        hop_budget = sim_config.hop_budget,
        ttl_ms = sim_config.ttl_ms,
        storage_limit = sim_config.storage_limit,
        "starting relay line"
    );

    match scenario::run_relay_line(&sim_config).await {
        Ok(report) if report.delivered => {
            tracing::info!(
                hops_spent = ?report.hops_spent,
                elapsed = ?report.elapsed,
                stored = ?report.stored,
                "message delivered"
            );
        }
        Ok(report) => {
            tracing::warn!(
                elapsed = ?report.elapsed,
                stored = ?report.stored,
                "message did not reach the last node"
            );
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!("scenario error: {e}");
            std::process::exit(1);
        }
    }
}
