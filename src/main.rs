#![cfg_attr(not(test), deny(clippy::panic))]

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use webparty_server::config;
use webparty_server::gateway::Gateway;
use webparty_server::logging;
use webparty_server::room::Manager;
use webparty_server::scripts::FsScriptStore;
use webparty_server::websocket::{self, AppState, Hub};

/// WebParty -- real-time server for multi-room party games
#[derive(Parser, Debug)]
#[command(name = "webparty-server")]
#[command(about = "Real-time server for a multi-room, party-style game platform")]
#[command(version)]
struct Cli {
    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config.json if present, env overrides on top, code defaults otherwise.
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    logging::init_with_config(&cfg.logging);

    let manager = Arc::new(Manager::new(cfg.manager.clone().into()));
    let scripts = Arc::new(FsScriptStore::new(&cfg.scripts_dir));
    let hub = Arc::new(Hub::new());
    let gateway = Arc::new(
        Gateway::new(manager, scripts, hub.clone())
            .with_flow_timings(cfg.flow.timings())
            .with_room_defaults(cfg.room),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, scripts_dir = %cfg.scripts_dir, "Starting WebParty server");

    websocket::run_server(addr, Arc::new(AppState { gateway, hub })).await
}
