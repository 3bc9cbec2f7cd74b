//! AfkBot - Entry Point
//!
//! Modes:
//! - --probe: one liveness probe against the configured server, then exit
//! - --simulate: run the full agent against the in-process simulated world
//!
//! A live game connector is supplied by embedding the library and passing
//! a `SessionConnector` to `Orchestrator::new`.

use afkbot::{Config, LivenessProbe, Orchestrator, ServerListPing, SimWorld};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

fn print_help() {
    println!("AfkBot v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: afkbot [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config, -c <path>  TOML config file (default: afkbot.toml if present)");
    println!("  --probe, -p          Ping the configured server once and exit");
    println!("  --simulate, -s       Run against the simulated world");
    println!("  --help, -h           Show this help");
    println!();
    println!("Environment variables:");
    println!("  AFKBOT_HOST              Server host");
    println!("  AFKBOT_PORT              Server port");
    println!("  AFKBOT_USERNAME          Account name");
    println!("  AFKBOT_PROTOCOL_VERSION  Protocol version");
    println!("  AFKBOT_MESSAGES          Message pools JSON file");
    println!("  RUST_LOG                 Log level (default: info)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let probe_mode = args.iter().any(|a| a == "--probe" || a == "-p");
    let simulate_mode = args.iter().any(|a| a == "--simulate" || a == "-s");

    let config_path = args
        .iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("afkbot.toml")).filter(|p| p.exists()));

    let config = Config::load(config_path.as_deref())?;
    afkbot::logging::init(&config.agent_name)?;
    info!("AfkBot v{}", env!("CARGO_PKG_VERSION"));

    if probe_mode {
        let target = config.target();
        let status = ServerListPing::new(config.ping_timeout()).probe(&target).await?;
        let latency = status
            .latency
            .map_or("?".to_string(), |d| format!("{}ms", d.as_millis()));
        info!(
            "{} is online: {} (protocol {}), {}/{} players, latency {}",
            target.address(),
            status.version_name,
            status.protocol,
            status.online_players,
            status.max_players,
            latency
        );
        return Ok(());
    }

    if !simulate_mode {
        print_help();
        anyhow::bail!("no game connector available; embed the library or use --simulate");
    }

    let world = SimWorld::new();
    world.give(world.stack("bread", 8));
    let _drain = world.spawn_hunger_drain(Duration::from_secs(20));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Signal handler failed: {}", e),
        }
    });

    let orchestrator = Orchestrator::new(config, Arc::new(world.connector()), Arc::new(world.probe()));
    orchestrator.run(shutdown_rx).await
}
