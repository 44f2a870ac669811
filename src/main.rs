//! CLI for simrelay
//!
//! Subcommands:
//! - `serve` (default): run the HTTP ingress and the WebSocket server
//! - `check-config`: print the effective settings and exit

use std::sync::Arc;

use clap::{Parser, Subcommand};
use simrelay::broker::{Relay, SubscriberRegistry};
use simrelay::config::{load_config_from, Settings, DEFAULT_CONFIG_PATH};
use simrelay::persistence::SledStore;
use simrelay::transport::{serve_http, serve_websocket};
use simrelay::utils::error::ServerError;
use simrelay::utils::logging;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "simrelay",
    about = "Persist HTTP-submitted messages and relay them to WebSocket subscribers"
)]
struct Cli {
    /// Config file to load (extension optional)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay
    Serve,
    /// Print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config).map_err(ServerError::from) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to start: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {e}");
                std::process::exit(1);
            }
        }
        Command::CheckConfig => match serde_json::to_string_pretty(&settings) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to render configuration: {e}"),
        },
    }
}

async fn run_server(settings: Settings) -> Result<(), ServerError> {
    let store = Arc::new(SledStore::open(&settings.storage.path)?);
    info!(path = %settings.storage.path, "message store opened");

    let registry = Arc::new(SubscriberRegistry::new(settings.relay.send_timeout()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    registry.clone().spawn_event_loop(events_rx);

    let relay = Arc::new(Relay::new(store, registry));

    let ws_listener = TcpListener::bind(settings.server.ws_addr()).await?;
    let http_listener = TcpListener::bind(settings.server.http_addr()).await?;

    tokio::select! {
        _ = serve_websocket(ws_listener, events_tx, settings.relay.clone()) => {
            error!("WebSocket server exited unexpectedly.");
        }
        result = serve_http(http_listener, relay) => {
            result?;
            error!("HTTP ingress exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
