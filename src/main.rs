//! CLI for secdash
//!
//! Subcommands:
//! - `server`: run the WebSocket broadcaster and the telemetry simulator
//! - `watch`: connect to a channel and print what arrives (smoke tests)

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use secdash::broadcaster::ChannelBroadcaster;
use secdash::config::{Settings, load_config};
use secdash::simulator::Simulator;
use secdash::transport::start_websocket_server;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "secdash")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Print every frame received on a channel
    Watch {
        /// WebSocket URL including the channel route
        #[arg(long, default_value = "ws://127.0.0.1:8000/ws/alerts")]
        url: String,
        /// Stop after this many frames (0 = run until closed)
        #[arg(long, default_value_t = 0)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            let config = match load_config() {
                Ok(config) => config,
                Err(e) => {
                    // no configured level yet, report at the default one
                    secdash::utils::logging::init("info");
                    error!("Failed to load configuration: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            secdash::utils::logging::init(&config.log.level);

            if let Err(e) = run_server(config).await {
                error!("Server failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
        Command::Watch { url, count } => {
            secdash::utils::logging::init("info");
            if let Err(e) = run_watch(&url, count).await {
                error!("Watch failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let broadcaster = Arc::new(ChannelBroadcaster::from_settings(&config.broadcaster));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let simulator = if config.simulator.enabled {
        let simulator = Simulator::from_settings(broadcaster.clone(), &config.simulator);
        Some(tokio::spawn(simulator.run(shutdown_rx)))
    } else {
        None
    };

    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        res = start_websocket_server(addr, broadcaster.clone()) => {
            error!("WebSocket server exited unexpectedly.");
            res.map_err(Into::into)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    if let Some(handle) = simulator {
        let _ = handle.await;
    }
    broadcaster.shutdown();

    result
}

async fn run_watch(url: &str, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {url}");

    let mut seen = 0;
    while let Some(frame) = ws_stream.next().await {
        match frame? {
            WsMessage::Text(text) => {
                println!("{}", text.as_str());
                seen += 1;
                if count > 0 && seen >= count {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}
