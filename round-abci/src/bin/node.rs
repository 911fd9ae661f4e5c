//! ABCI Node Binary
//!
//! Serves the round ABCI application to a consensus engine. The address
//! handshake needs the agent's transport and is wired by the embedding agent
//! through [`round_abci::TendermintHandler::from_config`].

use anyhow::Context;
use round_abci::{AbciServer, Config, Period, RoundApp, SignedTransactionCodec, Transaction};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting round ABCI node");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("ABCI_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };

    info!(
        "Agent: {}, Ledger: {}",
        config.agent_address, config.ledger_id
    );

    // ABCI application
    let codec = SignedTransactionCodec::new(config.abci.transaction_types.iter().cloned());
    let app = RoundApp::new(Period::<Transaction>::new(), codec, config.ledger_id.clone());
    let server = AbciServer::new(app);

    let listen_addr = config.abci.listen_addr.clone();
    info!("Starting ABCI server on {}", listen_addr);
    let server_handle = std::thread::Builder::new()
        .name("abci-server".to_string())
        .spawn(move || {
            if let Err(e) = server.serve(listen_addr.as_str()) {
                error!("ABCI server error: {}", e);
            }
        })
        .context("failed to spawn ABCI server thread")?;

    info!("Round ABCI node running");
    info!("- ABCI: {}", config.abci.listen_addr);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // The listener thread has no shutdown hook and ends with the process
    info!("Shutting down round ABCI node...");
    drop(server_handle);

    info!("Round ABCI node stopped");
    Ok(())
}
