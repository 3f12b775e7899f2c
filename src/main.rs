use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use groundwork::{
    api, config, logging,
    service::{RagApi, RagService},
};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "groundwork",
    about = "Grounded question answering over uploaded documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Port to bind; overrides `SERVER_PORT`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Drop and recreate the vector index, then exit.
    ResetIndex,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let service = RagService::from_config(config)
        .await
        .context("failed to initialize the RAG pipeline")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            let service = Arc::new(service);
            let app = api::create_router(service.clone(), config.admin_token.clone());
            let (listener, port) = bind_listener(port.or(config.server_port))
                .await
                .context("failed to bind listener")?;
            tracing::info!("Listening on http://0.0.0.0:{}", port);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server terminated unexpectedly")?;
            if let Ok(service) = Arc::try_unwrap(service) {
                service.close();
            }
        }
        Command::ResetIndex => {
            let outcome = service.reset_all().await.context("reset failed")?;
            tracing::warn!(
                documents_removed = outcome.documents_removed,
                "Vector index recreated from the command line"
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
