//! Ferry Broker - rendezvous server issuing short session identifiers

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ferry_broker::registry::SessionRegistry;
use ferry_broker::service;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ferry-broker")]
#[command(about = "Ferry rendezvous broker", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = ferry_core::DEFAULT_BROKER_ADDR)]
    listen: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let listener = TcpListener::bind(&cli.listen).await?;
    tracing::info!("Starting broker on {}", listener.local_addr()?);

    let registry = Arc::new(SessionRegistry::new());

    tokio::select! {
        res = service::serve(listener, registry) => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
