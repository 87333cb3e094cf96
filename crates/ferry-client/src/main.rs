//! Ferry - rendezvous-brokered point-to-point file transfer

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ferry_client::broker::BrokerClient;
use ferry_client::config::Config;
use ferry_client::receiver::Receiver;
use ferry_client::sender::Sender;
use ferry_core::{ProgressReceiver, TransferState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Send a file to a peer via a short rendezvous code", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker address (host:port), overrides config
    #[arg(long)]
    broker: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Offer a file and print the session id for the receiver
    Send {
        /// Path to the file to send
        #[arg(required = true)]
        file: PathBuf,

        /// Port to listen on for the direct connection
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Fetch a file using the session id shown on the sending side
    Receive {
        /// Session id to join
        #[arg(required = true)]
        session_id: String,

        /// Directory to write the received file into
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Accept the transfer without prompting
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(broker) = cli.broker {
        config.broker_addr = broker;
    }

    // Ctrl-C cancels the in-flight transfer cooperatively.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Send { file, port } => send(config, file, port, cancel).await,
        Commands::Receive {
            session_id,
            output,
            yes,
        } => receive(config, session_id, output, yes, cancel).await,
    }
}

async fn send(
    config: Config,
    file: PathBuf,
    port: Option<u16>,
    cancel: CancellationToken,
) -> Result<()> {
    let broker = BrokerClient::new(&config.broker_addr);
    let sender = Sender::new(broker, port.unwrap_or(config.transfer_port))
        .with_io_timeout(Duration::from_secs(config.io_timeout_secs));

    let events = sender.spawn(file, cancel);
    render(events).await
}

async fn receive(
    config: Config,
    session_id: String,
    output: Option<PathBuf>,
    yes: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let broker = BrokerClient::new(&config.broker_addr);
    let receiver = Receiver::new(broker.clone(), config.transfer_addr())
        .with_io_timeout(Duration::from_secs(config.io_timeout_secs));

    let incoming = receiver.connect(&session_id, &cancel).await?;
    let metadata = incoming.metadata();
    println!(
        "{} ({} bytes) offered by {}",
        metadata.name, metadata.size, metadata.sender_address
    );

    let result = if yes || prompt_accept().await? {
        let dest_dir = output.unwrap_or_else(|| config.download_dir());
        render(incoming.accept(dest_dir)).await
    } else {
        incoming.reject().await?;
        println!("Transfer rejected");
        Ok(())
    };

    // Free the receiver slot either way so the session can be joined again.
    if let Err(e) = broker.leave_session(&session_id).await {
        tracing::warn!("couldn't leave session cleanly: {e}");
    }

    result
}

async fn prompt_accept() -> Result<bool> {
    let answer = tokio::task::spawn_blocking(|| -> std::io::Result<bool> {
        print!("Accept transfer? [y/N] ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(matches!(line.trim(), "y" | "Y" | "yes"))
    })
    .await??;
    Ok(answer)
}

/// Drain the progress channel, rendering each event, until the transfer
/// task closes it after the terminal event.
async fn render(mut events: ProgressReceiver) -> Result<()> {
    let mut failure = None;

    while let Some(event) = events.recv().await {
        match event.state {
            TransferState::Initializing => {}
            TransferState::WaitingForReceiver => {
                if let Some(id) = &event.session_id {
                    println!("Session id: {id}");
                    println!("Waiting for receiver...");
                }
            }
            TransferState::Transferring | TransferState::Receiving => {
                render_progress(&event);
            }
            TransferState::Completed => {
                println!();
                println!(
                    "Transfer complete: {} bytes ({:.2} MB/s)",
                    event.bytes_moved, event.speed
                );
            }
            TransferState::Cancelled => {
                println!();
                match &event.error {
                    Some(e) => println!("{e}"),
                    None => println!("Transfer cancelled"),
                }
            }
            TransferState::Error => {
                println!();
                failure = event.error;
            }
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn render_progress(event: &ferry_core::ProgressEvent) {
    if event.total_bytes > 0 {
        let percent = event.bytes_moved * 100 / event.total_bytes;
        print!("\r{percent:3}% ({:.2} MB/s)", event.speed);
    } else {
        print!("\r{} bytes ({:.2} MB/s)", event.bytes_moved, event.speed);
    }
    let _ = std::io::stdout().flush();
}
