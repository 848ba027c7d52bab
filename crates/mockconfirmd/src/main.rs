//! Install-confirmation test double daemon.

use anyhow::Result;
use clap::Parser;
use mockconfirmd::confirmation::{Confirmation, Decision};
use mockconfirmd::rpc_server;
use mockinstall_common::{CONFIRMATION_READY_MARKER, CONFIRMATION_SOCKET};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mockconfirmd")]
#[command(about = "Install-confirmation test double", long_about = None)]
struct Cli {
    /// Approve confirmation requests
    #[arg(long, overrides_with = "denied")]
    confirmed: bool,

    /// Deny confirmation requests (the default)
    #[arg(long, overrides_with = "confirmed")]
    denied: bool,

    /// Details string returned with the decision
    #[arg(long, default_value = "")]
    details: String,

    /// Error code returned with the decision
    #[arg(long, default_value_t = 0)]
    error_code: i32,

    /// Socket path to publish the interface on
    #[arg(long, default_value = CONFIRMATION_SOCKET)]
    socket: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let confirmation = Arc::new(Confirmation::new(Decision {
        confirmed: cli.confirmed && !cli.denied,
        error_code: cli.error_code,
        details: cli.details,
    }));

    let (listener, _guard) = rpc_server::bind(&cli.socket)?;

    // Readiness marker, watched by the caller to detect publication.
    println!("{CONFIRMATION_READY_MARKER}");

    tokio::select! {
        result = rpc_server::serve(listener, confirmation) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
            Ok(())
        }
    }
}
