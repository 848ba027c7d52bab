//! Installer test double daemon.
//!
//! Publishes the simulated installer on a Unix socket and prints the
//! readiness marker once publication succeeds.

use anyhow::{Context, Result};
use clap::Parser;
use mockinstall_common::mtls::MtlsPaths;
use mockinstall_common::{INSTALLER_READY_MARKER, INSTALLER_SOCKET};
use mockinstalld::installer::Installer;
use mockinstalld::rpc_server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mockinstalld")]
#[command(about = "Update installer test double", long_about = None)]
struct Cli {
    /// Reference bundle the installer verifies install sources against
    bundle: PathBuf,

    /// Code to emit with the Completed signal
    #[arg(long, default_value_t = 0)]
    completed_code: i32,

    /// Expect mutual-TLS downloads, using credentials below --tmp-dir
    #[arg(long)]
    mtls: bool,

    /// Directory holding the mTLS credential material
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Socket path to publish the interface on
    #[arg(long, default_value = INSTALLER_SOCKET)]
    socket: PathBuf,

    /// Timeout in seconds applied to each ranged download request
    #[arg(long, default_value_t = 60)]
    transfer_timeout: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let mtls = if cli.mtls {
        let base = cli
            .tmp_dir
            .as_deref()
            .context("--mtls requires --tmp-dir for the credential material")?;
        let paths = MtlsPaths::new(base);
        paths
            .check_material()
            .with_context(|| format!("mTLS credentials under {}", paths.certs_dir.display()))?;
        if let Ok(hash) = paths.issuer_hash() {
            info!(issuer_hash = %hash, "Using mTLS client credentials");
        }
        Some(paths)
    } else {
        None
    };

    let installer = Arc::new(Installer::open(
        &cli.bundle,
        cli.completed_code,
        mtls,
        Duration::from_secs(cli.transfer_timeout),
    )?);

    let (listener, _guard) = rpc_server::bind(&cli.socket)?;

    // Readiness marker, watched by the caller to detect publication.
    println!("{INSTALLER_READY_MARKER}");

    tokio::select! {
        result = rpc_server::serve(listener, installer) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
            Ok(())
        }
    }
}
