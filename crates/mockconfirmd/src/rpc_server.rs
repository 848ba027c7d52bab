//! RPC server - Unix socket interface of the confirmation test double.
//!
//! Same wire protocol as the installer daemon: newline-delimited JSON
//! requests and responses, with `Subscribe` switching the connection into a
//! signal stream.

use anyhow::{Context, Result};
use mockinstall_common::ipc::{ConfirmationSignal, Method, Request, Response, ResponseData};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::confirmation::Confirmation;

/// Removes the socket file when the service goes out of scope.
pub struct ServiceGuard {
    path: PathBuf,
}

impl Drop for ServiceGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        info!("unpublished {}", self.path.display());
    }
}

/// Binds the listener and returns it together with its cleanup guard.
pub fn bind(path: &Path) -> Result<(UnixListener, ServiceGuard)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    let _ = fs::remove_file(path);

    let listener = UnixListener::bind(path).context("Failed to bind Unix socket")?;
    info!("RPC server listening on {}", path.display());

    Ok((
        listener,
        ServiceGuard {
            path: path.to_path_buf(),
        },
    ))
}

/// Accepts connections until cancelled.
pub async fn serve(listener: UnixListener, confirmation: Arc<Confirmation>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let confirmation = Arc::clone(&confirmation);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, confirmation).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, confirmation: Arc<Confirmation>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("Failed to read from socket")?;

        if bytes_read == 0 {
            break;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid request JSON: {}", e);
                continue;
            }
        };

        if matches!(request.method, Method::Subscribe) {
            let response = Response {
                id: request.id,
                result: Ok(ResponseData::Subscribed),
            };
            write_json(&mut writer, &response).await?;
            return stream_signals(writer, confirmation.subscribe()).await;
        }

        let response = handle_request(request.id, request.method, &confirmation);
        write_json(&mut writer, &response).await?;
    }

    Ok(())
}

async fn stream_signals(
    mut writer: OwnedWriteHalf,
    mut rx: broadcast::Receiver<ConfirmationSignal>,
) -> Result<()> {
    loop {
        match rx.recv().await {
            Ok(signal) => write_json(&mut writer, &signal).await?,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("subscriber lagged, {skipped} signals dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_json<T: serde::Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)? + "\n";
    writer
        .write_all(json.as_bytes())
        .await
        .context("Failed to write to socket")
}

fn handle_request(id: u64, method: Method, confirmation: &Arc<Confirmation>) -> Response {
    let result = match method {
        Method::Ping => Ok(ResponseData::Ok),

        Method::ConfirmInstallationRequest { action_id, version } => {
            confirmation.confirm_installation_request(&action_id, &version);
            Ok(ResponseData::Ok)
        }

        Method::Subscribe => unreachable!("handled by the connection loop"),

        other => Err(format!("unsupported method on this interface: {other:?}")),
    };

    Response { id, result }
}
