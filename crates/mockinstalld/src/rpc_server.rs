//! RPC server - Unix socket interface of the installer test double.
//!
//! Speaks newline-delimited JSON: one `Request` per line in, one `Response`
//! per line out. A `Subscribe` request converts the connection into a signal
//! stream that forwards installer signals in emission order.

use anyhow::{Context, Result};
use mockinstall_common::ipc::{InstallerSignal, Method, Request, Response, ResponseData};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::installer::Installer;

/// Removes the socket file when the service goes out of scope, on every exit
/// path including setup failure.
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

    // Remove a stale socket from a previous run.
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
pub async fn serve(listener: UnixListener, installer: Arc<Installer>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let installer = Arc::clone(&installer);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, installer).await {
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

/// Handles a single client connection.
async fn handle_connection(stream: UnixStream, installer: Arc<Installer>) -> Result<()> {
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
            // The connection now carries signals only.
            return stream_signals(writer, installer.subscribe()).await;
        }

        let response = handle_request(request.id, request.method, &installer).await;
        write_json(&mut writer, &response).await?;
    }

    Ok(())
}

/// Forwards installer signals to a subscribed client until it disconnects.
async fn stream_signals(
    mut writer: OwnedWriteHalf,
    mut rx: broadcast::Receiver<InstallerSignal>,
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

/// Handles a single request.
async fn handle_request(id: u64, method: Method, installer: &Arc<Installer>) -> Response {
    let result = match method {
        Method::Ping => Ok(ResponseData::Ok),

        Method::Properties => Ok(ResponseData::Properties(installer.properties())),

        Method::InstallBundle { source, args } => Arc::clone(installer)
            .install_bundle(&source, &args)
            .await
            .map(|_| ResponseData::Ok)
            .map_err(|e| e.to_string()),

        Method::Subscribe => unreachable!("handled by the connection loop"),

        other => Err(format!("unsupported method on this interface: {other:?}")),
    };

    Response { id, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockinstall_common::ipc::PropertyUpdate;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn write_bundle(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    async fn start_test_server(installer: Arc<Installer>) -> (tempfile::TempDir, PathBuf, ServiceGuard) {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("installer.sock");
        let (listener, guard) = bind(&socket).unwrap();
        tokio::spawn(serve(listener, installer));
        (dir, socket, guard)
    }

    async fn round_trip(stream: &mut UnixStream, request: &Request) -> Response {
        let json = serde_json::to_string(request).unwrap() + "\n";
        stream.write_all(json.as_bytes()).await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_properties_round_trip() {
        let bundle = write_bundle(b"socket bundle");
        let installer = Arc::new(
            Installer::open(bundle.path(), 0, None, Duration::from_secs(10)).unwrap(),
        );
        let (_dir, socket, _guard) = start_test_server(installer).await;

        let mut stream = UnixStream::connect(&socket).await.unwrap();

        let pong = round_trip(
            &mut stream,
            &Request {
                id: 1,
                method: Method::Ping,
            },
        )
        .await;
        assert!(matches!(pong.result, Ok(ResponseData::Ok)));

        let response = round_trip(
            &mut stream,
            &Request {
                id: 2,
                method: Method::Properties,
            },
        )
        .await;
        match response.result {
            Ok(ResponseData::Properties(properties)) => {
                assert_eq!(properties.operation, "idle");
                assert_eq!(properties.compatible, "not implemented");
                assert_eq!(properties.variant, "not implemented");
                assert_eq!(properties.boot_slot, "not implemented");
            }
            other => panic!("expected properties, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_config_error_surfaces_in_response() {
        let bundle = write_bundle(b"socket bundle");
        let installer = Arc::new(
            Installer::open(bundle.path(), 0, None, Duration::from_secs(10)).unwrap(),
        );
        let (_dir, socket, _guard) = start_test_server(installer).await;

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        let mut args = HashMap::new();
        args.insert(
            "http-headers".to_string(),
            serde_json::json!(["A: 1", "B: 2"]),
        );

        let response = round_trip(
            &mut stream,
            &Request {
                id: 3,
                method: Method::InstallBundle {
                    source: "https://host/bundle".into(),
                    args,
                },
            },
        )
        .await;
        let err = response.result.unwrap_err();
        assert!(err.contains("configuration error"));
    }

    #[tokio::test]
    async fn test_subscriber_observes_install_signals() {
        let bundle = write_bundle(b"subscribed bundle");
        let installer = Arc::new(
            Installer::open(bundle.path(), 0, None, Duration::from_millis(100)).unwrap(),
        );
        let (_dir, socket, _guard) = start_test_server(Arc::clone(&installer)).await;

        // Subscribe on one connection, install on another.
        let mut sub = UnixStream::connect(&socket).await.unwrap();
        let response = round_trip(
            &mut sub,
            &Request {
                id: 1,
                method: Method::Subscribe,
            },
        )
        .await;
        assert!(matches!(response.result, Ok(ResponseData::Subscribed)));

        let mut caller = UnixStream::connect(&socket).await.unwrap();
        let response = round_trip(
            &mut caller,
            &Request {
                id: 2,
                method: Method::InstallBundle {
                    source: bundle.path().to_str().unwrap().into(),
                    args: HashMap::new(),
                },
            },
        )
        .await;
        assert!(matches!(response.result, Ok(ResponseData::Ok)));

        let mut reader = BufReader::new(sub);
        let mut completed_code = None;
        let mut progress_count = 0;
        while completed_code.is_none() {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let signal: InstallerSignal = serde_json::from_str(&line).unwrap();
            match signal {
                InstallerSignal::PropertiesChanged {
                    update: PropertyUpdate::Progress(_),
                    ..
                } => progress_count += 1,
                InstallerSignal::Completed { code } => completed_code = Some(code),
                _ => {}
            }
        }

        assert_eq!(progress_count, 18);
        assert_eq!(completed_code, Some(0));
    }

    #[tokio::test]
    async fn test_guard_removes_socket_file() {
        let bundle = write_bundle(b"guarded bundle");
        let installer = Arc::new(
            Installer::open(bundle.path(), 0, None, Duration::from_secs(10)).unwrap(),
        );
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("installer.sock");

        {
            let (_listener, _guard) = bind(&socket).unwrap();
            assert!(socket.exists());
            let _ = installer;
        }
        assert!(!socket.exists());
    }
}
