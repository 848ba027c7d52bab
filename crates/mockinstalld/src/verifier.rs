//! Bundle digest verification.
//!
//! Computes a SHA-256 content digest of a bundle either by streaming a local
//! file or by issuing sequential ranged GET requests against a remote URL,
//! folding each block into the hash without retaining the payload. A 416
//! response marks the end of content; any other unsuccessful status aborts.

use mockinstall_common::{AuthContext, InstallError, ServerVerify};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Fetch/read block size. Matches the common squashfs image block size.
pub const BLOCK_SIZE: usize = 128 * 1024;

/// Whether `source` names a remote bundle.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// SHA-256 digest of a local file, streamed in fixed-size blocks.
pub fn file_digest(path: &Path) -> Result<String, InstallError> {
    let mut file = fs::File::open(path)
        .map_err(|e| InstallError::Transfer(format!("failed to open {}: {e}", path.display())))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| InstallError::Transfer(format!("read error on {}: {e}", path.display())))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 digest of a remote bundle, fetched with sequential `Range`
/// requests. The auth context is applied to every request.
pub async fn http_digest(
    url: &str,
    auth: &AuthContext,
    timeout: Duration,
) -> Result<String, InstallError> {
    let client = build_client(auth, timeout)?;
    let mut hasher = Sha256::new();
    let mut offset: u64 = 0;

    loop {
        let mut request = client.get(url).header(
            RANGE,
            format!("bytes={}-{}", offset, offset + BLOCK_SIZE as u64 - 1),
        );
        if let AuthContext::Header { key, value } = auth {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| InstallError::Transfer(format!("request to {url} failed: {e}")))?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            // Range exhausted, download complete.
            break;
        }
        if !response.status().is_success() {
            return Err(InstallError::Transfer(format!(
                "unexpected status {} fetching {url}",
                response.status()
            )));
        }

        let block = response
            .bytes()
            .await
            .map_err(|e| InstallError::Transfer(format!("body read from {url} failed: {e}")))?;
        hasher.update(&block);
        offset += BLOCK_SIZE as u64;
    }

    debug!(url, bytes = offset, "ranged download exhausted");
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of `source`, dispatching on local path vs. URL.
pub async fn source_digest(
    source: &str,
    auth: &AuthContext,
    timeout: Duration,
) -> Result<String, InstallError> {
    if is_remote(source) {
        http_digest(source, auth, timeout).await
    } else {
        file_digest(Path::new(source))
    }
}

/// Verifies that `source` hashes to `expected`. A mismatch means the install
/// input is invalid, not that the download glitched.
pub async fn verify(
    source: &str,
    auth: &AuthContext,
    expected: &str,
    timeout: Duration,
) -> Result<(), InstallError> {
    let computed = source_digest(source, auth, timeout).await?;
    if computed != expected {
        return Err(InstallError::ChecksumMismatch {
            expected: expected.to_string(),
            computed,
        });
    }
    Ok(())
}

fn build_client(auth: &AuthContext, timeout: Duration) -> Result<reqwest::Client, InstallError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);

    if let AuthContext::Mtls { cert, key, verify } = auth {
        let mut pem = fs::read(cert)
            .map_err(|e| InstallError::Transfer(format!("failed to read {}: {e}", cert.display())))?;
        let key_pem = fs::read(key)
            .map_err(|e| InstallError::Transfer(format!("failed to read {}: {e}", key.display())))?;
        pem.extend_from_slice(&key_pem);

        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| InstallError::Transfer(format!("invalid client identity: {e}")))?;
        builder = builder.identity(identity);

        match verify {
            ServerVerify::Disabled => {
                builder = builder.danger_accept_invalid_certs(true);
            }
            ServerVerify::CustomCa(ca_path) => {
                let ca_pem = fs::read(ca_path).map_err(|e| {
                    InstallError::Transfer(format!("failed to read {}: {e}", ca_path.display()))
                })?;
                let certificate = reqwest::Certificate::from_pem(&ca_pem)
                    .map_err(|e| InstallError::Transfer(format!("invalid CA bundle: {e}")))?;
                builder = builder.add_root_certificate(certificate);
            }
            ServerVerify::Default => {}
        }
    }

    builder
        .build()
        .map_err(|e| InstallError::Transfer(format!("client setup failed: {e}")))
}
