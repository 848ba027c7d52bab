//! Authentication context for bundle downloads.
//!
//! An `InstallBundle` call carries its download auth material in the `args`
//! mapping. Exactly one context is active per invocation: none, a single
//! auth header, or a mutual-TLS client identity.

use crate::error::InstallError;
use crate::mtls::MtlsPaths;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// How the server certificate is validated during a ranged fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerVerify {
    /// Skip validation entirely (`tls-no-verify`).
    Disabled,
    /// Pin validation to a custom CA bundle (`tls-ca`).
    CustomCa(PathBuf),
    /// Platform default trust roots.
    Default,
}

/// Auth material applied to every ranged fetch of one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// No authentication.
    None,
    /// One header attached to every request, e.g. a deployment token.
    Header { key: String, value: String },
    /// Mutual TLS: client certificate and key presented on every request.
    Mtls {
        cert: PathBuf,
        key: PathBuf,
        verify: ServerVerify,
    },
}

impl AuthContext {
    /// Builds the auth context from `InstallBundle` args.
    ///
    /// `fallback` is the daemon-level mTLS credential material (from
    /// `--mtls`/`--tmp-dir`), used when the call itself carries no auth keys.
    /// Contradictory or incomplete args are a configuration error, raised
    /// before anything else happens.
    pub fn from_args(
        args: &HashMap<String, Value>,
        fallback: Option<&MtlsPaths>,
    ) -> Result<Self, InstallError> {
        let has_headers = args.contains_key("http-headers");
        let has_client_tls = args.contains_key("tls-key") || args.contains_key("tls-cert");

        if has_headers && has_client_tls {
            return Err(InstallError::Config(
                "both http-headers and tls-key/tls-cert requested".into(),
            ));
        }

        if has_headers {
            let (key, value) = parse_header_arg(args)?;
            return Ok(AuthContext::Header { key, value });
        }

        if has_client_tls {
            let cert = path_arg(args, "tls-cert")?;
            let key = path_arg(args, "tls-key")?;
            return Ok(AuthContext::Mtls {
                cert,
                key,
                verify: verify_mode(args)?,
            });
        }

        if let Some(paths) = fallback {
            return Ok(AuthContext::Mtls {
                cert: paths.client_cert.clone(),
                key: paths.client_key.clone(),
                verify: ServerVerify::CustomCa(paths.ca_cert.clone()),
            });
        }

        Ok(AuthContext::None)
    }
}

/// Extracts the single "Key: Value" entry from `http-headers`.
fn parse_header_arg(args: &HashMap<String, Value>) -> Result<(String, String), InstallError> {
    let headers = args
        .get("http-headers")
        .and_then(Value::as_array)
        .ok_or_else(|| InstallError::Config("http-headers must be a sequence".into()))?;

    if headers.len() != 1 {
        return Err(InstallError::Config(format!(
            "http-headers must contain exactly one entry, got {}",
            headers.len()
        )));
    }

    let header = headers[0]
        .as_str()
        .ok_or_else(|| InstallError::Config("http-headers entry must be a string".into()))?;

    let (key, value) = header
        .split_once(": ")
        .ok_or_else(|| InstallError::Config(format!("malformed header entry: {header:?}")))?;

    Ok((key.to_string(), value.to_string()))
}

fn path_arg(args: &HashMap<String, Value>, key: &str) -> Result<PathBuf, InstallError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| InstallError::Config(format!("{key} and its counterpart must both be set")))
}

fn verify_mode(args: &HashMap<String, Value>) -> Result<ServerVerify, InstallError> {
    if let Some(no_verify) = args.get("tls-no-verify") {
        let no_verify = no_verify.as_bool().ok_or_else(|| {
            InstallError::Config("tls-no-verify must be a boolean".into())
        })?;
        if no_verify {
            return Ok(ServerVerify::Disabled);
        }
    }

    if args.contains_key("tls-ca") {
        return Ok(ServerVerify::CustomCa(path_arg(args, "tls-ca")?));
    }

    Ok(ServerVerify::Default)
}
