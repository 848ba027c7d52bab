//! IPC protocol definitions for the mock installer daemons.
//!
//! Both daemons speak newline-delimited JSON over a Unix socket: one
//! `Request` per line in, one `Response` per line out. A connection that
//! issues `Subscribe` is switched into signal-streaming mode and from then on
//! receives one `Signal` per line, in emission order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
}

/// Response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

/// Request methods understood by the daemons.
///
/// The installer daemon answers `Ping`, `Properties`, `InstallBundle` and
/// `Subscribe`; the confirmation daemon answers `Ping`,
/// `ConfirmInstallationRequest` and `Subscribe`. Anything else yields an
/// error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    /// Health check.
    Ping,

    /// Read all installer properties.
    Properties,

    /// Verify `source` against the reference bundle and, on success, run the
    /// simulated installation. `args` carries the download auth material
    /// (`tls-key`, `tls-cert`, `tls-ca`, `tls-no-verify`, `http-headers`).
    InstallBundle {
        source: String,
        args: HashMap<String, serde_json::Value>,
    },

    /// Request an install confirmation decision for an action.
    ConfirmInstallationRequest { action_id: String, version: String },

    /// Switch this connection into signal-streaming mode.
    Subscribe,
}

/// Response data variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseData {
    /// Simple success/pong.
    Ok,

    /// Installer property snapshot.
    Properties(InstallerProperties),

    /// The connection now streams signals.
    Subscribed,
}

/// Install progress triple: percentage, phase message, nesting depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub percent: i32,
    pub message: String,
    pub depth: i32,
}

impl Progress {
    pub fn idle() -> Self {
        Self {
            percent: 0,
            message: String::new(),
            depth: 1,
        }
    }
}

/// Snapshot of the installer's properties, mutable and static alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerProperties {
    pub operation: String,
    pub progress: Progress,
    pub last_error: String,
    pub compatible: String,
    pub variant: String,
    pub boot_slot: String,
}

/// A single changed property, carried by `PropertiesChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "property", content = "value")]
pub enum PropertyUpdate {
    Operation(String),
    Progress(Progress),
    LastError(String),
}

/// Signals emitted by the installer daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "args")]
pub enum InstallerSignal {
    /// A property changed on the given interface.
    PropertiesChanged {
        interface: String,
        update: PropertyUpdate,
    },

    /// The simulated installation finished with the given code.
    Completed { code: i32 },
}

/// Signals emitted by the confirmation daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "args")]
pub enum ConfirmationSignal {
    /// The fixed decision for a previously requested confirmation.
    ConfirmationStatus {
        action_id: String,
        confirmed: bool,
        error_code: i32,
        details: String,
    },
}
