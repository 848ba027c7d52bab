//! Shared types for the mock installer daemons.
//!
//! Defines the IPC protocol spoken over the daemons' Unix sockets, the
//! authentication context applied to ranged bundle downloads, the mTLS
//! credential layout, and the error kinds surfaced to clients.

pub mod auth;
pub mod error;
pub mod ipc;
pub mod mtls;

pub use auth::{AuthContext, ServerVerify};
pub use error::InstallError;

/// Interface identity of the installer service.
pub const INSTALLER_INTERFACE: &str = "org.mockinstall.Installer1";

/// Interface identity of the confirmation service.
pub const CONFIRMATION_INTERFACE: &str = "org.mockinstall.Confirmation1";

/// Default socket path for the installer daemon.
pub const INSTALLER_SOCKET: &str = "/tmp/mockinstall/installer.sock";

/// Default socket path for the confirmation daemon.
pub const CONFIRMATION_SOCKET: &str = "/tmp/mockinstall/confirm.sock";

/// Readiness marker printed by the installer daemon once its socket is bound.
pub const INSTALLER_READY_MARKER: &str = "Interface published";

/// Readiness marker printed by the confirmation daemon once its socket is bound.
pub const CONFIRMATION_READY_MARKER: &str = "Confirmation interface published";
