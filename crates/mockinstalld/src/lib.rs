//! Installer test double.
//!
//! Stands in for a device-local update installer: verifies a bundle against a
//! reference digest (locally or via authenticated ranged HTTP), then mimics a
//! multi-phase installation with progress notifications and a terminal
//! `Completed` signal, published over a Unix socket RPC interface.

pub mod installer;
pub mod rpc_server;
pub mod verifier;
