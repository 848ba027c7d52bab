//! Install-confirmation test double.
//!
//! Independent companion service to the installer double: answers each
//! confirmation request, after a fixed delay, with the approve/deny decision
//! it was constructed with.

pub mod confirmation;
pub mod rpc_server;
